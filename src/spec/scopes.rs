//! Marker scopes: which captured process output feeds which parent window.

/// A parent scope whose markers are paired into sub-windows.
#[derive(Debug, Clone, Copy)]
pub struct ScopeSpec {
    /// Parent name used as the sub-window prefix and as the marker map key.
    pub parent: &'static str,
    /// Container whose logs carry the process output.
    pub container: &'static str,
    /// Substring identifying the log entry by its command line.
    pub cmd_needle: &'static str,
    /// Whether qualifier-aware event families split into per-qualifier windows.
    pub allow_qualifier: bool,
}

/// An event family whose START/END pairs are keyed by a metadata value.
#[derive(Debug, Clone, Copy)]
pub struct QualifiedFamily {
    pub base: &'static str,
    pub meta_key: &'static str,
}

pub const PARENT_INDEXING: &str = "Indexing";
/// Spelling kept as-is; downstream consumers key on it.
pub const PARENT_RAG: &str = "RAG Querries";

pub const STANDARD_SCOPES: &[ScopeSpec] = &[
    ScopeSpec {
        parent: PARENT_INDEXING,
        container: "rag-app",
        cmd_needle: "python -m app.indexing",
        allow_qualifier: false,
    },
    ScopeSpec {
        parent: PARENT_RAG,
        container: "rag-app",
        cmd_needle: "docker run -it -d --name rag-app",
        allow_qualifier: true,
    },
];

pub const QUALIFIED_FAMILIES: &[QualifiedFamily] = &[QualifiedFamily {
    base: "RETRIEVAL",
    meta_key: "q_id",
}];

/// Qualifier value used when a qualified family omits its metadata key.
pub const UNKNOWN_QUALIFIER: &str = "unknown";

pub fn qualified_family(
    families: &'static [QualifiedFamily],
    base: &str,
) -> Option<&'static QualifiedFamily> {
    families.iter().find(|f| f.base == base)
}

/// Windows compared across runs by the summary, in output order.
pub const SUMMARY_WINDOWS: &[&str] = &[
    "[RUNTIME]",
    "Download Dataset",
    "Warmup Indexing",
    PARENT_INDEXING,
    "Indexing/CHUNKING",
    "Indexing/EMBEDDING",
    "Indexing/PERSIST_IN_DB",
    "Warmup RAG",
    PARENT_RAG,
];
