use serde::Serialize;
use std::collections::BTreeMap;

/// A timestamped instrumentation event lifted from captured process output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Marker {
    pub ts_us: i64,
    pub event: String,
    pub meta: BTreeMap<String, String>,
}

/// Markers per parent scope, in timestamp order.
pub type MarkerMap = BTreeMap<String, Vec<Marker>>;
