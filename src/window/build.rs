//! Window construction: declared phases plus sub-windows paired from markers.

use crate::log::{Marker, MarkerMap, MarkerParser};
use crate::spec::phase::{PhaseData, RawPhase};
use crate::spec::scopes::{self, QualifiedFamily, ScopeSpec};
use crate::window::{Window, WindowKind, WindowSet};

use std::collections::HashMap;
use tracing::{debug, warn};

/// Turn the declared phase list into windows.
///
/// Hidden and unnamed phases are skipped before their bounds are looked at;
/// kept phases without both bounds are skipped too. A bracketed name (`[BOOT]`) is a
/// GMT phase; anything else is a usage-scenario step.
pub fn declared_windows(phases: &[RawPhase]) -> Vec<Window> {
    let mut out = Vec::new();
    for p in phases {
        if p.hidden == Some(true) {
            continue;
        }
        let name = match p.name.as_deref() {
            Some(n) if !n.is_empty() => n,
            _ => continue,
        };
        let (Some(start), Some(end)) = (p.start, p.end) else {
            warn!(phase = name, start = ?p.start, end = ?p.end, "skipping phase without bounds");
            continue;
        };
        if end <= start {
            warn!(phase = name, start, end, "skipping phase with empty interval");
            continue;
        }

        let kind = if name.starts_with('[') && name.ends_with(']') {
            WindowKind::Phase
        } else {
            WindowKind::WorkflowStep
        };
        out.push(Window {
            name: name.to_string(),
            kind,
            start_us: start,
            end_us: end,
        });
    }
    out
}

/// Open-interval key: event base name plus an optional qualifier.
type PairKey = (String, Option<String>);

/// Pair `<BASE>_START` / `<BASE>_END` markers into sub-windows under `parent`.
///
/// A second START for the same key before its END replaces the pending start.
/// ENDs without a pending START and non-positive intervals are dropped.
pub fn pair_markers(
    parent: &str,
    markers: &[Marker],
    allow_qualifier: bool,
    families: &'static [QualifiedFamily],
) -> Vec<Window> {
    let mut starts: HashMap<PairKey, i64> = HashMap::new();
    let mut out = Vec::new();

    for m in markers {
        if let Some(base) = m.event.strip_suffix("_START") {
            let key = pair_key(base, m, allow_qualifier, families);
            if let Some(prev) = starts.insert(key, m.ts_us) {
                debug!(scope = parent, event = %m.event, prev, ts_us = m.ts_us, "START replaced pending START");
            }
            continue;
        }

        let Some(base) = m.event.strip_suffix("_END") else {
            continue;
        };
        let key = pair_key(base, m, allow_qualifier, families);
        let Some(start_us) = starts.remove(&key) else {
            debug!(scope = parent, event = %m.event, ts_us = m.ts_us, "dropping END without START");
            continue;
        };
        if m.ts_us <= start_us {
            debug!(scope = parent, event = %m.event, start_us, end_us = m.ts_us, "dropping non-positive interval");
            continue;
        }

        let name = match key.1 {
            Some(q) => format!("{}/{}/{}", parent, base, q),
            None => format!("{}/{}", parent, base),
        };
        out.push(Window {
            name,
            kind: WindowKind::SubWindow,
            start_us,
            end_us: m.ts_us,
        });
    }

    out.sort_by_key(|w| w.start_us);
    out
}

fn pair_key(
    base: &str,
    marker: &Marker,
    allow_qualifier: bool,
    families: &'static [QualifiedFamily],
) -> PairKey {
    let qualifier = if allow_qualifier {
        scopes::qualified_family(families, base).map(|fam| {
            marker
                .meta
                .get(fam.meta_key)
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or_else(|| scopes::UNKNOWN_QUALIFIER.to_string())
        })
    } else {
        None
    };
    (base.to_string(), qualifier)
}

/// Build the frozen window set and the per-scope marker lists for a run.
pub fn build_windows(
    data: &PhaseData,
    parser: &MarkerParser,
    scope_specs: &[ScopeSpec],
    families: &'static [QualifiedFamily],
) -> (WindowSet, MarkerMap) {
    let mut windows = declared_windows(data.phases());
    let mut markers = MarkerMap::new();

    for scope in scope_specs {
        let stdout = data.stdout_for(scope.container, scope.cmd_needle);
        let scope_markers = parser.parse(stdout);
        windows.extend(pair_markers(
            scope.parent,
            &scope_markers,
            scope.allow_qualifier,
            families,
        ));
        markers.insert(scope.parent.to_string(), scope_markers);
    }

    (WindowSet::new(windows), markers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::scopes::{QUALIFIED_FAMILIES, STANDARD_SCOPES};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn mk(ts_us: i64, event: &str, meta: &[(&str, &str)]) -> Marker {
        Marker {
            ts_us,
            event: event.to_string(),
            meta: meta
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn spans(ws: &[Window]) -> Vec<(&str, i64, i64)> {
        ws.iter()
            .map(|w| (w.name.as_str(), w.start_us, w.end_us))
            .collect()
    }

    #[test]
    fn pairs_start_and_end() {
        let ws = pair_markers(
            "P",
            &[mk(10, "A_START", &[]), mk(20, "A_END", &[])],
            false,
            QUALIFIED_FAMILIES,
        );
        assert_eq!(spans(&ws), vec![("P/A", 10, 20)]);
        assert_eq!(ws[0].kind, WindowKind::SubWindow);
        assert_eq!(ws[0].duration_s(), 1e-5);
    }

    #[test]
    fn last_start_wins() {
        let ws = pair_markers(
            "P",
            &[
                mk(10, "A_START", &[]),
                mk(15, "A_START", &[]),
                mk(20, "A_END", &[]),
            ],
            false,
            QUALIFIED_FAMILIES,
        );
        assert_eq!(spans(&ws), vec![("P/A", 15, 20)]);
    }

    #[test]
    fn drops_orphan_end_and_empty_interval() {
        let ws = pair_markers(
            "P",
            &[
                mk(5, "B_END", &[]),
                mk(10, "A_START", &[]),
                mk(10, "A_END", &[]),
                mk(12, "A_END", &[]),
            ],
            false,
            QUALIFIED_FAMILIES,
        );
        assert!(ws.is_empty());
    }

    #[test]
    fn qualified_family_splits_per_qualifier() {
        let markers = [
            mk(10, "RETRIEVAL_START", &[("q_id", "1")]),
            mk(12, "RETRIEVAL_START", &[("q_id", "2")]),
            mk(15, "RETRIEVAL_END", &[("q_id", "1")]),
            mk(18, "RETRIEVAL_END", &[("q_id", "2")]),
            mk(20, "RETRIEVAL_START", &[]),
            mk(25, "RETRIEVAL_END", &[]),
        ];
        let ws = pair_markers("RAG", &markers, true, QUALIFIED_FAMILIES);
        assert_eq!(
            spans(&ws),
            vec![
                ("RAG/RETRIEVAL/1", 10, 15),
                ("RAG/RETRIEVAL/2", 12, 18),
                ("RAG/RETRIEVAL/unknown", 20, 25),
            ]
        );
    }

    #[test]
    fn qualifier_ignored_when_scope_disallows_it() {
        let markers = [
            mk(10, "RETRIEVAL_START", &[("q_id", "1")]),
            mk(12, "RETRIEVAL_START", &[("q_id", "2")]),
            mk(15, "RETRIEVAL_END", &[("q_id", "1")]),
        ];
        let ws = pair_markers("Indexing", &markers, false, QUALIFIED_FAMILIES);
        assert_eq!(spans(&ws), vec![("Indexing/RETRIEVAL", 12, 15)]);
    }

    #[test]
    fn unregistered_family_is_not_qualified() {
        let markers = [
            mk(10, "GENERATE_START", &[("q_id", "1")]),
            mk(15, "GENERATE_END", &[("q_id", "1")]),
        ];
        let ws = pair_markers("RAG", &markers, true, QUALIFIED_FAMILIES);
        assert_eq!(spans(&ws), vec![("RAG/GENERATE", 10, 15)]);
    }

    #[test]
    fn declared_phases_skip_hidden_unnamed_and_empty() {
        let phases: Vec<RawPhase> = serde_json::from_value(serde_json::json!([
            {"name": "[BASELINE]", "start": 0, "end": 10},
            {"name": "Query", "start": 10, "end": 30},
            {"name": "[HIDDEN]", "start": 0, "end": 5, "hidden": true},
            {"start": 0, "end": 5},
            {"name": "", "start": 0, "end": 5},
            {"name": "Broken", "start": 9, "end": 9}
        ]))
        .unwrap();
        let ws = declared_windows(&phases);
        assert_eq!(spans(&ws), vec![("[BASELINE]", 0, 10), ("Query", 10, 30)]);
        assert_eq!(ws[0].kind, WindowKind::Phase);
        assert_eq!(ws[1].kind, WindowKind::WorkflowStep);
    }

    #[test]
    fn hidden_and_unbounded_phases_need_no_bounds() {
        let phases: Vec<RawPhase> = serde_json::from_value(serde_json::json!([
            {"name": "[BASELINE]", "start": 0, "end": 100},
            {"name": "[REMOVE]", "hidden": true},
            {"hidden": false},
            {"name": "Half", "start": 40}
        ]))
        .unwrap();
        let ws = declared_windows(&phases);
        assert_eq!(spans(&ws), vec![("[BASELINE]", 0, 100)]);
    }

    #[test]
    fn build_merges_declared_and_derived_sorted() {
        let doc: crate::spec::phase::PhaseDocument = serde_json::from_value(serde_json::json!({
            "data": {
                "phases": [
                    {"name": "[RUNTIME]", "start": 0, "end": 1000},
                    {"name": "Index", "start": 50, "end": 400}
                ],
                "logs": {"rag-app": [
                    {"cmd": "python -m app.indexing", "stdout":
                        "##GMT_MARK## ts_us=100 event=EMBED_START\n##GMT_MARK## ts_us=300 event=EMBED_END\n"},
                    {"cmd": "docker run -it -d --name rag-app img", "stdout":
                        "##GMT_MARK## ts_us=500 event=RETRIEVAL_START q_id=9\n##GMT_MARK## ts_us=600 event=RETRIEVAL_END q_id=9\n"}
                ]}
            }
        }))
        .unwrap();
        let parser = MarkerParser::new().unwrap();
        let (ws, markers) =
            build_windows(doc.data.as_ref().unwrap(), &parser, STANDARD_SCOPES, QUALIFIED_FAMILIES);

        assert_eq!(
            spans(ws.as_slice()),
            vec![
                ("[RUNTIME]", 0, 1000),
                ("Index", 50, 400),
                ("Indexing/EMBED", 100, 300),
                ("RAG Querries/RETRIEVAL/9", 500, 600),
            ]
        );
        assert_eq!(markers["Indexing"].len(), 2);
        assert_eq!(markers["RAG Querries"].len(), 2);
    }

    #[test]
    fn missing_phase_list_is_valid() {
        let data = PhaseData::default();
        let parser = MarkerParser::new().unwrap();
        let (ws, markers) = build_windows(&data, &parser, STANDARD_SCOPES, QUALIFIED_FAMILIES);
        assert!(ws.is_empty());
        assert!(markers.values().all(Vec::is_empty));
    }
}
