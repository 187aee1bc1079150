//! Output document assembly.
//!
//! Every (window, metric, canonical entity) combination gets a record, even
//! when no sample landed in it, so consumers can rely on a fixed shape.

use crate::log::MarkerMap;
use crate::measure::EntityAliasSet;
use crate::model::bucket::{Finalized, finalize};
use crate::model::{RunAggregation, RunStats};
use crate::spec::RunMeta;
use crate::window::{Window, WindowKind};

use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFiles {
    pub phase_data: String,
    pub measurements: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowView {
    pub name: String,
    pub kind: WindowKind,
    pub start_us: i64,
    pub end_us: i64,
    pub duration_s: f64,
}

impl From<&Window> for WindowView {
    fn from(w: &Window) -> Self {
        WindowView {
            name: w.name.clone(),
            kind: w.kind,
            start_us: w.start_us,
            end_us: w.end_us,
            duration_s: w.duration_s(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricView {
    pub unit: &'static str,
    pub entities: BTreeMap<&'static str, Finalized>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordView {
    pub window: String,
    pub kind: WindowKind,
    pub metrics: BTreeMap<&'static str, MetricView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notes {
    pub timebase: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedReport {
    pub run: RunMeta,
    pub source_files: SourceFiles,
    pub windows: Vec<WindowView>,
    pub records: Vec<RecordView>,
    pub markers: MarkerMap,
    pub entity_mappings: EntityAliasSet,
    pub stats: RunStats,
    pub notes: Notes,
}

/// Finalize every bucket and assemble the output document.
pub fn build_report(
    run: RunMeta,
    source_files: SourceFiles,
    markers: MarkerMap,
    agg: RunAggregation<'_>,
) -> MergedReport {
    let registry = agg.registry();
    let windows = agg.windows();

    let mut records = Vec::with_capacity(windows.len());
    for (idx, w) in windows.iter().enumerate() {
        let mut metrics = BTreeMap::new();
        for (metric_id, spec) in registry.specs().iter().enumerate() {
            let entities = spec
                .out_entities
                .iter()
                .map(|&ent| (ent, finalize(spec.kind, agg.bucket_at(idx, metric_id, ent))))
                .collect();
            metrics.insert(
                spec.name,
                MetricView {
                    unit: spec.out_unit,
                    entities,
                },
            );
        }
        records.push(RecordView {
            window: w.name.clone(),
            kind: w.kind,
            metrics,
        });
    }

    let stats = agg.stats();
    MergedReport {
        run,
        source_files,
        windows: windows.iter().map(WindowView::from).collect(),
        records,
        markers,
        entity_mappings: agg.into_aliases(),
        stats,
        notes: Notes {
            timebase: "unix_us",
        },
    }
}
