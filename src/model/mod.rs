//! Aggregation model: fold normalized measurement rows into per-window buckets.
//!
//! `RunAggregation` is the only mutable state of a merge. It is built for one
//! run, fed the measurement stream row by row, and consumed by the report
//! assembler. Nothing in here outlives a run.

pub mod bucket;
pub mod report;

pub use bucket::AggBucket;
pub use report::{MergedReport, SourceFiles, build_report};

use crate::measure::{EntityAliasSet, MeasurementRow, Normalizer};
use crate::spec::metrics::{MetricId, MetricRegistry};
use crate::window::{MatchMode, WindowMatcher, WindowSet};

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Buckets are shared by windows with the same name, so keys use a name group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BucketKey {
    group: usize,
    metric: MetricId,
    entity: &'static str,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub total_rows_seen: u64,
    pub updates_written: u64,
}

pub struct RunAggregation<'a> {
    registry: &'a MetricRegistry,
    windows: &'a WindowSet,
    normalizer: Normalizer<'a>,
    matcher: WindowMatcher<'a>,
    /// Window index -> name group.
    group_of: Vec<usize>,
    buckets: HashMap<BucketKey, AggBucket>,
    stats: RunStats,
}

impl<'a> RunAggregation<'a> {
    pub fn new(registry: &'a MetricRegistry, windows: &'a WindowSet) -> Self {
        let mut group_index: HashMap<&'a str, usize> = HashMap::new();
        let group_of = windows
            .iter()
            .map(|w| {
                let next = group_index.len();
                *group_index.entry(w.name.as_str()).or_insert(next)
            })
            .collect();

        Self {
            registry,
            windows,
            normalizer: Normalizer::new(registry),
            matcher: WindowMatcher::new(windows),
            group_of,
            buckets: HashMap::new(),
            stats: RunStats::default(),
        }
    }

    /// Count and fold one raw element of the measurements `data` array.
    pub fn observe_value(&mut self, raw: &Value) {
        self.stats.total_rows_seen += 1;
        if let Some(row) = MeasurementRow::from_value(raw) {
            self.fold(&row);
        }
    }

    /// Count and fold one decoded row.
    #[cfg(test)]
    pub fn observe(&mut self, row: &MeasurementRow) {
        self.stats.total_rows_seen += 1;
        self.fold(row);
    }

    fn fold(&mut self, row: &MeasurementRow) {
        let Some(n) = self
            .normalizer
            .normalize(&row.metric, &row.entity, &row.unit, row.value)
        else {
            return;
        };

        let kind = self.registry.get(n.metric).kind;
        for &w in self.matcher.matches(row.ts_us) {
            let key = BucketKey {
                group: self.group_of[w],
                metric: n.metric,
                entity: n.entity,
            };
            self.buckets.entry(key).or_default().update(n.value, kind);
            self.stats.updates_written += 1;
        }
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    /// Whether the matcher had to give up on the sorted sweep.
    pub fn match_mode(&self) -> MatchMode {
        self.matcher.mode()
    }

    pub fn aliases(&self) -> &EntityAliasSet {
        self.normalizer.aliases()
    }

    pub fn registry(&self) -> &'a MetricRegistry {
        self.registry
    }

    pub fn windows(&self) -> &'a WindowSet {
        self.windows
    }

    /// Bucket for a window name / metric / canonical entity, if any sample landed.
    #[cfg(test)]
    pub fn bucket(&self, window: &str, metric: MetricId, entity: &str) -> Option<&AggBucket> {
        let idx = self.windows.iter().position(|w| w.name == window)?;
        let group = self.group_of[idx];
        let entity: &'static str = *self
            .registry
            .get(metric)
            .out_entities
            .iter()
            .find(|e| **e == entity)?;
        self.buckets.get(&BucketKey {
            group,
            metric,
            entity,
        })
    }

    /// Bucket for the window at `window` (index into the window set).
    pub fn bucket_at(
        &self,
        window: usize,
        metric: MetricId,
        entity: &'static str,
    ) -> Option<&AggBucket> {
        self.buckets.get(&BucketKey {
            group: self.group_of[window],
            metric,
            entity,
        })
    }

    pub fn into_aliases(self) -> EntityAliasSet {
        self.normalizer.into_aliases()
    }
}
