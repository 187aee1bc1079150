//! Running accumulator per (window, metric, entity) and its finalization.

use crate::spec::metrics::AggKind;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggBucket {
    pub sum: f64,
    pub count: u64,
    /// Unset for energy metrics, which never report a peak.
    pub max: Option<f64>,
}

impl AggBucket {
    pub fn update(&mut self, value: f64, kind: AggKind) {
        self.sum += value;
        self.count += 1;
        if kind.tracks_max() {
            self.max = Some(match self.max {
                Some(m) if m >= value => m,
                _ => value,
            });
        }
    }
}

/// Finalized statistics for one entity. Field set depends on the metric kind;
/// an empty bucket keeps the same fields with nulls and a zero count.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Finalized {
    Energy {
        sum: Option<f64>,
        #[serde(rename = "sum_Wh")]
        sum_wh: Option<f64>,
        count: u64,
    },
    MeanMax {
        mean: Option<f64>,
        max: Option<f64>,
        count: u64,
    },
    BytesMeanMax {
        mean: Option<f64>,
        #[serde(rename = "mean_MiB")]
        mean_mib: Option<f64>,
        max: Option<f64>,
        count: u64,
    },
    BytesSumMax {
        sum: Option<f64>,
        #[serde(rename = "sum_MiB")]
        sum_mib: Option<f64>,
        max: Option<f64>,
        count: u64,
    },
}

/// Finalize a bucket (or its absence) according to the metric kind.
pub fn finalize(kind: AggKind, bucket: Option<&AggBucket>) -> Finalized {
    let b = bucket.filter(|b| b.count > 0);
    let count = b.map_or(0, |b| b.count);
    let sum = b.map(|b| b.sum);
    let mean = b.map(|b| b.sum / b.count as f64);
    let max = b.and_then(|b| b.max);

    match kind {
        AggKind::Energy => Finalized::Energy {
            sum,
            sum_wh: sum.map(AggKind::wh_from_uj),
            count,
        },
        AggKind::RatioMeanMax => Finalized::MeanMax { mean, max, count },
        AggKind::BytesMeanMax => Finalized::BytesMeanMax {
            mean,
            mean_mib: mean.map(AggKind::mib_from_bytes),
            max,
            count,
        },
        AggKind::BytesSumMax => Finalized::BytesSumMax {
            sum,
            sum_mib: sum.map(AggKind::mib_from_bytes),
            max,
            count,
        },
    }
}
