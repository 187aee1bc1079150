//! Cross-run summary: duration and energy series per window over many merged
//! reports, with distribution statistics for each series.

use crate::Result;
use crate::measure;
use crate::render;
use crate::spec::scopes::SUMMARY_WINDOWS;
use crate::spec::{AggKind, MetricRegistry};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const MICROJOULES_PER_J: f64 = 1e6;
const QUANTILE_PARTS: usize = 20;

// Only the parts of a merged report the summary reads.

#[derive(Debug, Default, Deserialize)]
struct MergedInput {
    #[serde(default)]
    run: Option<RunRef>,
    #[serde(default)]
    windows: Vec<WindowRef>,
    #[serde(default)]
    records: Vec<RecordRef>,
}

#[derive(Debug, Default, Deserialize)]
struct RunRef {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WindowRef {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    duration_s: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RecordRef {
    #[serde(default)]
    window: Option<String>,
    #[serde(default)]
    metrics: BTreeMap<String, MetricRef>,
}

#[derive(Debug, Default, Deserialize)]
struct MetricRef {
    #[serde(default)]
    entities: BTreeMap<String, EntityRef>,
}

#[derive(Debug, Default, Deserialize)]
struct EntityRef {
    #[serde(default)]
    sum: Option<f64>,
}

impl MergedInput {
    /// Total `duration_s` per window name.
    fn durations(&self) -> HashMap<&str, f64> {
        let mut out = HashMap::new();
        for w in &self.windows {
            if let (Some(name), Some(d)) = (w.name.as_deref(), w.duration_s) {
                *out.entry(name).or_insert(0.0) += d;
            }
        }
        out
    }

    /// Energy sum over all entities of `metric` in `window`, in whole uJ.
    ///
    /// Records of same-named windows share one bucket set, so only the first
    /// record for a name is read. `None` when no entity carries a sum.
    fn energy_uj(&self, window: &str, metric: &str) -> Option<i64> {
        let rec = self
            .records
            .iter()
            .find(|r| r.window.as_deref() == Some(window))?;
        let sums: Vec<f64> = rec
            .metrics
            .get(metric)?
            .entities
            .values()
            .filter_map(|e| e.sum)
            .collect();
        if sums.is_empty() {
            return None;
        }
        Some(sums.iter().sum::<f64>().round_ties_even() as i64)
    }
}

/// Distribution of one series; `None` values are left out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesStats {
    pub n: usize,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub cv_pct: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub p10: Option<f64>,
    pub p25: Option<f64>,
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p90: Option<f64>,
}

impl SeriesStats {
    fn empty() -> Self {
        SeriesStats {
            n: 0,
            mean: None,
            stdev: None,
            cv_pct: None,
            min: None,
            max: None,
            p10: None,
            p25: None,
            p50: None,
            p75: None,
            p90: None,
        }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round_ties_even() / 100.0
}

/// Inclusive-method cut point `i` of `parts` over sorted data (n >= 2).
fn inclusive_quantile(sorted: &[f64], i: usize, parts: usize) -> f64 {
    let m = sorted.len() - 1;
    let j = i * m / parts;
    let delta = i * m - j * parts;
    (sorted[j] * (parts - delta) as f64 + sorted[j + 1] * delta as f64) / parts as f64
}

/// Mean, sample stdev, coefficient of variation and percentiles, rounded to
/// two decimals. A zero coefficient of variation is reported as null.
pub fn series_stats(values: &[Option<f64>]) -> SeriesStats {
    let mut vals: Vec<f64> = values
        .iter()
        .flatten()
        .copied()
        .filter(|v| !v.is_nan())
        .collect();
    vals.sort_by(f64::total_cmp);

    let n = vals.len();
    if n == 0 {
        return SeriesStats::empty();
    }

    let mean = vals.iter().sum::<f64>() / n as f64;
    let stdev = (n >= 2).then(|| {
        let ss: f64 = vals.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (n - 1) as f64).sqrt()
    });
    let cv_pct = stdev
        .filter(|_| mean != 0.0)
        .map(|sd| 100.0 * sd / mean.abs())
        .filter(|cv| *cv != 0.0);

    // p10 .. p90 are cut points 2, 5, 10, 15, 18 of twenty.
    let pct = |i: usize| {
        if n == 1 {
            vals[0]
        } else {
            inclusive_quantile(&vals, i, QUANTILE_PARTS)
        }
    };

    SeriesStats {
        n,
        mean: Some(round2(mean)),
        stdev: stdev.map(round2),
        cv_pct: cv_pct.map(round2),
        min: Some(round2(vals[0])),
        max: Some(round2(vals[n - 1])),
        p10: Some(round2(pct(2))),
        p25: Some(round2(pct(5))),
        p50: Some(round2(pct(10))),
        p75: Some(round2(pct(15))),
        p90: Some(round2(pct(18))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergySeries {
    pub unit_raw: &'static str,
    pub unit_converted: &'static str,
    pub raw_field_energy: &'static str,
    #[serde(rename = "values_uJ")]
    pub values_uj: Vec<Option<i64>>,
    #[serde(rename = "values_J")]
    pub values_j: Vec<Option<f64>>,
    #[serde(rename = "stats_J")]
    pub stats_j: SeriesStats,
}

impl EnergySeries {
    fn new(values_uj: Vec<Option<i64>>) -> Self {
        let values_j: Vec<Option<f64>> = values_uj
            .iter()
            .map(|v| v.map(|uj| uj as f64 / MICROJOULES_PER_J))
            .collect();
        let stats_j = series_stats(&values_j);
        EnergySeries {
            unit_raw: "uJ",
            unit_converted: "J",
            raw_field_energy: "sum",
            values_uj,
            values_j,
            stats_j,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseSummary {
    pub phase: &'static str,
    pub durations_s: Vec<Option<f64>>,
    pub stats_duration_s: SeriesStats,
    pub metrics: BTreeMap<&'static str, EnergySeries>,
}

/// One (window, metric) row of the flat result table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatResult {
    pub phase: &'static str,
    pub metric: &'static str,
    pub durations_s: Vec<Option<f64>>,
    pub stats_duration_s: SeriesStats,
    #[serde(flatten)]
    pub series: EnergySeries,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunInfo {
    pub run_id: String,
    pub run_name: String,
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryMeta {
    pub created_at: String,
    pub input_dir: String,
    pub input_files: Vec<String>,
    pub runs: usize,
    pub phases: &'static [&'static str],
    pub metrics: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunsSummary {
    pub meta: SummaryMeta,
    pub run_info: Vec<RunInfo>,
    pub records: Vec<PhaseSummary>,
    pub results: Vec<FlatResult>,
}

fn is_merged_report(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with("_merged.json") || n.ends_with("_merged.json.gz"))
}

/// Every `*_merged.json[.gz]` below `dir`, sorted by path.
pub fn find_merged_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable directory entry");
                continue;
            }
        };
        if entry.file_type().is_file() && is_merged_report(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    files
}

fn load_merged(path: &Path) -> Result<MergedInput> {
    let reader = measure::open_json(path, "merged report")?;
    serde_json::from_reader(reader)
        .with_context(|| format!("parse merged report {}", path.display()))
}

fn name_or(value: Option<&str>, fallback: &str) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// Load every merged report below `input_dir` and build the summary.
pub fn summarize_dir(input_dir: &Path, registry: &MetricRegistry) -> Result<RunsSummary> {
    if !input_dir.is_dir() {
        bail!("not a directory: {}", input_dir.display());
    }
    let files = find_merged_files(input_dir);
    if files.is_empty() {
        bail!("no *_merged.json(.gz) files below {}", input_dir.display());
    }

    let metrics: Vec<&'static str> = registry
        .specs()
        .iter()
        .filter(|s| s.kind == AggKind::Energy)
        .map(|s| s.name)
        .collect();

    let mut run_info = Vec::with_capacity(files.len());
    let mut input_files = Vec::with_capacity(files.len());
    let mut durations: Vec<Vec<Option<f64>>> = vec![Vec::new(); SUMMARY_WINDOWS.len()];
    let mut energy: Vec<Vec<Vec<Option<i64>>>> =
        vec![vec![Vec::new(); metrics.len()]; SUMMARY_WINDOWS.len()];

    for path in &files {
        let doc = load_merged(path)?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let run = doc.run.as_ref();
        run_info.push(RunInfo {
            run_id: name_or(run.and_then(|r| r.id.as_deref()), &stem),
            run_name: name_or(run.and_then(|r| r.name.as_deref()), &stem),
            file: path.display().to_string(),
        });
        input_files.push(
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );

        let run_durations = doc.durations();
        for (p, phase) in SUMMARY_WINDOWS.iter().enumerate() {
            durations[p].push(run_durations.get(phase).copied());
            for (m, metric) in metrics.iter().enumerate() {
                energy[p][m].push(doc.energy_uj(phase, metric));
            }
        }
        debug!(file = %path.display(), windows = doc.windows.len(), "merged report loaded");
    }

    let mut records = Vec::with_capacity(SUMMARY_WINDOWS.len());
    let mut results = Vec::with_capacity(SUMMARY_WINDOWS.len() * metrics.len());
    for ((&phase, durations_s), per_metric) in SUMMARY_WINDOWS.iter().zip(durations).zip(energy) {
        let stats_duration_s = series_stats(&durations_s);
        let mut block = BTreeMap::new();
        for (&metric, values_uj) in metrics.iter().zip(per_metric) {
            let series = EnergySeries::new(values_uj);
            results.push(FlatResult {
                phase,
                metric,
                durations_s: durations_s.clone(),
                stats_duration_s: stats_duration_s.clone(),
                series: series.clone(),
            });
            block.insert(metric, series);
        }
        records.push(PhaseSummary {
            phase,
            durations_s,
            stats_duration_s,
            metrics: block,
        });
    }

    info!(runs = run_info.len(), dir = %input_dir.display(), "runs summarized");

    Ok(RunsSummary {
        meta: SummaryMeta {
            created_at: chrono::Utc::now().to_rfc3339(),
            input_dir: input_dir.display().to_string(),
            input_files,
            runs: run_info.len(),
            phases: SUMMARY_WINDOWS,
            metrics,
        },
        run_info,
        records,
        results,
    })
}

/// Write the summary to `<input_dir>/<output_name>.json.gz`.
pub fn write_summary(
    summary: &RunsSummary,
    input_dir: &Path,
    output_name: &str,
    level: u32,
) -> Result<PathBuf> {
    fs::create_dir_all(input_dir)
        .with_context(|| format!("create output dir {}", input_dir.display()))?;
    let path = input_dir.join(format!("{}.json.gz", output_name));
    render::write_json_atomic(summary, &path, Some(level))?;
    Ok(path)
}
