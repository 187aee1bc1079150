//! Pre-filter a raw measurements export down to the rows a merge can use.

use crate::Result;
use crate::measure::{self, MeasurementRow};
use crate::render;
use crate::spec::MetricRegistry;

use anyhow::{Context, bail};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub rows_seen: u64,
    pub rows_kept: u64,
}

/// Whether a raw row would pass the merge's metric, unit and entity checks.
pub fn keep_row(registry: &MetricRegistry, raw: &Value) -> bool {
    let Some(row) = MeasurementRow::from_value(raw) else {
        return false;
    };
    let Some(id) = registry.lookup(&row.metric) else {
        return false;
    };
    let spec = registry.get(id);
    spec.accepts_unit(&row.unit) && spec.entity_rule.admits(&row.entity)
}

/// `<dir>/<base>_filtered.json[.gz]` next to `input`.
pub fn filtered_output_path(input: &Path, gzip: bool) -> Result<PathBuf> {
    let name = input
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("bad input path {}", input.display()))?;
    let base = name
        .strip_suffix(".json.gz")
        .or_else(|| name.strip_suffix(".json"));
    let Some(base) = base else {
        bail!("measurements must be .json or .json.gz: {}", input.display());
    };
    let ext = if gzip { "json.gz" } else { "json" };
    Ok(input.with_file_name(format!("{}_filtered.{}", base, ext)))
}

/// Stream `input` and write the kept rows as `{"success": true, "data": [...]}`.
///
/// `level` of `None` writes plain JSON.
pub fn filter_file(
    registry: &MetricRegistry,
    input: &Path,
    level: Option<u32>,
) -> Result<(PathBuf, FilterStats)> {
    let out = filtered_output_path(input, level.is_some())?;
    let reader = measure::open_measurements(input)?;
    let mut stats = FilterStats::default();

    render::write_atomic(&out, level, |sink| {
        sink.write_all(br#"{"success": true, "data": ["#)?;
        measure::for_each_value(reader, |raw| {
            stats.rows_seen += 1;
            if !keep_row(registry, &raw) {
                return Ok(());
            }
            if stats.rows_kept > 0 {
                sink.write_all(b",")?;
            }
            serde_json::to_writer(&mut *sink, &raw)?;
            stats.rows_kept += 1;
            Ok(())
        })
        .with_context(|| format!("decode measurements file {}", input.display()))?;
        sink.write_all(b"]}\n")?;
        Ok(())
    })?;

    Ok((out, stats))
}
