//! Phase-data document (*_phase-data.json) as exported by GMT.
//!
//! JSON shape (only the fields we read):
//! {
//!   "data": {
//!     "id": "...", "name": "...", "uri": "...", "branch": "...",
//!     "commit_hash": "...", "machine_id": 1, "failed": false,
//!     "warnings": [...],
//!     "start_measurement": 1700000000000000, "end_measurement": ...,
//!     "phases": [ { "name": "[BASELINE]", "start": ..., "end": ..., "hidden": false } ],
//!     "logs": { "rag-app": [ { "cmd": "...", "stdout": "..." } ] }
//!   }
//! }
//!
//! Everything is optional. A kept phase without `start`/`end` is skipped
//! later, so hidden or unnamed entries never need bounds.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhaseDocument {
    #[serde(default)]
    pub data: Option<PhaseData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhaseData {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub commit_hash: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub machine_id: Option<Value>,
    #[serde(default)]
    pub gmt_hash: Option<String>,
    #[serde(default)]
    pub created_at: Option<Value>,
    #[serde(default)]
    pub failed: Option<bool>,
    #[serde(default)]
    pub warnings: Option<Vec<Value>>,
    #[serde(default)]
    pub start_measurement: Option<i64>,
    #[serde(default)]
    pub end_measurement: Option<i64>,
    #[serde(default)]
    pub usage_scenario_variables: Option<Value>,
    #[serde(default)]
    pub phases: Option<Vec<RawPhase>>,
    #[serde(default)]
    pub logs: Option<BTreeMap<String, Vec<LogEntry>>>,
}

/// Declared phase as it appears in the phase list.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPhase {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start: Option<i64>,
    #[serde(default)]
    pub end: Option<i64>,
    #[serde(default)]
    pub hidden: Option<bool>,
}

/// One captured command of a container.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default)]
    pub stdout: Option<String>,
}

/// Run metadata carried into the output unchanged. Absent fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gmt_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<bool>,
    pub warnings: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_measurement: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_measurement: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_scenario_variables: Option<Value>,
}

impl RunMeta {
    pub fn from_data(data: &PhaseData, date: String) -> Self {
        RunMeta {
            id: data.id.clone(),
            name: data.name.clone(),
            date,
            uri: data.uri.clone(),
            branch: data.branch.clone(),
            commit_hash: data.commit_hash.clone(),
            filename: data.filename.clone(),
            machine_id: data.machine_id.clone().filter(|v| !v.is_null()),
            gmt_hash: data.gmt_hash.clone(),
            created_at: data.created_at.clone().filter(|v| !v.is_null()),
            failed: data.failed,
            warnings: data.warnings.as_ref().map_or(0, Vec::len),
            start_measurement: data.start_measurement,
            end_measurement: data.end_measurement,
            usage_scenario_variables: data
                .usage_scenario_variables
                .clone()
                .filter(|v| !v.is_null()),
        }
    }

    /// Run id for file names; missing and empty ids both read `unknown`.
    pub fn id_or_unknown(&self) -> &str {
        self.id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or("unknown")
    }
}

impl PhaseData {
    /// Declared phases, empty when the list is missing.
    pub fn phases(&self) -> &[RawPhase] {
        self.phases.as_deref().unwrap_or(&[])
    }

    /// Stdout of the first log entry of `container` whose command contains `needle`.
    pub fn stdout_for(&self, container: &str, needle: &str) -> &str {
        self.logs
            .as_ref()
            .and_then(|logs| logs.get(container))
            .and_then(|entries| {
                entries
                    .iter()
                    .find(|e| e.cmd.as_deref().unwrap_or("").contains(needle))
            })
            .and_then(|e| e.stdout.as_deref())
            .unwrap_or("")
    }
}

/// Date taken from a `YYYY-MM-DD_...` file name, else today's local date.
pub fn date_prefix(path: &Path) -> String {
    let from_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.split('_').next())
        .and_then(|p| NaiveDate::parse_from_str(p, "%Y-%m-%d").ok());

    match from_name {
        Some(d) => d.format("%Y-%m-%d").to_string(),
        None => chrono::Local::now().format("%Y-%m-%d").to_string(),
    }
}
