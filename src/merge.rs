//! One merge run: phase data + measurements -> merged report.

use crate::Result;
use crate::log::MarkerParser;
use crate::measure;
use crate::model::{self, MergedReport, RunAggregation, SourceFiles};
use crate::spec::phase::{self, PhaseDocument, RunMeta};
use crate::spec::scopes::{QUALIFIED_FAMILIES, STANDARD_SCOPES};
use crate::spec::MetricRegistry;
use crate::window::{self, MatchMode};

use anyhow::Context;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Load both inputs and aggregate them. Nothing is written here; any input
/// error aborts before an output file exists.
pub fn merge_run(measurements: &Path, phase_data: &Path) -> Result<MergedReport> {
    let text = fs::read_to_string(phase_data)
        .with_context(|| format!("read phase-data file {}", phase_data.display()))?;
    let doc: PhaseDocument = serde_json::from_str(&text)
        .with_context(|| format!("parse phase-data file {}", phase_data.display()))?;
    let data = doc.data.unwrap_or_default();

    let run = RunMeta::from_data(&data, phase::date_prefix(phase_data));

    let parser = MarkerParser::new()?;
    let (windows, markers) =
        window::build_windows(&data, &parser, STANDARD_SCOPES, QUALIFIED_FAMILIES);
    info!(
        run = run.id_or_unknown(),
        windows = windows.len(),
        markers = markers.values().map(Vec::len).sum::<usize>(),
        "windows built"
    );
    if windows.is_empty() {
        warn!("no windows found; the report will carry no records");
    }

    let registry = MetricRegistry::standard();
    let mut agg = RunAggregation::new(&registry, &windows);

    let reader = measure::open_measurements(measurements)?;
    measure::for_each_value(reader, |raw| {
        agg.observe_value(&raw);
        Ok(())
    })
    .with_context(|| format!("decode measurements file {}", measurements.display()))?;

    let stats = agg.stats();
    info!(
        rows = stats.total_rows_seen,
        updates = stats.updates_written,
        fallback = agg.match_mode() == MatchMode::Fallback,
        "measurements folded"
    );
    debug!(aliases = ?agg.aliases(), "raw entities folded into canonical names");

    let sources = SourceFiles {
        phase_data: phase_data.display().to_string(),
        measurements: measurements.display().to_string(),
    };
    Ok(model::build_report(run, sources, markers, agg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render;
    use flate2::read::GzDecoder;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use std::fs::File;
    use std::io::Write;

    fn phase_doc() -> Value {
        json!({
            "data": {
                "id": "abc-123",
                "name": "rag energy",
                "machine_id": 7,
                "warnings": [],
                "failed": false,
                "phases": [
                    {"name": "[BASELINE]", "start": 0, "end": 100},
                    {"name": "[RUNTIME]", "start": 100, "end": 1000},
                    {"name": "Query", "start": 400, "end": 900},
                    {"name": "[REMOVE]", "start": 1000, "end": 1100, "hidden": true}
                ],
                "logs": {"rag-app": [
                    {"cmd": "python -m app.indexing", "stdout": "start\n##GMT_MARK## ts_us=150 event=INDEX_START\nnoise ##GMT_MARK## bad\n##GMT_MARK## ts_us=350 event=INDEX_END docs=12\n"},
                    {"cmd": "docker run -it -d --name rag-app rag:latest", "stdout": "##GMT_MARK## ts_us=500 event=RETRIEVAL_START q_id=1\n##GMT_MARK## ts_us=600 event=RETRIEVAL_END q_id=1\n##GMT_MARK## ts_us=700 event=RETRIEVAL_END q_id=2\n"}
                ]}
            }
        })
    }

    fn measurements_doc(rows: &[Value]) -> Value {
        json!({"success": true, "data": rows})
    }

    fn write(dir: &Path, name: &str, v: &Value) -> std::path::PathBuf {
        let p = dir.join(name);
        fs::write(&p, serde_json::to_vec(v).unwrap()).unwrap();
        p
    }

    fn rows() -> Vec<Value> {
        vec![
            json!(["Package_0", 50, "cpu_energy_rapl_msr_component", 10, "uJ"]),
            json!(["Package_0", 200, "cpu_energy_rapl_msr_component", 100, "uJ"]),
            json!(["Package_0", 550, "cpu_energy_rapl_msr_component", 200, "uJ"]),
            json!(["Package_0", 580, "cpu_energy_rapl_msr_component", 300, "uJ"]),
            json!(["rag-app", 550, "memory_used_cgroup_container", 2097152, "Bytes"]),
            json!(["coretemp-isa-0000_Core-1", 560, "lmsensors_temperature_component", 4100, "centi°C"]),
            json!(["bogus"]),
            json!(["x", 560, "unknown_metric", 1, "u"]),
        ]
    }

    #[test]
    fn merges_phase_data_and_measurements() {
        let dir = tempfile::tempdir().unwrap();
        let phase = write(dir.path(), "2025-02-03_abc_phase-data.json", &phase_doc());
        let meas = write(dir.path(), "m.json", &measurements_doc(&rows()));

        let report = merge_run(&meas, &phase).unwrap();
        let doc = serde_json::to_value(&report).unwrap();

        let names: Vec<&str> = doc["windows"]
            .as_array()
            .unwrap()
            .iter()
            .map(|w| w["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                "[BASELINE]",
                "[RUNTIME]",
                "Indexing/INDEX",
                "Query",
                "RAG Querries/RETRIEVAL/1",
            ]
        );

        assert_eq!(doc["run"]["date"], json!("2025-02-03"));
        assert_eq!(doc["run"]["machine_id"], json!(7));
        assert_eq!(doc["stats"]["total_rows_seen"], json!(8));

        let retrieval = doc["records"]
            .as_array()
            .unwrap()
            .iter()
            .find(|r| r["window"] == "RAG Querries/RETRIEVAL/1")
            .unwrap();
        assert_eq!(
            retrieval["metrics"]["cpu_energy_rapl_msr_component"]["entities"]["Package_0"],
            json!({"sum": 500.0, "sum_Wh": 500.0 / 3.6e9, "count": 2})
        );
        assert_eq!(
            retrieval["metrics"]["memory_used_cgroup_container"]["entities"]["rag-app"],
            json!({"mean": 2097152.0, "mean_MiB": 2.0, "max": 2097152.0, "count": 1})
        );
        assert_eq!(
            retrieval["metrics"]["lmsensors_temperature_component"]["entities"]["TEMP_CORE"],
            json!({"mean": 41.0, "max": 41.0, "count": 1})
        );

        assert_eq!(doc["markers"]["Indexing"][1]["meta"], json!({"docs": "12"}));
        assert_eq!(doc["markers"]["RAG Querries"].as_array().unwrap().len(), 3);
        assert_eq!(
            doc["entity_mappings"]["TEMP_CORE"],
            json!(["coretemp-isa-0000_Core-1"])
        );
    }

    #[test]
    fn shuffled_measurements_give_identical_records() {
        let dir = tempfile::tempdir().unwrap();
        let phase = write(dir.path(), "phase.json", &phase_doc());

        let sorted = rows();
        let mut shuffled = sorted.clone();
        shuffled.reverse();
        let a = write(dir.path(), "a.json", &measurements_doc(&sorted));
        let b = write(dir.path(), "b.json", &measurements_doc(&shuffled));

        let ra = merge_run(&a, &phase).unwrap();
        let rb = merge_run(&b, &phase).unwrap();
        assert_eq!(ra.records, rb.records);
        assert_eq!(ra.stats, rb.stats);
    }

    #[test]
    fn gzip_measurements_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let phase = write(dir.path(), "phase.json", &phase_doc());
        let gz = dir.path().join("m.json.gz");
        let mut enc = flate2::write::GzEncoder::new(
            File::create(&gz).unwrap(),
            flate2::Compression::fast(),
        );
        enc.write_all(&serde_json::to_vec(&measurements_doc(&rows())).unwrap())
            .unwrap();
        enc.finish().unwrap();

        let report = merge_run(&gz, &phase).unwrap();
        assert_eq!(report.stats.total_rows_seen, 8);
    }

    #[test]
    fn unreadable_inputs_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let phase = write(dir.path(), "phase.json", &phase_doc());
        let meas = write(dir.path(), "m.json", &measurements_doc(&rows()));

        assert!(merge_run(&meas, &dir.path().join("missing.json")).is_err());
        assert!(merge_run(&dir.path().join("m.csv"), &phase).is_err());

        let broken = dir.path().join("broken.json");
        fs::write(&broken, br#"{"data": [["a", 1"#).unwrap();
        assert!(merge_run(&broken, &phase).is_err());
    }

    #[test]
    fn hidden_phase_without_bounds_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let phase = write(
            dir.path(),
            "phase.json",
            &json!({"data": {"phases": [
                {"name": "[BASELINE]", "start": 0, "end": 100},
                {"name": "[REMOVE]", "hidden": true}
            ]}}),
        );
        let meas = write(dir.path(), "m.json", &measurements_doc(&rows()));

        let report = merge_run(&meas, &phase).unwrap();
        assert_eq!(report.windows.len(), 1);
        assert_eq!(report.windows[0].name, "[BASELINE]");
    }

    #[test]
    fn null_measurement_data_gives_empty_records() {
        let dir = tempfile::tempdir().unwrap();
        let phase = write(dir.path(), "phase.json", &phase_doc());
        let meas = write(dir.path(), "m.json", &json!({"success": false, "data": null}));

        let report = merge_run(&meas, &phase).unwrap();
        assert_eq!(report.stats.total_rows_seen, 0);
        assert_eq!(report.records.len(), report.windows.len());
    }

    #[test]
    fn writes_gzipped_report() {
        let dir = tempfile::tempdir().unwrap();
        let phase = write(dir.path(), "2025-02-03_x_phase-data.json", &phase_doc());
        let meas = write(dir.path(), "m.json", &measurements_doc(&rows()));
        let out_dir = dir.path().join("processed");

        let report = merge_run(&meas, &phase).unwrap();
        let path = render::write_report(&report, &out_dir, 9).unwrap();
        assert_eq!(path, out_dir.join("2025-02-03_abc-123_merged.json.gz"));

        let doc: Value = serde_json::from_reader(GzDecoder::new(File::open(&path).unwrap())).unwrap();
        assert_eq!(doc["notes"]["timebase"], json!("unix_us"));
        assert_eq!(doc["run"]["id"], json!("abc-123"));
    }
}
