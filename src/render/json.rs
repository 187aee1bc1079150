use crate::Result;
use crate::model::MergedReport;

use anyhow::Context;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Output sink: plain or gzip-compressed, finished explicitly.
pub enum Sink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Sink {
    /// Create `path`; `level` of `Some(n)` gzips at level n (0..=9).
    pub fn create(path: &Path, level: Option<u32>) -> Result<Self> {
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let buf = BufWriter::new(file);
        Ok(match level {
            Some(lvl) => Sink::Gzip(GzEncoder::new(buf, Compression::new(lvl))),
            None => Sink::Plain(buf),
        })
    }

    /// Flush everything (including the gzip trailer) to disk.
    pub fn finish(self) -> Result<()> {
        let mut buf = match self {
            Sink::Plain(buf) => buf,
            Sink::Gzip(enc) => enc.finish().context("gzip finish")?,
        };
        buf.flush().context("flush output")?;
        Ok(())
    }
}

impl Write for Sink {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        match self {
            Sink::Plain(w) => w.write(data),
            Sink::Gzip(w) => w.write(data),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Sink::Plain(w) => w.flush(),
            Sink::Gzip(w) => w.flush(),
        }
    }
}

/// `<dir>/<date>_<run id>_merged.json.gz`
pub fn merged_output_path(out_dir: &Path, report: &MergedReport) -> PathBuf {
    out_dir.join(format!(
        "{}_{}_merged.json.gz",
        report.run.date,
        report.run.id_or_unknown()
    ))
}

/// Write `path` through a `.partial` sibling.
///
/// The final path only appears once `body` has written the whole document,
/// so an aborted run never leaves a truncated output behind.
pub fn write_atomic<F>(path: &Path, level: Option<u32>, body: F) -> Result<()>
where
    F: FnOnce(&mut Sink) -> Result<()>,
{
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    let result = Sink::create(&partial, level).and_then(|mut sink| {
        body(&mut sink)?;
        sink.finish()
    });

    if let Err(e) = result {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }

    fs::rename(&partial, path)
        .with_context(|| format!("rename {} -> {}", partial.display(), path.display()))?;
    Ok(())
}

/// Serialize `value` to `path` atomically.
pub fn write_json_atomic<T: Serialize>(value: &T, path: &Path, level: Option<u32>) -> Result<()> {
    write_atomic(path, level, |sink| {
        serde_json::to_writer(sink, value).with_context(|| format!("serialize {}", path.display()))
    })
}

/// Write the merged report gzipped at `level`.
pub fn write_report(report: &MergedReport, out_dir: &Path, level: u32) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("create output dir {}", out_dir.display()))?;
    let path = merged_output_path(out_dir, report);
    write_json_atomic(report, &path, Some(level))?;
    Ok(path)
}
