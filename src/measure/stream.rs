//! Streaming decode of the GMT measurements document.
//!
//! JSON shape:
//! { "success": true, "data": [ [entity, ts_us, metric, value, unit], ... ] }
//!
//! Measurement exports are large, so the `data` array is walked with a serde
//! visitor and each row is handed to a callback as soon as it is decoded.
//! Only one row is alive at a time.

use crate::Result;

use anyhow::{Context, bail};
use flate2::read::MultiGzDecoder;
use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::Value;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// One decoded measurement row. Dropped right after it has been folded.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRow {
    pub entity: String,
    pub ts_us: i64,
    pub metric: String,
    pub value: f64,
    pub unit: String,
}

impl MeasurementRow {
    /// Decode a raw `[entity, ts_us, metric, value, unit]` array.
    ///
    /// Returns `None` for anything else; malformed rows are skipped, not fatal.
    pub fn from_value(v: &Value) -> Option<Self> {
        let arr = v.as_array()?;
        let [entity, ts, metric, value, unit] = arr.as_slice() else {
            return None;
        };
        Some(MeasurementRow {
            entity: as_text(entity)?,
            ts_us: as_i64(ts)?,
            metric: as_text(metric)?,
            value: as_f64(value)?,
            unit: as_text(unit)?,
        })
    }
}

fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Open a measurements file, transparently un-gzipping `.json.gz`.
pub fn open_measurements(path: &Path) -> Result<Box<dyn Read>> {
    open_json(path, "measurements")
}

/// Open a `.json` or `.json.gz` input; `what` names it in errors.
pub fn open_json(path: &Path, what: &str) -> Result<Box<dyn Read>> {
    let name = path.to_string_lossy();
    let file = File::open(path).with_context(|| format!("open {} file {}", what, name))?;

    if name.ends_with(".json.gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(BufReader::new(file)))))
    } else if name.ends_with(".json") {
        Ok(Box::new(BufReader::new(file)))
    } else {
        bail!("{} must be .json or .json.gz: {}", what, name);
    }
}

/// Walk every element of the top-level `data` array, calling `f` with each.
///
/// Other top-level keys are skipped without being materialized. A missing
/// or null `data` key simply yields no rows. Errors returned by `f` abort the walk.
pub fn for_each_value<R, F>(reader: R, mut f: F) -> Result<()>
where
    R: Read,
    F: FnMut(Value) -> Result<()>,
{
    let mut de = serde_json::Deserializer::from_reader(reader);
    de.deserialize_map(DocumentVisitor { f: &mut f })?;
    de.end()?;
    Ok(())
}

struct DocumentVisitor<'a, F> {
    f: &'a mut F,
}

impl<'de, F> Visitor<'de> for DocumentVisitor<'_, F>
where
    F: FnMut(Value) -> Result<()>,
{
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a measurements object with a `data` array")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        while let Some(key) = map.next_key::<String>()? {
            if key == "data" {
                map.next_value_seed(RowsSeed { f: &mut *self.f })?;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(())
    }
}

struct RowsSeed<'a, F> {
    f: &'a mut F,
}

impl<'de, F> DeserializeSeed<'de> for RowsSeed<'_, F>
where
    F: FnMut(Value) -> Result<()>,
{
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<(), D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_option(self)
    }
}

impl<'de, F> Visitor<'de> for RowsSeed<'_, F>
where
    F: FnMut(Value) -> Result<()>,
{
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an array of measurement rows or null")
    }

    /// Failed exports carry `"data": null`; that is an empty stream.
    fn visit_none<E>(self) -> std::result::Result<(), E>
    where
        E: de::Error,
    {
        Ok(())
    }

    fn visit_unit<E>(self) -> std::result::Result<(), E>
    where
        E: de::Error,
    {
        Ok(())
    }

    fn visit_some<D>(self, deserializer: D) -> std::result::Result<(), D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        while let Some(row) = seq.next_element::<Value>()? {
            (self.f)(row).map_err(|e| <A::Error as de::Error>::custom(format!("{:#}", e)))?;
        }
        Ok(())
    }
}
