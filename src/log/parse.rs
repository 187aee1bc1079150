use crate::log::row::Marker;
use regex::Regex;
use std::collections::BTreeMap;

/// Token the instrumented application prints in front of every marker.
pub const MARK_PREFIX: &str = "##GMT_MARK##";

/// Line-oriented marker parser.
///
/// Expected line shape (anything may precede the prefix, e.g. a logger preamble):
/// ##GMT_MARK## ts_us=<int> event=<UPPER_SNAKE> [key=value ...]
///
/// Example:
/// INFO:app.time_marker:##GMT_MARK## ts_us=1712345678901234 event=RETRIEVAL_START q_id=7
pub struct MarkerParser {
    re: Regex,
}

impl MarkerParser {
    pub fn new() -> anyhow::Result<Self> {
        // Capture:
        // 1) ts_us: integer
        // 2) event: UPPER_SNAKE name
        // 3) rest: optional key=value tokens
        let re = Regex::new(r#"##GMT_MARK##\s+ts_us=(\d+)\s+event=([A-Z0-9_]+)(?:\s+(.*))?$"#)?;
        Ok(Self { re })
    }

    /// Parse every marker line in `text`, sorted by timestamp.
    ///
    /// Lines without the prefix are skipped, and so are prefixed lines that do
    /// not fit the shape: other instrumentation shares the same stdout.
    pub fn parse(&self, text: &str) -> Vec<Marker> {
        let mut out: Vec<Marker> = text
            .lines()
            .filter(|line| line.contains(MARK_PREFIX))
            .filter_map(|line| self.parse_line(line.trim()))
            .collect();

        // Stable: markers sharing a timestamp keep their log order.
        out.sort_by_key(|m| m.ts_us);
        out
    }

    fn parse_line(&self, line: &str) -> Option<Marker> {
        let caps = self.re.captures(line)?;

        let ts_us: i64 = caps.get(1)?.as_str().parse().ok()?;
        let event = caps.get(2)?.as_str().to_string();

        let mut meta = BTreeMap::new();
        if let Some(rest) = caps.get(3) {
            for tok in rest.as_str().split_whitespace() {
                if let Some((k, v)) = tok.split_once('=') {
                    meta.insert(k.to_string(), v.to_string());
                }
            }
        }

        Some(Marker { ts_us, event, meta })
    }
}
