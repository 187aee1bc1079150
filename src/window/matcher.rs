//! Timestamp to window membership.
//!
//! Telemetry rows normally arrive in timestamp order, so the matcher sweeps
//! the start-sorted window list once: an index that only moves forward plus a
//! small active set. The first time a timestamp goes backwards the sweep state
//! can no longer be trusted and the matcher switches, for good, to scanning
//! every window per query. Both paths answer `start_us <= t < end_us`.

use crate::window::WindowSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Timestamps seen so far are non-decreasing; sweep state is valid.
    Normal,
    /// A timestamp went backwards; every query scans all windows.
    Fallback,
}

pub struct WindowMatcher<'w> {
    windows: &'w WindowSet,
    mode: MatchMode,
    /// Next window (by start) not yet activated.
    next: usize,
    /// Indices of windows whose start has been passed and end not yet reached.
    active: Vec<usize>,
    last_ts: Option<i64>,
    hits: Vec<usize>,
}

impl<'w> WindowMatcher<'w> {
    pub fn new(windows: &'w WindowSet) -> Self {
        Self {
            windows,
            mode: MatchMode::Normal,
            next: 0,
            active: Vec::new(),
            last_ts: None,
            hits: Vec::new(),
        }
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Indices (into the window set) of all windows containing `ts_us`.
    pub fn matches(&mut self, ts_us: i64) -> &[usize] {
        if self.mode == MatchMode::Normal && self.last_ts.is_some_and(|last| ts_us < last) {
            tracing::debug!(ts_us, last_ts = ?self.last_ts, "non-monotonic timestamp, matcher falls back to full scan");
            self.mode = MatchMode::Fallback;
            self.active.clear();
        }

        self.hits.clear();
        match self.mode {
            MatchMode::Normal => self.sweep(ts_us),
            MatchMode::Fallback => self.scan(ts_us),
        }
        &self.hits
    }

    fn sweep(&mut self, ts_us: i64) {
        self.last_ts = Some(ts_us);
        let windows: &'w WindowSet = self.windows;
        let windows = windows.as_slice();

        while self.next < windows.len() && windows[self.next].start_us <= ts_us {
            self.active.push(self.next);
            self.next += 1;
        }

        self.active.retain(|&i| ts_us < windows[i].end_us);

        self.hits.extend(
            self.active
                .iter()
                .copied()
                .filter(|&i| windows[i].contains(ts_us)),
        );
    }

    fn scan(&mut self, ts_us: i64) {
        self.hits.extend(
            self.windows
                .iter()
                .enumerate()
                .filter(|(_, w)| w.contains(ts_us))
                .map(|(i, _)| i),
        );
    }
}
