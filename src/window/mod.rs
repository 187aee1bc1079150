//! Time windows measurements are aggregated against.
//!
//! A window is the half-open interval `[start_us, end_us)`. Windows may nest
//! or overlap; a timestamp can belong to any number of them.

pub mod build;
pub mod matcher;

pub use build::build_windows;
pub use matcher::{MatchMode, WindowMatcher};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    /// Declared phase with a bracketed name, e.g. `[BOOT]`.
    Phase,
    /// Declared usage-scenario step.
    WorkflowStep,
    /// Derived from a START/END marker pair.
    SubWindow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub name: String,
    pub kind: WindowKind,
    pub start_us: i64,
    pub end_us: i64,
}

impl Window {
    pub fn contains(&self, ts_us: i64) -> bool {
        self.start_us <= ts_us && ts_us < self.end_us
    }

    pub fn duration_s(&self) -> f64 {
        (self.end_us - self.start_us) as f64 / 1e6
    }
}

/// Window list sorted by `start_us`, frozen before matching.
#[derive(Debug, Clone, Default)]
pub struct WindowSet(Vec<Window>);

impl WindowSet {
    pub fn new(mut windows: Vec<Window>) -> Self {
        windows.sort_by_key(|w| w.start_us);
        Self(windows)
    }

    pub fn as_slice(&self) -> &[Window] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Window> {
        self.0.iter()
    }
}

impl std::ops::Index<usize> for WindowSet {
    type Output = Window;

    fn index(&self, idx: usize) -> &Window {
        &self.0[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_is_half_open() {
        let w = Window {
            name: "w".into(),
            kind: WindowKind::Phase,
            start_us: 10,
            end_us: 20,
        };
        assert!(!w.contains(9));
        assert!(w.contains(10));
        assert!(w.contains(19));
        assert!(!w.contains(20));
        assert_eq!(w.duration_s(), 1e-5);
    }
}
