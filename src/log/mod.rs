//! Marker extraction from captured process output.

pub mod parse;
pub mod row;

pub use parse::MarkerParser;
pub use row::{Marker, MarkerMap};
