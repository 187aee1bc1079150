//! Output writers for the merged document and filtered measurement exports.

pub mod json;

pub use json::{write_atomic, write_json_atomic, write_report};
