//! Measurement stream: streaming decode plus per-row normalization.

pub mod normalize;
pub mod stream;

pub use normalize::{EntityAliasSet, Normalizer};
pub use stream::{MeasurementRow, for_each_value, open_json, open_measurements};
