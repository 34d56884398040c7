mod error;
mod image;
mod json;
mod manager;
mod types;

pub use error::OutputError;
pub use self::image::{annotate, encode_jpeg, encode_png, heatmap};
pub use json::to_json;
pub use manager::{OutputManager, WrittenFiles};
pub use types::{ComparisonRecord, DifferenceRecord, encode_crop};
