//! Print quality control: compares a printed sample against its master
//! artwork and inventories design elements.

pub mod backend;
pub mod cli;
pub mod decode;
pub mod output;
pub mod pipeline;
pub mod settings;

pub use decode::{decode_image, read_image};
pub use pipeline::{
    Capabilities, CompareRequest, ComparisonArtifacts, ComparisonReport, InspectError, Inspector,
};
