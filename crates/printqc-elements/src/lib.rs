//! Design element inventory built from hand-made convolution features.

pub mod classify;
pub mod detector;
pub mod features;
pub mod filters;

pub use classify::classify_region;
pub use detector::{DetectorSettings, ElementDetector, inventory_diff};
pub use features::RegionStats;
pub use filters::{FeatureMaps, GaborBank, GaborSettings};
