//! Visual comparison of a master artwork against a printed sample: alignment,
//! change extraction, region merging and classification.

pub mod align;
pub mod classify;
pub mod color;
pub mod extract;
pub mod merge;
pub mod pipeline;
pub mod region;
pub mod structural;

pub use align::{AlignError, Aligner, Alignment, AlignmentOutcome, AlignmentSettings};
pub use classify::{Classification, DifferenceClassifier, RegionFeatures, RegionTexts};
pub use color::{ColorError, PaletteSettings, delta_e, dominant_palette};
pub use extract::{Extraction, ExtractionSettings, extract_differences};
pub use merge::{ELEMENT_MERGE_GAP, difference_merge_gap, merge_boxes, merge_groups};
pub use region::{CROP_THUMBNAIL_SIDE, describe_region, describe_regions};
pub use structural::{StructuralMap, structural_similarity};
