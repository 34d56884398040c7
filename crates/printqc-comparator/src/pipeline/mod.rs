pub mod components;
pub mod ops;
pub mod preprocess;

pub use components::{Component, external_components};
