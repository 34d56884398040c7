use std::fmt;

use printqc_types::InputError;

#[derive(Debug)]
pub enum OutputError {
    Io(std::io::Error),
    /// A heatmap or annotation could not be built from the report.
    Render(InputError),
    Encode(image::ImageError),
    Json(serde_json::Error),
    /// The blocking render task panicked or was cancelled.
    Worker(String),
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputError::Io(err) => write!(f, "failed to write output: {err}"),
            OutputError::Render(err) => write!(f, "failed to render report image: {err}"),
            OutputError::Encode(err) => write!(f, "failed to encode image: {err}"),
            OutputError::Json(err) => write!(f, "failed to serialize report: {err}"),
            OutputError::Worker(reason) => write!(f, "render task failed: {reason}"),
        }
    }
}

impl std::error::Error for OutputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OutputError::Io(err) => Some(err),
            OutputError::Render(err) => Some(err),
            OutputError::Encode(err) => Some(err),
            OutputError::Json(err) => Some(err),
            OutputError::Worker(_) => None,
        }
    }
}

impl From<std::io::Error> for OutputError {
    fn from(value: std::io::Error) -> Self {
        OutputError::Io(value)
    }
}

impl From<InputError> for OutputError {
    fn from(value: InputError) -> Self {
        OutputError::Render(value)
    }
}

impl From<image::ImageError> for OutputError {
    fn from(value: image::ImageError) -> Self {
        OutputError::Encode(value)
    }
}

impl From<serde_json::Error> for OutputError {
    fn from(value: serde_json::Error) -> Self {
        OutputError::Json(value)
    }
}

impl From<tokio::task::JoinError> for OutputError {
    fn from(value: tokio::task::JoinError) -> Self {
        OutputError::Worker(value.to_string())
    }
}
