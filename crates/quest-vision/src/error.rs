use quest_capture::{CaptureError, FrameSpace, Rect};
use quest_data::ConfigError;
use std::fmt;

/// What a `NotFound` outcome failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Anchor,
    Link,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Anchor => f.write_str("tracker anchor"),
            Target::Link => f.write_str("link underline"),
        }
    }
}

/// Outcome of a failed perception stage.
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    /// Expected and transient: the UI is not showing what we look for right now.
    #[error("{0} not found")]
    NotFound(Target),
    /// A resolved ROI does not fit the frame; the layout is wrong for this resolution.
    #[error("ROI {rect} exceeds the {frame_width}x{frame_height} frame")]
    OutOfBounds {
        rect: Rect<FrameSpace>,
        frame_width: u32,
        frame_height: u32,
    },
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("OCR engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("OCR recognition failed: {0}")]
    Recognition(String),
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl VisionError {
    /// Broken setup rather than a transient UI state; retrying will not help.
    pub fn is_fatal(&self) -> bool {
        matches!(self, VisionError::Config(_) | VisionError::Capture(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, VisionError::NotFound(_))
    }
}
