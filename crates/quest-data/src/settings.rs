use crate::ConfigError;
use serde::{Deserialize, Serialize};

/// Channel layout the colour bounds are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    Rgb,
    Bgr,
    /// Hue 0-180, saturation and value 0-255.
    Hsv,
}

/// Inclusive per-channel colour range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorBounds {
    pub space: ColorSpace,
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl Default for ColorBounds {
    /// Link-green in HSV.
    fn default() -> Self {
        Self {
            space: ColorSpace::Hsv,
            lower: [50, 100, 100],
            upper: [75, 255, 255],
        }
    }
}

impl ColorBounds {
    pub fn validate(&self, key: &str) -> Result<(), ConfigError> {
        if self.lower.iter().zip(&self.upper).any(|(lo, hi)| lo > hi) {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("lower {:?} exceeds upper {:?}", self.lower, self.upper),
            });
        }
        if self.space == ColorSpace::Hsv && self.lower[0] > 180 {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                reason: "hue lower bound above 180".to_string(),
            });
        }
        Ok(())
    }
}

/// Rectangular structuring element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kernel {
    pub width: u32,
    pub height: u32,
}

/// Optional mask clean-up applied before component extraction: an opening with
/// `open`, then a dilation with `dilate`. Both are off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskCleanup {
    #[serde(default)]
    pub open: Option<Kernel>,
    #[serde(default)]
    pub dilate: Option<Kernel>,
}

impl MaskCleanup {
    pub const MAX_KERNEL: u32 = 15;

    pub fn validate(&self, key: &str) -> Result<(), ConfigError> {
        for kernel in [self.open, self.dilate].into_iter().flatten() {
            if kernel.width == 0
                || kernel.height == 0
                || kernel.width > Self::MAX_KERNEL
                || kernel.height > Self::MAX_KERNEL
            {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: format!(
                        "kernel {}x{} must be between 1 and {} on each side",
                        kernel.width,
                        kernel.height,
                        Self::MAX_KERNEL
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Size and aspect-ratio window a blob must fall into to count as a link underline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapeBand {
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub min_aspect_ratio: f64,
}

impl Default for ShapeBand {
    fn default() -> Self {
        Self {
            min_width: 20,
            max_width: 200,
            min_height: 1,
            max_height: 7,
            min_aspect_ratio: 4.0,
        }
    }
}

impl ShapeBand {
    pub fn validate(&self, key: &str) -> Result<(), ConfigError> {
        let reason = if self.min_width > self.max_width {
            Some("min_width exceeds max_width")
        } else if self.min_height > self.max_height {
            Some("min_height exceeds max_height")
        } else if !(self.min_aspect_ratio >= 0.0) {
            Some("min_aspect_ratio must be a non-negative number")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    pub language: String,
    /// Page segmentation mode for the single task-type line.
    pub task_type_psm: u8,
    /// Page segmentation mode for the multi-line description.
    pub description_psm: u8,
    pub scale_factor: u32,
    pub preprocess: bool,
    /// Literal bracketed labels stripped before keyword matching.
    pub tag_decorations: Vec<String>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            language: "chi_sim".to_string(),
            task_type_psm: 7,
            description_psm: 3,
            scale_factor: 3,
            preprocess: true,
            tag_decorations: vec!["[江湖历练任务]".to_string(), "[江湖历练企务]".to_string()],
        }
    }
}

impl OcrSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.language.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "ocr.language".to_string(),
                reason: "language is empty".to_string(),
            });
        }
        for (key, psm) in [
            ("ocr.task_type_psm", self.task_type_psm),
            ("ocr.description_psm", self.description_psm),
        ] {
            if psm > 13 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: format!("page segmentation mode {psm} is not in 0..=13"),
                });
            }
        }
        Ok(())
    }

    /// Upscale factor actually used by preprocessing.
    pub fn effective_scale(&self) -> u32 {
        self.scale_factor.clamp(2, 4)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    pub color: ColorBounds,
    pub min_area: u64,
    pub morphology: MaskCleanup,
    pub shape: ShapeBand,
    /// Pixels to move the click point above the underline's centre.
    pub click_bias: u32,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            color: ColorBounds::default(),
            min_area: 1,
            morphology: MaskCleanup::default(),
            shape: ShapeBand::default(),
            click_bias: 8,
        }
    }
}

/// Screen-absolute rectangle to capture instead of the whole window or monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Case-insensitive substring of the game window title. Empty means primary monitor.
    pub window_title: Option<String>,
    pub region: Option<CaptureRegion>,
    /// Frames arriving this long after a click are skipped while the character walks there.
    pub wait_after_action_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            window_title: None,
            region: None,
            wait_after_action_ms: 15_000,
        }
    }
}

impl CaptureSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(region) = self.region {
            if region.width == 0 || region.height == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "capture.region".to_string(),
                    reason: format!("{}x{} region is empty", region.width, region.height),
                });
            }
        }
        Ok(())
    }

    pub fn wait_after_action(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.wait_after_action_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugSettings {
    pub save_images: bool,
    pub dir: std::path::PathBuf,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            save_images: false,
            dir: std::path::PathBuf::from("debug_output"),
        }
    }
}
