mod keywords;
mod layout;
mod settings;

pub use keywords::{KeywordGroup, KeywordTable};
pub use layout::{LayoutEntry, LayoutTable};
pub use settings::{
    CaptureRegion, CaptureSettings, ColorBounds, ColorSpace, DebugSettings, Kernel, LinkSettings,
    MaskCleanup, OcrSettings, ShapeBand,
};

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Layout element holding the task-type line under the tracker header.
pub const TASK_TYPE_ELEMENT: &str = "tasktype";
/// Layout element holding the task description block.
pub const TASK_DESC_ELEMENT: &str = "taskdesc";

const REQUIRED_ELEMENTS: [&str; 2] = [TASK_TYPE_ELEMENT, TASK_DESC_ELEMENT];

/// Missing or malformed configuration. Always fatal, never defaulted.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("missing required key {0}")]
    MissingKey(String),
    #[error("layout key {key} has non-integer or out-of-range value {value}")]
    InvalidLayoutValue { key: String, value: String },
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnchorSettings {
    /// Template image of the tracker header; relative paths resolve against the config file.
    pub template: PathBuf,
    #[serde(default = "default_anchor_threshold")]
    pub threshold: f64,
}

fn default_anchor_threshold() -> f64 {
    0.8
}

fn default_link_categories() -> Vec<String> {
    vec!["见多识广".to_string(), "急人所急".to_string()]
}

fn default_description_categories() -> Vec<String> {
    vec!["急人所急".to_string()]
}

/// Raw file format. Layout stays untyped here so its errors can name the exact key.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    anchor: Option<AnchorSettings>,
    layout: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    ocr: OcrSettings,
    #[serde(default)]
    keywords: KeywordTable,
    #[serde(default)]
    items: KeywordTable,
    #[serde(default)]
    link: LinkSettings,
    #[serde(default = "default_link_categories")]
    link_categories: Vec<String>,
    #[serde(default = "default_description_categories")]
    description_categories: Vec<String>,
    #[serde(default)]
    capture: CaptureSettings,
    #[serde(default)]
    debug: DebugSettings,
}

/// Everything the perception pipeline reads, validated once at load time.
#[derive(Debug, Clone)]
pub struct QuestConfig {
    pub anchor: AnchorSettings,
    pub layout: LayoutTable,
    pub ocr: OcrSettings,
    /// Task category -> aliases, in file order.
    pub keywords: KeywordTable,
    /// Standard item name -> aliases, in file order.
    pub items: KeywordTable,
    pub link: LinkSettings,
    /// Categories whose description carries a clickable link.
    pub link_categories: Vec<String>,
    /// Categories whose full description is worth OCR-ing.
    pub description_categories: Vec<String>,
    pub capture: CaptureSettings,
    pub debug: DebugSettings,
}

impl QuestConfig {
    /// Load and validate the configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let config = Self::from_json_str(&content, base_dir).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;

        tracing::info!(
            "Loaded config from {}: {} layout element(s), {} task categories, {} item(s)",
            path.display(),
            config.layout.len(),
            config.keywords.len(),
            config.items.len()
        );
        Ok(config)
    }

    /// Parse configuration text; relative paths resolve against `base_dir`.
    pub fn from_json_str(content: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            serde_json::from_str(content).map_err(|source| ConfigError::Parse {
                path: PathBuf::from("<inline>"),
                source,
            })?;

        let mut anchor = file
            .anchor
            .ok_or_else(|| ConfigError::MissingKey("anchor.template".to_string()))?;
        if anchor.template.as_os_str().is_empty() {
            return Err(ConfigError::MissingKey("anchor.template".to_string()));
        }
        if anchor.template.is_relative() {
            anchor.template = base_dir.join(&anchor.template);
        }
        if !(0.0..=1.0).contains(&anchor.threshold) {
            return Err(ConfigError::InvalidValue {
                key: "anchor.threshold".to_string(),
                reason: format!("{} is outside [0, 1]", anchor.threshold),
            });
        }

        let layout_section = file
            .layout
            .ok_or_else(|| ConfigError::MissingKey("layout".to_string()))?;
        let layout = LayoutTable::from_json(&layout_section)?;
        for element in REQUIRED_ELEMENTS {
            layout.get(element)?;
        }

        file.ocr.validate()?;
        file.keywords.validate("keywords")?;
        file.items.validate("items")?;
        file.link.color.validate("link.color")?;
        file.link.morphology.validate("link.morphology")?;
        file.link.shape.validate("link.shape")?;
        file.capture.validate()?;

        if file.keywords.is_empty() {
            tracing::warn!("Keyword table is empty; no task will ever be classified");
        }
        for category in file.link_categories.iter().chain(&file.description_categories) {
            if !file.keywords.contains(category) {
                tracing::warn!("Category {:?} is not defined in the keyword table", category);
            }
        }

        let mut debug = file.debug;
        if debug.dir.is_relative() {
            debug.dir = base_dir.join(&debug.dir);
        }

        Ok(Self {
            anchor,
            layout,
            ocr: file.ocr,
            keywords: file.keywords,
            items: file.items,
            link: file.link,
            link_categories: file.link_categories,
            description_categories: file.description_categories,
            capture: file.capture,
            debug,
        })
    }

    pub fn needs_link(&self, category: &str) -> bool {
        self.link_categories.iter().any(|c| c == category)
    }

    pub fn needs_description(&self, category: &str) -> bool {
        self.description_categories.iter().any(|c| c == category)
    }
}
