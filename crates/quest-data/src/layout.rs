use crate::ConfigError;
use serde_json::Value;
use std::collections::BTreeMap;

const SUFFIXES: [&str; 4] = ["_offsetx", "_offsety", "_width", "_height"];

/// Offsets and size of one UI element, relative to the anchor's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutEntry {
    pub offset_x: i32,
    pub offset_y: i32,
    /// Always > 0 once loaded.
    pub width: i32,
    /// Always > 0 once loaded.
    pub height: i32,
}

/// Validated layout entries keyed by element prefix (lower-cased).
///
/// Built from a flat key-value section where each element contributes the four keys
/// `{prefix}_offsetX`, `{prefix}_offsetY`, `{prefix}_width`, `{prefix}_height`.
/// Keys are case-insensitive. Every element that appears must be complete and every
/// value must be a signed integer; nothing is ever defaulted.
#[derive(Debug, Clone, Default)]
pub struct LayoutTable {
    entries: BTreeMap<String, LayoutEntry>,
}

impl LayoutTable {
    /// Parse a flat JSON section. Values may be integers or strings holding an integer.
    pub fn from_json(section: &BTreeMap<String, Value>) -> Result<Self, ConfigError> {
        let mut flat = BTreeMap::new();
        for (key, value) in section {
            let parsed = match value {
                Value::Number(n) => n.as_i64().and_then(|v| i32::try_from(v).ok()),
                Value::String(s) => s.trim().parse::<i32>().ok(),
                _ => None,
            };
            let parsed = parsed.ok_or_else(|| ConfigError::InvalidLayoutValue {
                key: key.clone(),
                value: value.to_string(),
            })?;
            flat.insert(key.to_lowercase(), parsed);
        }
        Self::from_flat(flat)
    }

    /// Parse string pairs, as found in an INI-style section.
    pub fn from_pairs<K, V, I>(pairs: I) -> Result<Self, ConfigError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut flat = BTreeMap::new();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            let parsed =
                value
                    .trim()
                    .parse::<i32>()
                    .map_err(|_| ConfigError::InvalidLayoutValue {
                        key: key.to_string(),
                        value: value.to_string(),
                    })?;
            flat.insert(key.to_lowercase(), parsed);
        }
        Self::from_flat(flat)
    }

    fn from_flat(flat: BTreeMap<String, i32>) -> Result<Self, ConfigError> {
        let prefixes: Vec<String> = flat
            .keys()
            .filter_map(|k| {
                SUFFIXES
                    .iter()
                    .find_map(|suffix| k.strip_suffix(suffix))
                    .map(str::to_string)
            })
            .collect();

        let mut entries = BTreeMap::new();
        for prefix in prefixes {
            if entries.contains_key(&prefix) {
                continue;
            }
            let get = |suffix: &str, display: &str| {
                flat.get(&format!("{prefix}{suffix}"))
                    .copied()
                    .ok_or_else(|| ConfigError::MissingKey(format!("layout.{prefix}_{display}")))
            };
            let entry = LayoutEntry {
                offset_x: get("_offsetx", "offsetX")?,
                offset_y: get("_offsety", "offsetY")?,
                width: get("_width", "width")?,
                height: get("_height", "height")?,
            };
            for (name, size) in [("width", entry.width), ("height", entry.height)] {
                if size <= 0 {
                    return Err(ConfigError::InvalidLayoutValue {
                        key: format!("{prefix}_{name}"),
                        value: size.to_string(),
                    });
                }
            }
            entries.insert(prefix, entry);
        }

        Ok(Self { entries })
    }

    /// Exact (case-insensitive) lookup by element prefix.
    pub fn get(&self, prefix: &str) -> Result<&LayoutEntry, ConfigError> {
        self.entries
            .get(&prefix.to_lowercase())
            .ok_or_else(|| ConfigError::MissingKey(format!("layout.{prefix}_offsetX")))
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.entries.contains_key(&prefix.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
