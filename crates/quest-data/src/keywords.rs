use crate::ConfigError;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// One named group and the aliases that identify it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordGroup {
    pub name: String,
    pub aliases: Vec<String>,
}

/// Ordered `name -> [alias, ...]` table.
///
/// Iteration follows the order the groups appear in the source document, which is
/// what decides the winner when aliases overlap between groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeywordTable {
    groups: Vec<KeywordGroup>,
}

impl KeywordTable {
    pub fn new(groups: Vec<KeywordGroup>) -> Self {
        Self { groups }
    }

    pub fn from_pairs<N, A, I>(pairs: I) -> Self
    where
        N: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
        I: IntoIterator<Item = (N, A)>,
    {
        Self {
            groups: pairs
                .into_iter()
                .map(|(name, aliases)| KeywordGroup {
                    name: name.into(),
                    aliases: aliases.into_iter().map(Into::into).collect(),
                })
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeywordGroup> {
        self.groups.iter()
    }

    pub fn get(&self, name: &str) -> Option<&KeywordGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Reject blank names and blank aliases: an empty alias would match any text.
    pub fn validate(&self, section: &str) -> Result<(), ConfigError> {
        for group in &self.groups {
            if group.name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: section.to_string(),
                    reason: "group name is empty".to_string(),
                });
            }
            if group.aliases.iter().any(|a| a.trim().is_empty()) {
                return Err(ConfigError::InvalidValue {
                    key: format!("{section}.{}", group.name),
                    reason: "alias is empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for KeywordTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = KeywordTable;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of name to a list of aliases")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> Result<Self::Value, M::Error> {
                let mut groups = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, aliases)) = map.next_entry::<String, Vec<String>>()? {
                    if groups.iter().any(|g: &KeywordGroup| g.name == name) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate keyword group {name:?}"
                        )));
                    }
                    groups.push(KeywordGroup { name, aliases });
                }
                Ok(KeywordTable { groups })
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}
