// ABOUTME: Label selector configuration for choosing containers by label.
// ABOUTME: Accepts `true`, "key=value", or a {key, value} mapping.

use crate::checker::{DEFAULT_LABEL_KEY, DEFAULT_LABEL_VALUE};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelSelector {
    #[serde(default = "default_key")]
    pub key: String,
    #[serde(default = "default_value")]
    pub value: String,
}

fn default_key() -> String {
    DEFAULT_LABEL_KEY.to_string()
}

fn default_value() -> String {
    DEFAULT_LABEL_VALUE.to_string()
}

impl Default for LabelSelector {
    fn default() -> Self {
        LabelSelector {
            key: default_key(),
            value: default_value(),
        }
    }
}

impl LabelSelector {
    /// Parse `key=value`; a bare `key` matches the value `true`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        let (key, value) = match s.split_once('=') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => (s, DEFAULT_LABEL_VALUE),
        };

        if key.is_empty() {
            return Err(format!("label selector has an empty key: {s:?}"));
        }

        Ok(LabelSelector {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

pub fn deserialize_label<'de, D>(deserializer: D) -> Result<Option<LabelSelector>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let entry: Option<LabelEntry> = Option::deserialize(deserializer)?;
    match entry {
        None | Some(LabelEntry::Enabled(false)) => Ok(None),
        Some(LabelEntry::Enabled(true)) => Ok(Some(LabelSelector::default())),
        Some(LabelEntry::Pair(s)) => LabelSelector::parse(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(LabelEntry::Detailed(selector)) => Ok(Some(selector)),
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LabelEntry {
    Enabled(bool),
    Pair(String),
    Detailed(LabelSelector),
}
