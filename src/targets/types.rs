//! Wire types of the agent `/api/v1/targets` response
//!
//! Only `labels` and `health` of active targets are consumed. Every field is
//! decoded leniently: a missing or `null` value decodes to its default, so one
//! odd target never fails the whole document.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

pub const STATUS_ERROR: &str = "error";
pub const HEALTH_UP: &str = "up";
pub const INSTANCE_LABEL: &str = "instance";

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Label maps with `null` values keep the key with an empty value.
fn lenient_labels<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Option<String>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, v.unwrap_or_default()))
        .collect())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetStatusDocument {
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub data: TargetData,
}

impl TargetStatusDocument {
    /// Only an explicit `"error"` status rejects the document; agents that
    /// omit the field are accepted.
    pub fn is_error(&self) -> bool {
        self.status == STATUS_ERROR
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TargetData {
    #[serde(deserialize_with = "null_as_default")]
    pub active_targets: Vec<RawTarget>,
    #[serde(deserialize_with = "null_as_default")]
    pub dropped_targets: Vec<RawTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawTarget {
    #[serde(deserialize_with = "lenient_labels")]
    pub labels: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_as_default")]
    pub health: String,
    pub last_scrape: Option<String>,
    pub last_scrape_duration: Option<f64>,
    pub scrape_pool: Option<String>,
    pub scrape_url: Option<String>,
}

impl RawTarget {
    pub fn instance(&self) -> Option<&str> {
        self.labels.get(INSTANCE_LABEL).map(String::as_str)
    }
}
