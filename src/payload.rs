//! Docker registry push notification structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Body of a registry push notification.
///
/// Every field defaults when absent or `null` so that partial payloads still
/// decode; only `push_data.tag`, `repository.repo_name` and `callback_url`
/// drive rule matching.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Payload {
    #[serde(deserialize_with = "null_as_default")]
    pub callback_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub push_data: PushData,
    #[serde(deserialize_with = "null_as_default")]
    pub repository: Repository,
}

impl Payload {
    /// Decode the first JSON value of a request body.
    ///
    /// Anything after that value is ignored. An empty body is an error.
    pub fn from_body(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::Deserializer::from_slice(body)
            .into_iter::<Self>()
            .next()
            .unwrap_or_else(|| Err(serde::de::Error::custom("empty request body")))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushData {
    #[serde(deserialize_with = "null_as_default")]
    pub images: Vec<String>,
    /// Seconds since the epoch, as sent by the registry
    #[serde(deserialize_with = "null_as_default")]
    pub pushed_at: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub pusher: String,
    #[serde(deserialize_with = "null_as_default")]
    pub tag: String,
}

impl PushData {
    pub fn pushed_at_utc(&self) -> Option<DateTime<Utc>> {
        epoch_seconds_to_utc(self.pushed_at)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Repository {
    #[serde(deserialize_with = "null_as_default")]
    pub comment_count: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub date_created: f64,
    pub description: Option<String>,
    pub full_description: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub is_official: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub is_private: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub is_trusted: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub namespace: String,
    #[serde(deserialize_with = "null_as_default")]
    pub owner: String,
    /// Full `namespace/name` of the repository
    #[serde(deserialize_with = "null_as_default")]
    pub repo_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub repo_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub star_count: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
}

impl Repository {
    pub fn date_created_utc(&self) -> Option<DateTime<Utc>> {
        epoch_seconds_to_utc(self.date_created)
    }
}

/// Registries send `null` for fields they have no value for.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn epoch_seconds_to_utc(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    let whole = seconds.trunc() as i64;
    let nanos = (seconds.fract() * 1_000_000_000.0).round() as u32;
    DateTime::from_timestamp(whole, nanos.min(999_999_999))
}
