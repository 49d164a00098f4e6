//! Records served by the links API and the payloads sent to it.
//!
//! Field names follow the server's camelCase JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::error::ApiError;

/// Feature that unlocks [`ApiClient::link_ai_summary`](super::ApiClient::link_ai_summary)
pub const AI_SUMMARY_FEATURE: &str = "ai_summary";

const MAX_TEXT_LEN: usize = 1000;
const MAX_TAGS_PER_LINK: usize = 100;

/// A tag that can be attached to links
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
  pub id: String,
  pub name: String,
  /// Display color, as chosen in the tag picker
  pub color: String,
  pub created_at: DateTime<Utc>,
}

/// A saved link with its tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
  pub id: String,
  pub name: String,
  pub url: String,
  /// Absent in create/update responses, which don't include relations
  #[serde(default)]
  pub tags: Vec<Tag>,
  pub created_at: DateTime<Utc>,
}

/// A feature the current user has been granted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturePermission {
  pub id: String,
  pub feature_name: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FeaturePermissionsResponse {
  pub permissions: Vec<FeaturePermission>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AiSummaryResponse {
  pub data: String,
}

/// Error body returned by the server for non-2xx responses
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
  pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLink {
  pub name: String,
  pub url: String,
  pub tag_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkUpdate {
  pub id: String,
  pub name: String,
  pub url: String,
  pub tag_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTag {
  pub name: String,
  pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagUpdate {
  pub id: String,
  pub name: String,
  pub color: String,
}

impl NewLink {
  /// Check the payload against the server's limits before sending it.
  pub fn validate(&self) -> Result<(), ApiError> {
    validate_link(&self.name, &self.url, &self.tag_ids)
  }
}

impl LinkUpdate {
  pub fn validate(&self) -> Result<(), ApiError> {
    validate_text("id", &self.id)?;
    validate_link(&self.name, &self.url, &self.tag_ids)
  }
}

impl NewTag {
  pub fn validate(&self) -> Result<(), ApiError> {
    validate_text("name", &self.name)?;
    validate_text("color", &self.color)
  }
}

impl TagUpdate {
  pub fn validate(&self) -> Result<(), ApiError> {
    validate_text("id", &self.id)?;
    validate_text("name", &self.name)?;
    validate_text("color", &self.color)
  }
}

fn validate_link(name: &str, url: &str, tag_ids: &[String]) -> Result<(), ApiError> {
  validate_text("name", name)?;
  validate_text("url", url)?;
  Url::parse(url).map_err(|e| ApiError::Invalid(format!("url '{}': {}", url, e)))?;

  if tag_ids.len() > MAX_TAGS_PER_LINK {
    return Err(ApiError::Invalid(format!(
      "a link can have at most {} tags",
      MAX_TAGS_PER_LINK
    )));
  }
  for id in tag_ids {
    validate_text("tag id", id)?;
  }
  Ok(())
}

pub(crate) fn validate_text(field: &str, value: &str) -> Result<(), ApiError> {
  if value.trim().is_empty() {
    return Err(ApiError::Invalid(format!("{} must not be empty", field)));
  }
  if value.chars().count() > MAX_TEXT_LEN {
    return Err(ApiError::Invalid(format!(
      "{} must be at most {} characters",
      field, MAX_TEXT_LEN
    )));
  }
  Ok(())
}

/// Whether `feature_name` is among the granted permissions.
pub fn has_feature_permission(feature_name: &str, permissions: &[FeaturePermission]) -> bool {
  permissions
    .iter()
    .any(|permission| permission.feature_name == feature_name)
}
