//! Plain-text rendering of records for the terminal.

use crate::api::{FeaturePermission, Link, Tag};

const NAME_WIDTH: usize = 32;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

pub fn format_links(links: &[Link]) -> String {
  if links.is_empty() {
    return "No links yet.".to_string();
  }

  links
    .iter()
    .map(|link| {
      let tags: Vec<&str> = link.tags.iter().map(|tag| tag.name.as_str()).collect();
      let mut line = format!(
        "{:<width$}  {}",
        truncate(&link.name, NAME_WIDTH),
        link.url,
        width = NAME_WIDTH
      );
      if !tags.is_empty() {
        line.push_str(&format!("  [{}]", tags.join(", ")));
      }
      line
    })
    .collect::<Vec<_>>()
    .join("\n")
}

pub fn format_tags(tags: &[Tag]) -> String {
  if tags.is_empty() {
    return "No tags yet.".to_string();
  }

  tags
    .iter()
    .map(|tag| {
      format!(
        "{:<width$}  {:<10}  {}",
        truncate(&tag.name, NAME_WIDTH),
        tag.color,
        tag.id,
        width = NAME_WIDTH
      )
    })
    .collect::<Vec<_>>()
    .join("\n")
}

pub fn format_permissions(permissions: &[FeaturePermission]) -> String {
  if permissions.is_empty() {
    return "No features enabled.".to_string();
  }

  permissions
    .iter()
    .map(|permission| {
      format!(
        "{}  (since {})",
        permission.feature_name,
        permission.created_at.format("%Y-%m-%d")
      )
    })
    .collect::<Vec<_>>()
    .join("\n")
}
