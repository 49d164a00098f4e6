//! Client for the links & tags API and the queries built on top of it.

mod client;
mod error;
mod queries;
mod types;

pub use client::ApiClient;
pub use error::ApiError;
pub use queries::{Queries, FEATURE_PERMISSIONS_KEY, LINKS_KEY, TAGS_KEY};
pub use types::{
  has_feature_permission, FeaturePermission, Link, LinkUpdate, NewLink, NewTag, Tag, TagUpdate,
  AI_SUMMARY_FEATURE,
};
