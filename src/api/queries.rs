//! Query controllers for the links API, plus the mutations that invalidate them.

use std::sync::Arc;

use crate::cache::CacheStore;
use crate::query::{QueryController, RevalidateMode};

use super::client::ApiClient;
use super::error::ApiError;
use super::types::{FeaturePermission, Link, LinkUpdate, NewLink, NewTag, Tag, TagUpdate};

pub const LINKS_KEY: &str = "links";
pub const TAGS_KEY: &str = "tags";
pub const FEATURE_PERMISSIONS_KEY: &str = "feature-permissions";

/// Every query the application runs, sharing one cache store.
///
/// Reads go through the controllers; writes go through the mutation methods
/// here, which clear the affected entries once the server accepts them.
#[derive(Clone)]
pub struct Queries {
  client: ApiClient,
  store: Arc<CacheStore>,
  pub links: QueryController<Vec<Link>, ApiError>,
  pub tags: QueryController<Vec<Tag>, ApiError>,
  pub feature_permissions: QueryController<Vec<FeaturePermission>, ApiError>,
}

impl Queries {
  pub fn new(client: ApiClient, store: Arc<CacheStore>, mode: RevalidateMode) -> Self {
    let links = {
      let client = client.clone();
      QueryController::new(Arc::clone(&store), LINKS_KEY, move |signal| {
        let client = client.clone();
        async move { client.get_links(signal).await }
      })
      .with_revalidate_mode(mode)
    };

    let tags = {
      let client = client.clone();
      QueryController::new(Arc::clone(&store), TAGS_KEY, move |signal| {
        let client = client.clone();
        async move { client.get_tags(signal).await }
      })
      .with_revalidate_mode(mode)
    };

    let feature_permissions = {
      let client = client.clone();
      QueryController::new(Arc::clone(&store), FEATURE_PERMISSIONS_KEY, move |signal| {
        let client = client.clone();
        async move { client.get_feature_permissions(signal).await }
      })
      .with_revalidate_mode(mode)
    };

    Self {
      client,
      store,
      links,
      tags,
      feature_permissions,
    }
  }

  pub fn store(&self) -> &Arc<CacheStore> {
    &self.store
  }

  pub async fn create_link(&self, input: &NewLink) -> Result<Link, ApiError> {
    let link = self.client.create_link(input).await?;
    self.links.clear_cache();
    Ok(link)
  }

  pub async fn update_link(&self, input: &LinkUpdate) -> Result<Link, ApiError> {
    let link = self.client.update_link(input).await?;
    self.links.clear_cache();
    Ok(link)
  }

  pub async fn delete_link(&self, id: &str) -> Result<(), ApiError> {
    self.client.delete_link(id).await?;
    self.links.clear_cache();
    Ok(())
  }

  // Links embed their tags, so tag updates and deletes clear both entries.
  // A new tag is on no link yet.

  pub async fn create_tag(&self, input: &NewTag) -> Result<Tag, ApiError> {
    let tag = self.client.create_tag(input).await?;
    self.tags.clear_cache();
    Ok(tag)
  }

  pub async fn update_tag(&self, input: &TagUpdate) -> Result<Tag, ApiError> {
    let tag = self.client.update_tag(input).await?;
    self.tags.clear_cache();
    self.links.clear_cache();
    Ok(tag)
  }

  pub async fn delete_tag(&self, id: &str) -> Result<(), ApiError> {
    self.client.delete_tag(id).await?;
    self.tags.clear_cache();
    self.links.clear_cache();
    Ok(())
  }

  /// Generate a summary of the page behind a link. Not cached.
  pub async fn link_ai_summary(&self, id: &str) -> Result<String, ApiError> {
    self.client.link_ai_summary(id).await
  }

  /// Drop every cached value, so nothing from this session is shown to the next.
  ///
  /// Running fetches are cancelled before the store is cleared, so none of
  /// them can write the old session's data back.
  pub fn logout(&self) {
    self.links.cancel();
    self.tags.cancel();
    self.feature_permissions.cancel();
    self.store.clear();
    tracing::info!("query cache cleared on logout");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::query::QueryEventKind;
  use std::time::Duration;

  const LINKS_V1: &str = r#"[{ "id": "l1", "name": "Rust", "url": "https://www.rust-lang.org", "createdAt": "2025-03-01T00:00:00Z", "tags": [] }]"#;
  const TAGS_V1: &str =
    r#"[{ "id": "t1", "name": "lang", "color": "primary", "createdAt": "2025-03-01T00:00:00Z" }]"#;

  fn queries_for(server: &mockito::ServerGuard) -> Queries {
    let client = ApiClient::from_parts(&server.url(), None, Duration::from_secs(5)).unwrap();
    Queries::new(client, Arc::new(CacheStore::new()), RevalidateMode::Never)
  }

  #[tokio::test]
  async fn test_controllers_share_one_store() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("GET", "/links")
      .with_header("content-type", "application/json")
      .with_body(LINKS_V1)
      .create_async()
      .await;
    server
      .mock("GET", "/tags")
      .with_header("content-type", "application/json")
      .with_body(TAGS_V1)
      .create_async()
      .await;

    let queries = queries_for(&server);
    let (links, tags) = tokio::join!(queries.links.get_data(), queries.tags.get_data());

    assert_eq!(links.unwrap().len(), 1);
    assert_eq!(tags.unwrap()[0].name, "lang");
    assert_eq!(queries.store().keys(), vec![LINKS_KEY, TAGS_KEY]);
  }

  #[tokio::test]
  async fn test_link_mutation_clears_links_only() {
    let mut server = mockito::Server::new_async().await;
    let links_mock = server
      .mock("GET", "/links")
      .with_header("content-type", "application/json")
      .with_body(LINKS_V1)
      .expect(2)
      .create_async()
      .await;
    server
      .mock("GET", "/tags")
      .with_header("content-type", "application/json")
      .with_body(TAGS_V1)
      .create_async()
      .await;
    server
      .mock("DELETE", "/links/l1")
      .with_body(r#"{ "success": true }"#)
      .create_async()
      .await;

    let queries = queries_for(&server);
    queries.links.get_data().await.unwrap();
    queries.tags.get_data().await.unwrap();

    queries.delete_link("l1").await.unwrap();
    assert!(!queries.store().contains(LINKS_KEY));
    assert!(queries.store().contains(TAGS_KEY));

    // Cleared key goes back to the server
    queries.links.get_data().await.unwrap();
    links_mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_tag_mutation_clears_tags_and_links() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("GET", "/links")
      .with_header("content-type", "application/json")
      .with_body(LINKS_V1)
      .create_async()
      .await;
    server
      .mock("GET", "/tags")
      .with_header("content-type", "application/json")
      .with_body(TAGS_V1)
      .create_async()
      .await;
    server
      .mock("PUT", "/tags")
      .with_header("content-type", "application/json")
      .with_body(r#"{ "id": "t1", "name": "languages", "color": "primary", "createdAt": "2025-03-01T00:00:00Z" }"#)
      .create_async()
      .await;

    let queries = queries_for(&server);
    queries.links.get_data().await.unwrap();
    queries.tags.get_data().await.unwrap();

    let tag = queries
      .update_tag(&TagUpdate {
        id: "t1".to_string(),
        name: "languages".to_string(),
        color: "primary".to_string(),
      })
      .await
      .unwrap();

    assert_eq!(tag.name, "languages");
    assert!(queries.store().is_empty());
  }

  #[tokio::test]
  async fn test_failed_mutation_keeps_cache() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("GET", "/links")
      .with_header("content-type", "application/json")
      .with_body(LINKS_V1)
      .create_async()
      .await;
    server
      .mock("DELETE", "/links/l1")
      .with_status(404)
      .with_body(r#"{ "error": "Link not found" }"#)
      .create_async()
      .await;

    let queries = queries_for(&server);
    queries.links.get_data().await.unwrap();

    let err = queries.delete_link("l1").await.unwrap_err();
    assert_eq!(
      err,
      ApiError::Server {
        status: 404,
        message: "Link not found".to_string()
      }
    );
    assert!(queries.store().contains(LINKS_KEY));
  }

  #[tokio::test]
  async fn test_logout_clears_everything() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("GET", "/links")
      .with_header("content-type", "application/json")
      .with_body(LINKS_V1)
      .create_async()
      .await;

    let queries = queries_for(&server);
    queries.links.get_data().await.unwrap();
    assert!(!queries.store().is_empty());

    queries.logout();
    assert!(queries.store().is_empty());
  }

  #[tokio::test]
  async fn test_logout_discards_running_refresh() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("GET", "/links")
      .with_header("content-type", "application/json")
      .with_body(LINKS_V1)
      .create_async()
      .await;

    let client = ApiClient::from_parts(&server.url(), None, Duration::from_secs(5)).unwrap();
    let queries = Queries::new(client, Arc::new(CacheStore::new()), RevalidateMode::Background);
    let mut events = queries.links.subscribe();

    queries.links.get_data().await.unwrap();
    // Hit: serves the cached list and starts a refresh
    queries.links.get_data().await.unwrap();
    queries.logout();

    let mut kinds = Vec::new();
    while kinds.len() < 2 {
      let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no event in time")
        .unwrap();
      kinds.push(event.kind);
    }

    assert_eq!(kinds, vec![QueryEventKind::Fetched, QueryEventKind::Discarded]);
    assert!(queries.store().is_empty());
  }
}
