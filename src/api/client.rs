use color_eyre::{eyre::eyre, Result};
use reqwest::header::COOKIE;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use url::Url;

use crate::cancel::CancelSignal;
use crate::config::Config;
use crate::query::FetchError;

use super::error::ApiError;
use super::types::{
  validate_text, AiSummaryResponse, ErrorBody, FeaturePermission, FeaturePermissionsResponse, Link,
  LinkUpdate, NewLink, NewTag, Tag, TagUpdate,
};

/// HTTP client for the links API
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: Url,
  session: Option<String>,
}

impl ApiClient {
  pub fn new(config: &Config) -> Result<Self> {
    Self::from_parts(
      &config.api_url,
      Config::get_session(),
      Duration::from_secs(config.timeout_secs),
    )
  }

  pub fn from_parts(base_url: &str, session: Option<String>, timeout: Duration) -> Result<Self> {
    let base_url =
      Url::parse(base_url).map_err(|e| eyre!("Invalid API url '{}': {}", base_url, e))?;
    if base_url.cannot_be_a_base() {
      return Err(eyre!("Invalid API url '{}': not a base url", base_url));
    }

    let http = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      session,
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  /// Get all links, newest first
  pub async fn get_links(&self, signal: CancelSignal) -> Result<Vec<Link>, FetchError<ApiError>> {
    cancellable(&signal, async {
      let request = self.request(Method::GET, &["links"])?;
      send_json::<Vec<Link>>(request).await
    })
    .await
  }

  pub async fn get_tags(&self, signal: CancelSignal) -> Result<Vec<Tag>, FetchError<ApiError>> {
    cancellable(&signal, async {
      let request = self.request(Method::GET, &["tags"])?;
      send_json::<Vec<Tag>>(request).await
    })
    .await
  }

  /// Get the features the current user has access to
  pub async fn get_feature_permissions(
    &self,
    signal: CancelSignal,
  ) -> Result<Vec<FeaturePermission>, FetchError<ApiError>> {
    cancellable(&signal, async {
      let request = self.request(Method::GET, &["feature-permissions"])?;
      let response: FeaturePermissionsResponse = send_json(request).await?;
      Ok::<_, ApiError>(response.permissions)
    })
    .await
  }

  pub async fn create_link(&self, input: &NewLink) -> Result<Link, ApiError> {
    input.validate()?;
    self.send_body(Method::POST, &["links"], input).await
  }

  pub async fn update_link(&self, input: &LinkUpdate) -> Result<Link, ApiError> {
    input.validate()?;
    self.send_body(Method::PUT, &["links"], input).await
  }

  pub async fn delete_link(&self, id: &str) -> Result<(), ApiError> {
    let request = self.request(Method::DELETE, &["links", id])?;
    send_json::<Value>(request).await?;
    Ok(())
  }

  pub async fn create_tag(&self, input: &NewTag) -> Result<Tag, ApiError> {
    input.validate()?;
    self.send_body(Method::POST, &["tags"], input).await
  }

  pub async fn update_tag(&self, input: &TagUpdate) -> Result<Tag, ApiError> {
    input.validate()?;
    self.send_body(Method::PUT, &["tags"], input).await
  }

  pub async fn delete_tag(&self, id: &str) -> Result<(), ApiError> {
    let request = self.request(Method::DELETE, &["tags", id])?;
    send_json::<Value>(request).await?;
    Ok(())
  }

  /// Ask the server for a Markdown summary of the page behind a link.
  ///
  /// Each call generates a new summary; nothing is cached. Requires the
  /// `ai_summary` feature permission and ownership of the link.
  pub async fn link_ai_summary(&self, id: &str) -> Result<String, ApiError> {
    validate_text("id", id)?;
    let request = self.request(Method::POST, &["links", id, "ai-summary"])?;
    let response: AiSummaryResponse = send_json(request).await?;
    Ok(response.data)
  }

  async fn send_body<B, R>(&self, method: Method, path: &[&str], body: &B) -> Result<R, ApiError>
  where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
  {
    let request = self.request(method, path)?.json(body);
    send_json(request).await
  }

  fn request(&self, method: Method, path: &[&str]) -> Result<RequestBuilder, ApiError> {
    let url = self.endpoint(path)?;
    tracing::debug!(%method, %url, "api request");

    let mut request = self.http.request(method, url);
    if let Some(session) = &self.session {
      request = request.header(COOKIE, session);
    }
    Ok(request)
  }

  /// Append path segments to the base url, escaping each one.
  fn endpoint(&self, path: &[&str]) -> Result<Url, ApiError> {
    let mut url = self.base_url.clone();
    url
      .path_segments_mut()
      .map_err(|_| ApiError::Invalid(format!("'{}' cannot be a base url", self.base_url)))?
      .pop_if_empty()
      .extend(path);
    Ok(url)
  }
}

/// Run `request` unless `signal` fires first.
async fn cancellable<R, F>(signal: &CancelSignal, request: F) -> Result<R, FetchError<ApiError>>
where
  F: Future<Output = Result<R, ApiError>>,
{
  if signal.is_cancelled() {
    return Err(FetchError::Cancelled);
  }
  tokio::select! {
    biased;
    _ = signal.cancelled() => Err(FetchError::Cancelled),
    result = request => result.map_err(FetchError::Failed),
  }
}

async fn send_json<R: DeserializeOwned>(request: RequestBuilder) -> Result<R, ApiError> {
  let response = request.send().await?;
  let status = response.status();

  if status.is_success() {
    return response
      .json::<R>()
      .await
      .map_err(|e| ApiError::InvalidResponse(e.to_string()));
  }

  let body = response.text().await.unwrap_or_default();
  let message = serde_json::from_str::<ErrorBody>(&body)
    .map(|body| body.error)
    .unwrap_or_else(|_| {
      status
        .canonical_reason()
        .unwrap_or("unknown error")
        .to_string()
    });

  tracing::debug!(status = status.as_u16(), %message, "api error");

  if status == StatusCode::UNAUTHORIZED {
    Err(ApiError::Unauthorized)
  } else {
    Err(ApiError::Server {
      status: status.as_u16(),
      message,
    })
  }
}
