use thiserror::Error;

/// Errors talking to the links API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
  #[error("Not signed in. Set LINKQ_SESSION to a valid session cookie.")]
  Unauthorized,

  #[error("Server returned {status}: {message}")]
  Server { status: u16, message: String },

  #[error("Network error: {0}")]
  Network(String),

  #[error("Invalid API response: {0}")]
  InvalidResponse(String),

  #[error("Invalid input: {0}")]
  Invalid(String),
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_timeout() {
      ApiError::Network("Request timed out".to_string())
    } else if err.is_connect() {
      ApiError::Network("Failed to connect to API".to_string())
    } else if err.is_decode() {
      ApiError::InvalidResponse(err.to_string())
    } else {
      ApiError::Network(err.to_string())
    }
  }
}
