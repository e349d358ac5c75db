//! Client for the remote import API.

use crate::config::ApiSettings;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("API_URI is not configured")]
    MissingUri,
    #[error("could not build API client: {0}")]
    Client(String),
    #[error("request to {endpoint} failed: {message}")]
    Request { endpoint: String, message: String },
    #[error("{endpoint} answered {status}")]
    Rejected { endpoint: String, status: u16 },
}

/// Status and parsed body of an API answer. A body that is not JSON
/// becomes `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }

    /// The `id` the API assigned, whether it came as a number or a string.
    pub fn remote_id(&self) -> Option<String> {
        match self.body.get("id")? {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }
}

/// Anything that can POST JSON to the import API.
pub trait Transport {
    fn post_json(&self, endpoint: &str, body: &Value) -> Result<ApiResponse, ApiError>;
}

/// Blocking HTTP transport with bearer authentication.
pub struct ApiClient {
    client: Client,
    base: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, ApiError> {
        let base = settings.uri.clone().ok_or(ApiError::MissingUri)?;
        if settings.accept_invalid_certs {
            tracing::warn!("TLS certificate checks are disabled for the import API");
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()
            .map_err(|e| ApiError::Client(e.to_string()))?;
        Ok(Self {
            client,
            base,
            token: settings.token.clone(),
        })
    }

    fn url_for(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

impl Transport for ApiClient {
    fn post_json(&self, endpoint: &str, body: &Value) -> Result<ApiResponse, ApiError> {
        let url = self.url_for(endpoint);
        let mut request = self
            .client
            .post(&url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().map_err(|e| ApiError::Request {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;
        let status = response.status().as_u16();
        let text = response.text().map_err(|e| ApiError::Request {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Ok(ApiResponse { status, body })
    }
}
