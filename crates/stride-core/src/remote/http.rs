//! HTTP implementation of [`RemoteApi`] over a versioned REST surface.
//!
//! Routes: `GET/POST {base}/v1/{table}`, `GET/PUT/DELETE {base}/v1/{table}/{id}`.
//! The base version of a write travels in the `If-Match` header.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{Mutation, QueryFilter, RemoteAck, RemoteApi, RemoteError, RemoteRecord, RemoteResult};
use crate::models::{SyncOperation, Table};
use crate::util::{compact_text, is_http_url, normalize_text_option};
use crate::{Error, Result};

const DEFAULT_TIMEOUT_SECS: u64 = 15;

pub const API_URL_ENV: &str = "STRIDE_API_URL";
pub const API_TOKEN_ENV: &str = "STRIDE_API_TOKEN";
pub const API_TIMEOUT_ENV: &str = "STRIDE_API_TIMEOUT_SECS";

/// Connection settings for [`HttpRemoteApi`]
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RemoteConfig {
    /// Validate and normalize a base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = normalize_text_option(Some(base_url.into()))
            .ok_or_else(|| Error::InvalidInput("API URL must not be empty".to_string()))?;
        if !is_http_url(&base_url) {
            return Err(Error::InvalidInput(
                "API URL must include http:// or https://".to_string(),
            ));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = normalize_text_option(token);
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read settings from `STRIDE_API_URL`, `STRIDE_API_TOKEN` and
    /// `STRIDE_API_TIMEOUT_SECS`. Returns `Ok(None)` when no URL is set.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let Some(base_url) = normalize_text_option(lookup(API_URL_ENV)) else {
            return Ok(None);
        };
        let mut config = Self::new(base_url)?.with_token(lookup(API_TOKEN_ENV));
        if let Some(raw) = normalize_text_option(lookup(API_TIMEOUT_ENV)) {
            let secs = raw.parse::<u64>().map_err(|_| {
                Error::InvalidInput(format!("{API_TIMEOUT_ENV} must be a whole number of seconds"))
            })?;
            config.timeout = Duration::from_secs(secs.max(1));
        }
        Ok(Some(config))
    }
}

/// REST client for the authoritative backend
#[derive(Debug, Clone)]
pub struct HttpRemoteApi {
    config: RemoteConfig,
    client: reqwest::Client,
}

impl HttpRemoteApi {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| Error::InvalidInput(format!("failed to build HTTP client: {error}")))?;
        Ok(Self { config, client })
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/v1/{}", self.config.base_url, table)
    }

    fn record_url(&self, table: Table, id: &str) -> String {
        format!("{}/v1/{}/{}", self.config.base_url, table, id)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/json");
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Read back a record whose write was acknowledged without a body.
    async fn fetch_ack(&self, table: Table, id: &str) -> RemoteResult<RemoteAck> {
        let records = self.query(table, &QueryFilter::ById(id.to_string())).await?;
        records
            .into_iter()
            .next()
            .map(|record| RemoteAck {
                id: record.id,
                version: record.version,
            })
            .ok_or_else(|| {
                RemoteError::Validation(format!(
                    "write to {table}/{id} was acknowledged but the record is missing"
                ))
            })
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        table: Table,
        id: &str,
    ) -> RemoteResult<(StatusCode, String)> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if status.is_success() {
            Ok((status, body))
        } else {
            Err(classify_status(status, table, id, &body))
        }
    }
}

impl RemoteApi for HttpRemoteApi {
    async fn query(&self, table: Table, filter: &QueryFilter) -> RemoteResult<Vec<RemoteRecord>> {
        match filter {
            QueryFilter::All => {
                let url = self.table_url(table);
                let (_, body) = self.send(self.request(Method::GET, &url), table, "").await?;
                parse_body(&body)
            }
            QueryFilter::ById(id) => {
                let url = self.record_url(table, id);
                match self.send(self.request(Method::GET, &url), table, id).await {
                    Ok((_, body)) => Ok(vec![parse_body::<RemoteRecord>(&body)?]),
                    Err(RemoteError::NotFound { .. }) => Ok(Vec::new()),
                    Err(error) => Err(error),
                }
            }
        }
    }

    async fn mutate(&self, mutation: &Mutation) -> RemoteResult<RemoteAck> {
        let table = mutation.table;
        let id = mutation.entity_id.as_str();
        let builder = match mutation.operation {
            SyncOperation::Create => self
                .request(Method::POST, &self.table_url(table))
                .json(&json!({ "id": id, "data": mutation.payload })),
            SyncOperation::Update => self
                .request(Method::PUT, &self.record_url(table, id))
                .json(&json!({ "data": mutation.payload })),
            SyncOperation::Delete => self.request(Method::DELETE, &self.record_url(table, id)),
        };
        let builder = match mutation.base_version {
            Some(version) => builder.header("If-Match", version.to_string()),
            None => builder,
        };

        let (_, body) = self.send(builder, table, id).await?;
        match parse_ack(&body)? {
            Some(ack) => Ok(ack),
            None if mutation.operation == SyncOperation::Delete => Ok(RemoteAck {
                id: id.to_string(),
                version: mutation.base_version.unwrap_or_default(),
            }),
            None => self.fetch_ack(table, id).await,
        }
    }

    async fn fetch_blob(&self, url: &str) -> RemoteResult<Vec<u8>> {
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(if is_transient_status(status) {
                RemoteError::Transient(format!("image fetch failed with HTTP {}", status.as_u16()))
            } else {
                RemoteError::Validation(format!("image fetch failed with HTTP {}", status.as_u16()))
            });
        }
        let bytes = response.bytes().await.map_err(transport_error)?;
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
    current: Option<RemoteRecord>,
}

fn transport_error(error: reqwest::Error) -> RemoteError {
    RemoteError::Transient(error.to_string())
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &str) -> RemoteResult<T> {
    serde_json::from_str(body).map_err(|error| {
        RemoteError::Transient(format!("invalid response payload: {error}"))
    })
}

/// Decode a mutation acknowledgement; `None` for an empty body.
///
/// The write was applied, so a malformed body must not be retried.
fn parse_ack(body: &str) -> RemoteResult<Option<RemoteAck>> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(body)
        .map(Some)
        .map_err(|error| RemoteError::Validation(format!("invalid acknowledgement: {error}")))
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT
                | StatusCode::TOO_MANY_REQUESTS
                | StatusCode::UNAUTHORIZED
                | StatusCode::FORBIDDEN
        )
}

fn api_message(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", compact_text(&message), status.as_u16());
        }
    }
    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn classify_status(status: StatusCode, table: Table, id: &str, body: &str) -> RemoteError {
    match status {
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => RemoteError::VersionConflict {
            table,
            id: id.to_string(),
            current: serde_json::from_str::<ApiErrorBody>(body)
                .ok()
                .and_then(|payload| payload.current),
        },
        StatusCode::NOT_FOUND => RemoteError::NotFound {
            table,
            id: id.to_string(),
        },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            RemoteError::Validation(api_message(status, body))
        }
        _ if is_transient_status(status) => RemoteError::Transient(api_message(status, body)),
        _ => RemoteError::Validation(api_message(status, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn config_normalizes_base_url() {
        let config = RemoteConfig::new(" https://api.example.com/ ").unwrap();
        assert_eq!(config.base_url, "https://api.example.com");
        assert!(RemoteConfig::new("").is_err());
        assert!(RemoteConfig::new("api.example.com").is_err());
    }

    #[test]
    fn config_debug_redacts_token() {
        let config = RemoteConfig::new("https://api.example.com")
            .unwrap()
            .with_token(Some("secret".to_string()));
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn config_from_lookup_reads_all_keys() {
        let config = RemoteConfig::from_lookup(|key| match key {
            API_URL_ENV => Some("http://localhost:8080".to_string()),
            API_TOKEN_ENV => Some("tok".to_string()),
            API_TIMEOUT_ENV => Some("3".to_string()),
            _ => None,
        })
        .unwrap()
        .unwrap();
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.token.as_deref(), Some("tok"));
        assert_eq!(config.timeout, Duration::from_secs(3));
    }

    #[test]
    fn config_from_lookup_without_url_is_none() {
        assert!(RemoteConfig::from_lookup(|_| None).unwrap().is_none());
        let invalid = RemoteConfig::from_lookup(|key| match key {
            API_URL_ENV => Some("http://localhost".to_string()),
            API_TIMEOUT_ENV => Some("soon".to_string()),
            _ => None,
        });
        assert!(invalid.is_err());
    }

    #[test]
    fn routes_are_versioned_per_table() {
        let api = HttpRemoteApi::new(RemoteConfig::new("https://api.example.com").unwrap()).unwrap();
        assert_eq!(api.table_url(Table::Shoes), "https://api.example.com/v1/shoes");
        assert_eq!(
            api.record_url(Table::Runs, "r1"),
            "https://api.example.com/v1/runs/r1"
        );
    }

    #[test]
    fn acknowledgement_bodies() {
        assert_eq!(
            parse_ack(r#"{"id":"s1","version":4}"#).unwrap(),
            Some(RemoteAck {
                id: "s1".to_string(),
                version: 4
            })
        );
        assert_eq!(parse_ack("  \n").unwrap(), None);
        assert!(matches!(
            parse_ack("<html>ok</html>"),
            Err(RemoteError::Validation(_))
        ));
    }

    #[test]
    fn status_classification() {
        let conflict = classify_status(
            StatusCode::CONFLICT,
            Table::Shoes,
            "s1",
            r#"{"current":{"id":"s1","version":4,"data":{"brand":"Hoka"}}}"#,
        );
        match conflict {
            RemoteError::VersionConflict { current, .. } => {
                assert_eq!(current.map(|record| record.version), Some(4));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, Table::Runs, "r1", ""),
            RemoteError::NotFound { .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, Table::Runs, "r1", "{}"),
            RemoteError::Validation(_)
        ));
        assert!(classify_status(StatusCode::BAD_GATEWAY, Table::Runs, "r1", "").is_retryable());
        assert!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, Table::Runs, "r1", "").is_retryable()
        );
    }

    #[test]
    fn api_message_prefers_json_message() {
        assert_eq!(
            api_message(StatusCode::BAD_REQUEST, r#"{"message":"brand required"}"#),
            "brand required (400)"
        );
        assert_eq!(api_message(StatusCode::BAD_REQUEST, ""), "HTTP 400");
    }
}
