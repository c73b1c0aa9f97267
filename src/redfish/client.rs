//! Redfish HTTP client.
//!
//! A thin reqwest wrapper that speaks to one management controller. It
//! authenticates, resolves relative resource paths against the controller's
//! base URL and turns responses into [`RedfishResponse`]s or
//! [`TransportError`]s. It never retries.

use async_trait::async_trait;
use reqwest::{header, Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

use super::operation::{AsyncOperation, Submission};
use crate::error::{Error, Result, TransportError};
use crate::jobs::JobStatusFetcher;

/// Default HTTPS port.
pub const DEFAULT_PORT: u16 = 443;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Session token header used by iDRAC and OME.
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Connection settings for one controller.
#[derive(Clone, Serialize, Deserialize)]
pub struct RedfishConfig {
    /// Hostname, IP address or full base URL
    pub host: String,
    /// HTTPS port, ignored when `host` carries a scheme
    #[serde(default = "default_port")]
    pub port: u16,
    /// Basic auth user
    #[serde(default)]
    pub username: Option<String>,
    /// Basic auth password
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Session token, preferred over basic auth when set
    #[serde(default, skip_serializing)]
    pub auth_token: Option<String>,
    /// Verify the controller's TLS certificate
    #[serde(default = "default_validate_certs")]
    pub validate_certs: bool,
    /// Per-request timeout
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_validate_certs() -> bool {
    true
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

impl fmt::Debug for RedfishConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedfishConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("auth_token", &self.auth_token.as_ref().map(|_| "********"))
            .field("validate_certs", &self.validate_certs)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RedfishConfig {
    /// Create a config for `host` with default settings and no credentials.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            auth_token: None,
            validate_certs: true,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Use basic authentication.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Use an `X-Auth-Token` session token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Enable or disable certificate validation.
    pub fn with_validate_certs(mut self, validate: bool) -> Self {
        self.validate_certs = validate;
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The controller's base URL.
    ///
    /// A bare host becomes `https://host:port`; IPv6 literals are bracketed.
    pub fn base_url(&self) -> Result<Url> {
        let host = self.host.trim().trim_end_matches('/');
        if host.is_empty() {
            return Err(Error::invalid_config("host", "host must not be empty"));
        }

        let raw = if host.contains("://") {
            host.to_string()
        } else if host.contains(':') && !host.starts_with('[') {
            format!("https://[{}]:{}", host, self.port)
        } else {
            format!("https://{}:{}", host, self.port)
        };

        Url::parse(&raw).map_err(|e| Error::invalid_config("host", format!("'{}': {}", raw, e)))
    }
}

/// A decoded controller response.
#[derive(Debug, Clone, PartialEq)]
pub struct RedfishResponse {
    /// Requested URL
    pub url: String,
    /// HTTP status code
    pub status: u16,
    /// Response headers, keys lowercased
    pub headers: HashMap<String, String>,
    /// JSON body, `Null` when empty
    pub body: Value,
}

impl RedfishResponse {
    /// The `Location` header, if present and non-empty.
    pub fn location(&self) -> Option<&str> {
        self.header("location").filter(|value| !value.trim().is_empty())
    }

    /// A header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Returns true for 202 Accepted.
    pub fn is_accepted(&self) -> bool {
        self.status == StatusCode::ACCEPTED.as_u16()
    }
}

/// Redfish client for one controller.
#[derive(Debug, Clone)]
pub struct RedfishClient {
    http: Client,
    base: Url,
    config: RedfishConfig,
}

impl RedfishClient {
    /// Build a client from connection settings.
    pub fn new(config: RedfishConfig) -> Result<Self> {
        let base = config.base_url()?;

        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        headers.insert("OData-Version", header::HeaderValue::from_static("4.0"));

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout / 2)
            .danger_accept_invalid_certs(!config.validate_certs)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        debug!(base_url = %base, validate_certs = config.validate_certs, "Created Redfish client");

        Ok(Self { http, base, config })
    }

    /// The controller's base URL.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// The connection settings in use.
    pub fn config(&self) -> &RedfishConfig {
        &self.config
    }

    /// Resolve a resource path or absolute URL against the base URL.
    pub fn resolve(&self, path: &str) -> std::result::Result<Url, TransportError> {
        let path = path.trim();
        let resolved = if path.contains("://") {
            Url::parse(path)
        } else if path.starts_with('/') {
            self.base.join(path)
        } else {
            self.base.join(&format!("/{}", path))
        };

        resolved.map_err(|e| TransportError::Malformed {
            url: path.to_string(),
            message: format!("invalid resource path: {}", e),
        })
    }

    /// GET a resource.
    pub async fn get(&self, path: &str) -> std::result::Result<RedfishResponse, TransportError> {
        self.request(Method::GET, path, None).await
    }

    /// POST a JSON body.
    pub async fn post(
        &self,
        path: &str,
        body: &Value,
    ) -> std::result::Result<RedfishResponse, TransportError> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// PATCH a JSON body.
    pub async fn patch(
        &self,
        path: &str,
        body: &Value,
    ) -> std::result::Result<RedfishResponse, TransportError> {
        self.request(Method::PATCH, path, Some(body)).await
    }

    /// Issue one request. Non-2xx statuses become [`TransportError::Status`].
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> std::result::Result<RedfishResponse, TransportError> {
        let url = self.resolve(path)?;
        let url_text = url.to_string();

        let mut request = self.http.request(method.clone(), url);
        request = match (&self.config.auth_token, &self.config.username) {
            (Some(token), _) => request.header(AUTH_TOKEN_HEADER, token),
            (None, Some(user)) => request.basic_auth(user, self.config.password.as_ref()),
            (None, None) => request,
        };
        if let Some(body) = body {
            request = request.json(body);
        }

        trace!(%method, url = %url_text, "Sending Redfish request");

        let response = request
            .send()
            .await
            .map_err(|e| send_error(&url_text, &e))?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect::<HashMap<_, _>>();

        let text = response.text().await.map_err(|e| TransportError::Malformed {
            url: url_text.clone(),
            message: format!("failed to read response body: {}", e),
        })?;

        debug!(%method, url = %url_text, status = status.as_u16(), "Redfish response");

        if !status.is_success() {
            return Err(TransportError::Status {
                url: url_text,
                status: status.as_u16(),
                message: error_message(&text, status),
            });
        }

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| TransportError::Malformed {
                url: url_text.clone(),
                message: format!("invalid JSON: {}", e),
            })?
        };

        Ok(RedfishResponse {
            url: url_text,
            status: status.as_u16(),
            headers,
            body,
        })
    }

    /// Send the request that starts an asynchronous operation.
    pub async fn submit(&self, operation: &AsyncOperation) -> Result<Submission> {
        let response = self
            .request(operation.method.as_http(), &operation.path, operation.body.as_ref())
            .await?;
        Submission::from_response(response)
    }
}

#[async_trait]
impl JobStatusFetcher for RedfishClient {
    async fn fetch(&self, tracking_uri: &str) -> std::result::Result<Value, TransportError> {
        Ok(self.get(tracking_uri).await?.body)
    }
}

/// Classify a failed send.
///
/// Only connect and timeout failures mean the controller is unreachable. A
/// rejected handshake or certificate is a failure of the request.
fn send_error(url: &str, err: &reqwest::Error) -> TransportError {
    let url = url.to_string();
    if is_tls_failure(err) {
        TransportError::Tls {
            url,
            message: err.to_string(),
        }
    } else if err.is_timeout() {
        TransportError::Unreachable {
            url,
            message: format!("request timed out: {}", err),
        }
    } else if err.is_connect() {
        TransportError::Unreachable {
            url,
            message: format!("connection failed: {}", err),
        }
    } else {
        TransportError::Request {
            url,
            message: err.to_string(),
        }
    }
}

/// Whether a send error came from the TLS layer.
///
/// rustls surfaces through tokio-rustls as `InvalidData` (bad record or
/// certificate) or `UnexpectedEof` (peer closed mid-handshake). A plain TCP
/// connect never produces either.
fn is_tls_failure(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<io::Error>() {
            if err.is_connect()
                && matches!(io.kind(), io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof)
            {
                return true;
            }
        }
        let text = cause.to_string().to_ascii_lowercase();
        if text.contains("certificate") || text.contains("handshake") {
            return true;
        }
        source = std::error::Error::source(cause);
    }
    false
}

/// Best human-readable message from a Redfish error body.
///
/// Prefers `error.@Message.ExtendedInfo[0].Message`, then `error.message`,
/// then the raw body, then the reason phrase.
fn error_message(text: &str, status: StatusCode) -> String {
    let from_json = serde_json::from_str::<Value>(text).ok().and_then(|body| {
        let error = body.get("error")?;
        error
            .get("@Message.ExtendedInfo")
            .and_then(Value::as_array)
            .and_then(|infos| infos.first())
            .and_then(|info| info.get("Message"))
            .and_then(Value::as_str)
            .or_else(|| error.get("message").and_then(Value::as_str))
            .map(str::to_string)
    });

    from_json
        .or_else(|| {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.chars().take(512).collect())
        })
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown status").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_from_host() {
        let config = RedfishConfig::new("192.168.0.1");
        assert_eq!(config.base_url().unwrap().as_str(), "https://192.168.0.1/");

        let config = RedfishConfig::new("idrac.example.com").with_port(8443);
        assert_eq!(
            config.base_url().unwrap().as_str(),
            "https://idrac.example.com:8443/"
        );
    }

    #[test]
    fn test_base_url_ipv6_and_scheme() {
        let config = RedfishConfig::new("fe80::1").with_port(443);
        assert_eq!(config.base_url().unwrap().as_str(), "https://[fe80::1]/");

        let config = RedfishConfig::new("http://127.0.0.1:8080/");
        assert_eq!(config.base_url().unwrap().as_str(), "http://127.0.0.1:8080/");

        assert!(RedfishConfig::new("  ").base_url().is_err());
    }

    #[test]
    fn test_resolve_paths() {
        let client = RedfishClient::new(RedfishConfig::new("http://127.0.0.1:8080")).unwrap();
        assert_eq!(
            client.resolve("/redfish/v1/TaskService/Tasks/JID_1").unwrap().as_str(),
            "http://127.0.0.1:8080/redfish/v1/TaskService/Tasks/JID_1"
        );
        assert_eq!(
            client.resolve("redfish/v1/Jobs").unwrap().as_str(),
            "http://127.0.0.1:8080/redfish/v1/Jobs"
        );
        assert_eq!(
            client.resolve("https://10.0.0.5/redfish/v1/Jobs/JID_2").unwrap().as_str(),
            "https://10.0.0.5/redfish/v1/Jobs/JID_2"
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = RedfishConfig::new("idrac")
            .with_credentials("root", "calvin")
            .with_token("abc123");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("calvin"));
        assert!(!rendered.contains("abc123"));
        assert!(rendered.contains("root"));
    }

    #[test]
    fn test_error_message_prefers_extended_info() {
        let body = r#"{"error": {"code": "Base.1.8.GeneralError", "message": "A general error has occurred.",
            "@Message.ExtendedInfo": [{"MessageId": "IDRAC.2.8.SYS403", "Message": "Unable to find the job."}]}}"#;
        assert_eq!(
            error_message(body, StatusCode::NOT_FOUND),
            "Unable to find the job."
        );

        let body = r#"{"error": {"message": "A general error has occurred."}}"#;
        assert_eq!(
            error_message(body, StatusCode::BAD_REQUEST),
            "A general error has occurred."
        );

        assert_eq!(error_message("", StatusCode::UNAUTHORIZED), "Unauthorized");
        assert_eq!(error_message("gateway down", StatusCode::BAD_GATEWAY), "gateway down");
    }

    #[test]
    fn test_response_location() {
        let mut headers = HashMap::new();
        headers.insert(
            "location".to_string(),
            "/redfish/v1/Managers/iDRAC.Embedded.1/Jobs/JID_9".to_string(),
        );
        let response = RedfishResponse {
            url: "https://idrac/redfish/v1/Actions".to_string(),
            status: 202,
            headers,
            body: Value::Null,
        };
        assert!(response.is_accepted());
        assert_eq!(
            response.location(),
            Some("/redfish/v1/Managers/iDRAC.Embedded.1/Jobs/JID_9")
        );
        assert_eq!(response.header("Location"), response.location());
    }
}
