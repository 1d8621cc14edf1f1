//! Provider descriptors: everything the streaming worker needs for one call.
//!
//! A descriptor is built fresh for every attempt and dropped afterwards.
//! When required configuration is missing the descriptor is still built, but
//! carries an invalid reason instead of a usable request; the orchestrator
//! checks [`ProviderDescriptor::is_valid`] before any network attempt.

use std::time::Duration;

use reqwest::Url;

/// Framing and payload dialect of a backend's streaming response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireFormat {
    /// SSE with typed JSON events (`message_start`, `content_block_delta`, ...)
    SseChatEvents,
    /// SSE with `choices[0].delta.content` payloads
    SseChoices,
    /// Newline-delimited JSON with `message.content` and `done`
    NdjsonMessage,
    /// Newline-delimited JSON discriminated by `type`
    NdjsonTyped,
}

/// Network location of a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl Endpoint {
    /// Split a base URL into an endpoint and its path prefix (without a
    /// trailing slash).
    pub fn parse(url: &str) -> Result<(Endpoint, String), String> {
        let parsed = Url::parse(url).map_err(|e| format!("invalid URL '{url}': {e}"))?;
        let tls = match parsed.scheme() {
            "https" => true,
            "http" => false,
            other => return Err(format!("unsupported scheme '{other}' in '{url}'")),
        };
        let host = parsed
            .host_str()
            .ok_or_else(|| format!("URL '{url}' has no host"))?
            .to_string();
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| format!("URL '{url}' has no port"))?;
        let base_path = parsed.path().trim_end_matches('/').to_string();

        Ok((Endpoint { host, port, tls }, base_path))
    }

    /// Absolute URL for `path` on this endpoint.
    pub fn url(&self, path: &str) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{scheme}://{}:{}{path}", self.host, self.port)
    }
}

/// A fully prepared request, or the reason it could not be prepared.
#[derive(Clone)]
pub struct ProviderDescriptor {
    pub id: String,
    pub model: String,
    pub endpoint: Endpoint,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub payload: String,
    pub wire_format: WireFormat,
    pub timeout: Duration,
    invalid_reason: Option<String>,
}

impl ProviderDescriptor {
    /// A descriptor ready to be sent.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        model: impl Into<String>,
        endpoint: Endpoint,
        path: impl Into<String>,
        headers: Vec<(String, String)>,
        payload: String,
        wire_format: WireFormat,
        timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            endpoint,
            path: path.into(),
            headers,
            payload,
            wire_format,
            timeout,
            invalid_reason: None,
        }
    }

    /// A descriptor that must not reach the network.
    pub fn invalid(id: impl Into<String>, wire_format: WireFormat, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: String::new(),
            endpoint: Endpoint::default(),
            path: String::new(),
            headers: Vec::new(),
            payload: String::new(),
            wire_format,
            timeout: Duration::ZERO,
            invalid_reason: Some(reason.into()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.invalid_reason.is_none()
    }

    pub fn invalid_reason(&self) -> Option<&str> {
        self.invalid_reason.as_deref()
    }

    pub fn url(&self) -> String {
        self.endpoint.url(&self.path)
    }
}

const SECRET_HEADERS: &[&str] = &["authorization", "x-api-key"];

impl std::fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(name, value)| {
                if SECRET_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                    (name.as_str(), "[REDACTED]")
                } else {
                    (name.as_str(), value.as_str())
                }
            })
            .collect();
        f.debug_struct("ProviderDescriptor")
            .field("id", &self.id)
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("path", &self.path)
            .field("headers", &headers)
            .field("payload_bytes", &self.payload.len())
            .field("wire_format", &self.wire_format)
            .field("timeout", &self.timeout)
            .field("invalid_reason", &self.invalid_reason)
            .finish()
    }
}

/// Resolved base URL of a backend: the configured one, else the kind's default.
#[derive(Debug, Clone)]
pub(crate) struct Target {
    pub endpoint: Endpoint,
    pub base_path: String,
}

impl Target {
    pub fn resolve(api_url: Option<&str>, default_url: &str) -> Result<Target, String> {
        let url = api_url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(default_url);
        let (endpoint, base_path) = Endpoint::parse(url)?;
        Ok(Target {
            endpoint,
            base_path,
        })
    }

    pub fn path(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.base_path)
    }
}

/// Request model: the caller's override, else the configured default.
pub(crate) fn pick_model(requested: Option<&str>, configured: Option<&str>) -> Option<String> {
    requested
        .or(configured)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}
