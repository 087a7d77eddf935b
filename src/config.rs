//! Configuration for running a recorder from a file

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use hyper::header::{HeaderName, HeaderValue};
use hyper::StatusCode;
use serde::{Deserialize, Serialize};

use crate::expectation::{ExpectOptions, ResponseSource};
use crate::log::RecorderLog;
use crate::matcher::RequestPattern;
use crate::network::DEFAULT_MAX_REQUEST_SIZE;
use crate::recorder::Recorder;
use crate::response::{CannedResponse, FullResponse};
use crate::{RecorderError, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Recorder name used in log lines
    pub name: String,
    /// Listener address
    #[serde(default)]
    pub listen: ListenConfig,
    /// Resource limits and timeouts
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Expectations registered at startup
    #[serde(default)]
    pub expectations: Vec<ExpectationConfig>,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    /// IP address to bind
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind; 0 picks a free one
    #[serde(default)]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
        }
    }
}

/// Resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes
    pub max_request_size: usize,
    /// Default `wait()` timeout in milliseconds
    pub wait_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
            wait_timeout_ms: 3000,
        }
    }
}

/// One `[[expectations]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectationConfig {
    /// Display name; defaults to the matcher description
    #[serde(default)]
    pub name: Option<String>,
    /// Request criteria
    #[serde(flatten)]
    pub pattern: RequestPattern,
    /// Cycle through `responses` forever instead of serving each once
    #[serde(default)]
    pub repeat: bool,
    /// Responses in serving order
    #[serde(default)]
    pub responses: Vec<ResponseConfig>,
}

/// One canned response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseConfig {
    /// Response body
    #[serde(default)]
    pub body: String,
    /// Status code; plain 200 when absent
    #[serde(default)]
    pub status: Option<u16>,
    /// `Content-Type` header
    #[serde(default)]
    pub content_type: Option<String>,
    /// Extra headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl ResponseConfig {
    /// Convert into a canned response
    ///
    /// Without status and headers the body is served as plain text.
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponseSource` for a bad status code or header
    pub fn to_canned(&self) -> Result<CannedResponse> {
        if self.status.is_none() && self.content_type.is_none() && self.headers.is_empty() {
            return Ok(CannedResponse::Text(self.body.clone()));
        }

        let code = self.status.unwrap_or(200);
        let status = StatusCode::from_u16(code).map_err(|e| {
            RecorderError::InvalidResponseSource(format!("status {code}: {e}"))
        })?;

        let mut response = FullResponse::new(status).with_body(self.body.clone());

        if let Some(content_type) = &self.content_type {
            response = response.with_content_type(header_value(content_type)?);
        }

        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                RecorderError::InvalidResponseSource(format!("header name '{name}': {e}"))
            })?;
            response = response.with_header(name, header_value(value)?);
        }

        Ok(CannedResponse::Full(response))
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| {
        RecorderError::InvalidResponseSource(format!("header value '{value}': {e}"))
    })
}

impl ExpectationConfig {
    /// Response source described by this entry
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponseSource` if there are no responses or one of
    /// them is invalid
    pub fn response_source(&self) -> Result<ResponseSource> {
        if self.responses.is_empty() {
            return Err(RecorderError::InvalidResponseSource(
                "an expectation needs at least one response".to_string(),
            ));
        }

        let responses = self
            .responses
            .iter()
            .map(ResponseConfig::to_canned)
            .collect::<Result<Vec<_>>>()?;

        if self.repeat {
            Ok(ResponseSource::unbounded(responses.into_iter().cycle()))
        } else {
            Ok(ResponseSource::Finite(responses))
        }
    }
}

impl RecorderConfig {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RecorderError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| RecorderError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(RecorderError::ConfigError(
                "name cannot be empty".to_string(),
            ));
        }

        self.socket_addr()?;

        if self.limits.max_request_size == 0 {
            return Err(RecorderError::ConfigError(
                "max_request_size must be > 0".to_string(),
            ));
        }

        if self.limits.wait_timeout_ms == 0 {
            return Err(RecorderError::ConfigError(
                "wait_timeout_ms must be > 0".to_string(),
            ));
        }

        for (i, expectation) in self.expectations.iter().enumerate() {
            if expectation.pattern.is_empty() {
                return Err(RecorderError::ConfigError(format!(
                    "Expectation {i}: at least one of method, path, body_contains, header, xml_rpc or json_rpc is required"
                )));
            }

            if expectation.pattern.xml_rpc.is_some() && expectation.pattern.path.is_some() {
                return Err(RecorderError::ConfigError(format!(
                    "Expectation {i}: xml_rpc implies the /RPC2 path, remove path"
                )));
            }

            if expectation.responses.is_empty() {
                return Err(RecorderError::ConfigError(format!(
                    "Expectation {i}: responses cannot be empty"
                )));
            }
        }

        Ok(())
    }

    /// Address to bind
    ///
    /// # Errors
    ///
    /// Returns error if `host` is not an IP address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.listen.host.parse().map_err(|e| {
            RecorderError::ConfigError(format!("Invalid host '{}': {e}", self.listen.host))
        })?;
        Ok(SocketAddr::new(ip, self.listen.port))
    }

    /// Default `wait()` timeout
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.limits.wait_timeout_ms)
    }

    /// Build a recorder with every configured expectation registered
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponseSource` if an expectation's responses are invalid
    pub fn build_recorder(&self, log: Arc<dyn RecorderLog>) -> Result<Recorder> {
        let recorder = Recorder::with_log(self.name.clone(), log).with_default_timeout(self.wait_timeout());

        for expectation in &self.expectations {
            let options = ExpectOptions {
                name: expectation.name.clone(),
                timeout: None,
            };
            recorder.expect_with(
                expectation.pattern.clone(),
                expectation.response_source()?,
                options,
            )?;
        }

        Ok(recorder)
    }
}
