use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AnalysisError, AnalysisResult};
use crate::llm::RetryConfig;

pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_VERTEX_LOCATION: &str = "us-central1";
pub const DEFAULT_VERTEX_MODEL: &str = "gemini-1.5-flash-002";

/// Whether requests go straight to a vendor or through the proxy service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    #[default]
    Local,
    Proxy,
}

impl FromStr for BackendMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "local-direct" | "direct" => Ok(BackendMode::Local),
            "proxy" | "backend" => Ok(BackendMode::Proxy),
            other => Err(format!("Unknown backend mode: {}", other)),
        }
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendMode::Local => f.write_str("local"),
            BackendMode::Proxy => f.write_str("proxy"),
        }
    }
}

/// The AI vendor performing the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    Vertex,
}

impl ProviderKind {
    pub fn all() -> [ProviderKind; 2] {
        [ProviderKind::Gemini, ProviderKind::Vertex]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::Vertex => "vertex",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(ProviderKind::Gemini),
            "vertex" | "vertex-ai" | "vertexai" => Ok(ProviderKind::Vertex),
            other => Err(format!("Unknown AI provider: {}", other)),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexConfig {
    pub project_id: String,
    pub location: String,
    pub model: String,
    /// OAuth access token; requests go out unauthenticated without it.
    pub access_token: Option<String>,
    pub timeout_ms: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub base_url: String,
    pub access_token: String,
    /// Upstream vendor the proxy should use.
    pub provider: ProviderKind,
    pub timeout_ms: u64,
    pub max_retries: u32,
}

/// Fully resolved configuration for one adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum ProviderConfig {
    Gemini(GeminiConfig),
    Vertex(VertexConfig),
    Proxy(ProxyConfig),
}

fn require(value: &str, what: &str) -> AnalysisResult<()> {
    if value.trim().is_empty() {
        return Err(AnalysisError::Configuration(format!("{} is not set", what)));
    }
    Ok(())
}

fn require_url(value: &str, what: &str) -> AnalysisResult<()> {
    require(value, what)?;
    let parsed = url::Url::parse(value)
        .map_err(|e| AnalysisError::Configuration(format!("{} is not a valid URL: {}", what, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(AnalysisError::Configuration(format!(
            "{} must use http or https, got {}",
            what, scheme
        ))),
    }
}

fn require_timeout(timeout_ms: u64) -> AnalysisResult<()> {
    if timeout_ms == 0 {
        return Err(AnalysisError::Configuration(
            "TIMEOUT must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

impl ProviderConfig {
    /// Full completeness check. No network access.
    pub fn validate(&self) -> AnalysisResult<()> {
        match self {
            ProviderConfig::Gemini(c) => {
                require(&c.api_key, "GEMINI_API_KEY")?;
                require_url(&c.endpoint, "GEMINI_ENDPOINT")?;
                require(&c.model, "GEMINI_MODEL")?;
                require_timeout(c.timeout_ms)
            }
            ProviderConfig::Vertex(c) => {
                require(&c.project_id, "VERTEX_PROJECT_ID")?;
                require(&c.location, "VERTEX_LOCATION")?;
                require(&c.model, "VERTEX_MODEL")?;
                if c.location.contains(['/', ' ']) {
                    return Err(AnalysisError::Configuration(format!(
                        "VERTEX_LOCATION is not a region: {}",
                        c.location
                    )));
                }
                require_timeout(c.timeout_ms)
            }
            ProviderConfig::Proxy(c) => {
                require_url(&c.base_url, "PROXY_BASE_URL")?;
                require(&c.access_token, "PROXY_ACCESS_TOKEN")?;
                require_timeout(c.timeout_ms)
            }
        }
    }

    pub fn backend_mode(&self) -> BackendMode {
        match self {
            ProviderConfig::Proxy(_) => BackendMode::Proxy,
            _ => BackendMode::Local,
        }
    }

    /// The vendor that ends up doing the work.
    pub fn provider(&self) -> ProviderKind {
        match self {
            ProviderConfig::Gemini(_) => ProviderKind::Gemini,
            ProviderConfig::Vertex(_) => ProviderKind::Vertex,
            ProviderConfig::Proxy(c) => c.provider,
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        let (max_retries, timeout_ms) = match self {
            ProviderConfig::Gemini(c) => (c.max_retries, c.timeout_ms),
            ProviderConfig::Vertex(c) => (c.max_retries, c.timeout_ms),
            ProviderConfig::Proxy(c) => (c.max_retries, c.timeout_ms),
        };
        RetryConfig::new(max_retries, Duration::from_millis(timeout_ms))
    }
}
