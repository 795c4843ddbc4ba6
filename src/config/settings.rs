use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::provider::{
    BackendMode, GeminiConfig, ProviderConfig, ProviderKind, ProxyConfig, VertexConfig,
    DEFAULT_GEMINI_ENDPOINT, DEFAULT_GEMINI_MODEL, DEFAULT_VERTEX_LOCATION, DEFAULT_VERTEX_MODEL,
};
use crate::error::AnalysisResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub backend_mode: BackendMode,

    #[serde(default)]
    pub provider: ProviderKind,

    #[serde(default)]
    pub gemini: GeminiSettings,

    #[serde(default)]
    pub vertex: VertexSettings,

    #[serde(default)]
    pub proxy: ProxySettings,

    #[serde(default)]
    pub request: RequestSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub connectivity: ConnectivitySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiSettings {
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,

    #[serde(default = "default_gemini_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_gemini_model")]
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexSettings {
    pub project_id: Option<String>,

    #[serde(default = "default_vertex_location")]
    pub location: String,

    #[serde(default = "default_vertex_model")]
    pub model: String,

    pub access_token: Option<String>,
    pub access_token_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProxySettings {
    pub base_url: Option<String>,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSettings {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u64,

    /// SQLite file; defaults to the platform cache directory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivitySettings {
    /// URL probed before live calls. No probe when unset.
    pub probe_url: Option<String>,

    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_gemini_endpoint() -> String {
    DEFAULT_GEMINI_ENDPOINT.to_string()
}
fn default_gemini_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}
fn default_vertex_location() -> String {
    DEFAULT_VERTEX_LOCATION.to_string()
}
fn default_vertex_model() -> String {
    DEFAULT_VERTEX_MODEL.to_string()
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_ttl_days() -> u64 {
    7
}

/// Longest cache lifetime accepted, in days.
pub const MAX_CACHE_TTL_DAYS: u64 = 36_500;
fn default_probe_timeout_ms() -> u64 {
    3_000
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: Some("GEMINI_API_KEY".to_string()),
            endpoint: default_gemini_endpoint(),
            model: default_gemini_model(),
        }
    }
}

impl Default for VertexSettings {
    fn default() -> Self {
        Self {
            project_id: None,
            location: default_vertex_location(),
            model: default_vertex_model(),
            access_token: None,
            access_token_env: Some("VERTEX_ACCESS_TOKEN".to_string()),
        }
    }
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_days: default_ttl_days(),
            path: None,
        }
    }
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        Self {
            probe_url: None,
            timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_mode: BackendMode::Local,
            provider: ProviderKind::Gemini,
            gemini: GeminiSettings::default(),
            vertex: VertexSettings::default(),
            proxy: ProxySettings::default(),
            request: RequestSettings::default(),
            cache: CacheSettings::default(),
            connectivity: ConnectivitySettings::default(),
        }
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Settings {
    /// Config file, then `.env`, then process environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_path = Self::config_path()?;

        let mut settings = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            let settings = Settings::default();
            settings.save()?;
            settings
        };

        settings.apply_env(|name| std::env::var(name).ok())?;
        Ok(settings)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&config_path, content)?;
        Ok(())
    }

    fn project_dirs() -> Result<directories::ProjectDirs> {
        directories::ProjectDirs::from("app", "menulens", "menulens")
            .context("Could not determine config directory")
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    pub fn cache_path(&self) -> Result<PathBuf> {
        match &self.cache.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::project_dirs()?.cache_dir().join("analysis_cache.db")),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        let days = self.cache.ttl_days.clamp(1, MAX_CACHE_TTL_DAYS);
        Duration::from_secs(days * 24 * 60 * 60)
    }

    /// Override file values with the recognized environment variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(mode) = get("BACKEND_MODE") {
            self.backend_mode = mode.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(provider) = get("AI_PROVIDER") {
            self.provider = provider.parse().map_err(anyhow::Error::msg)?;
        }

        if let Some(key) = get("GEMINI_API_KEY") {
            self.gemini.api_key = Some(key);
        }
        if let Some(endpoint) = get("GEMINI_ENDPOINT") {
            self.gemini.endpoint = endpoint;
        }
        if let Some(model) = get("GEMINI_MODEL") {
            self.gemini.model = model;
        }

        if let Some(project) = get("VERTEX_PROJECT_ID") {
            self.vertex.project_id = Some(project);
        }
        if let Some(location) = get("VERTEX_LOCATION") {
            self.vertex.location = location;
        }
        if let Some(model) = get("VERTEX_MODEL") {
            self.vertex.model = model;
        }
        if let Some(token) = get("VERTEX_ACCESS_TOKEN") {
            self.vertex.access_token = Some(token);
        }

        if let Some(url) = get("PROXY_BASE_URL") {
            self.proxy.base_url = Some(url);
        }
        if let Some(token) = get("PROXY_ACCESS_TOKEN") {
            self.proxy.access_token = Some(token);
        }

        if let Some(timeout) = get("TIMEOUT") {
            self.request.timeout_ms = timeout
                .parse()
                .with_context(|| format!("TIMEOUT must be milliseconds, got {}", timeout))?;
        }
        if let Some(retries) = get("MAX_RETRIES") {
            self.request.max_retries = retries
                .parse()
                .with_context(|| format!("MAX_RETRIES must be a number, got {}", retries))?;
        }
        if let Some(days) = get("CACHE_TTL_DAYS") {
            let ttl_days: u64 = days
                .parse()
                .with_context(|| format!("CACHE_TTL_DAYS must be a number, got {}", days))?;
            if ttl_days > MAX_CACHE_TTL_DAYS {
                bail!(
                    "CACHE_TTL_DAYS must be at most {} days, got {}",
                    MAX_CACHE_TTL_DAYS,
                    ttl_days
                );
            }
            self.cache.ttl_days = ttl_days;
        }

        Ok(())
    }

    pub fn gemini_api_key(&self) -> Option<String> {
        if let Some(key) = non_empty(self.gemini.api_key.as_ref()) {
            return Some(key);
        }
        if let Some(env_var) = &self.gemini.api_key_env {
            return non_empty(std::env::var(env_var).ok().as_ref());
        }
        None
    }

    pub fn vertex_access_token(&self) -> Option<String> {
        if let Some(token) = non_empty(self.vertex.access_token.as_ref()) {
            return Some(token);
        }
        if let Some(env_var) = &self.vertex.access_token_env {
            return non_empty(std::env::var(env_var).ok().as_ref());
        }
        None
    }

    /// Unvalidated direct-vendor config for `kind`.
    pub fn direct_config(&self, kind: ProviderKind) -> ProviderConfig {
        match kind {
            ProviderKind::Gemini => ProviderConfig::Gemini(GeminiConfig {
                api_key: self.gemini_api_key().unwrap_or_default(),
                endpoint: self.gemini.endpoint.trim_end_matches('/').to_string(),
                model: self.gemini.model.clone(),
                timeout_ms: self.request.timeout_ms,
                max_retries: self.request.max_retries,
            }),
            ProviderKind::Vertex => ProviderConfig::Vertex(VertexConfig {
                project_id: non_empty(self.vertex.project_id.as_ref()).unwrap_or_default(),
                location: self.vertex.location.clone(),
                model: self.vertex.model.clone(),
                access_token: self.vertex_access_token(),
                timeout_ms: self.request.timeout_ms,
                max_retries: self.request.max_retries,
            }),
        }
    }

    /// Unvalidated proxy config with `kind` as the upstream vendor.
    pub fn proxy_config(&self, kind: ProviderKind) -> ProviderConfig {
        ProviderConfig::Proxy(ProxyConfig {
            base_url: non_empty(self.proxy.base_url.as_ref())
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_default(),
            access_token: non_empty(self.proxy.access_token.as_ref()).unwrap_or_default(),
            provider: kind,
            timeout_ms: self.request.timeout_ms,
            max_retries: self.request.max_retries,
        })
    }

    /// Config for `kind` under the current backend mode, validated.
    pub fn provider_config(&self, kind: ProviderKind) -> AnalysisResult<ProviderConfig> {
        let config = match self.backend_mode {
            BackendMode::Local => self.direct_config(kind),
            BackendMode::Proxy => self.proxy_config(kind),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn active_config(&self) -> AnalysisResult<ProviderConfig> {
        self.provider_config(self.provider)
    }

    /// Completeness check only; never touches the network.
    pub fn is_configured(&self, kind: ProviderKind) -> bool {
        self.provider_config(kind).is_ok()
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.connectivity.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    fn bare() -> Settings {
        let mut settings = Settings::default();
        settings.gemini.api_key_env = None;
        settings.vertex.access_token_env = None;
        settings
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = bare();
        settings
            .apply_env(env(&[
                ("BACKEND_MODE", "proxy"),
                ("AI_PROVIDER", "vertex"),
                ("PROXY_BASE_URL", "https://proxy.example.com/"),
                ("PROXY_ACCESS_TOKEN", "t0k"),
                ("TIMEOUT", "15000"),
                ("MAX_RETRIES", "5"),
            ]))
            .unwrap();

        assert_eq!(settings.backend_mode, BackendMode::Proxy);
        assert_eq!(settings.provider, ProviderKind::Vertex);

        match settings.active_config().unwrap() {
            ProviderConfig::Proxy(proxy) => {
                assert_eq!(proxy.base_url, "https://proxy.example.com");
                assert_eq!(proxy.provider, ProviderKind::Vertex);
                assert_eq!(proxy.timeout_ms, 15_000);
                assert_eq!(proxy.max_retries, 5);
            }
            other => panic!("expected proxy config, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_env_values_are_rejected() {
        let mut settings = bare();
        assert!(settings.apply_env(env(&[("BACKEND_MODE", "cloud")])).is_err());
        assert!(settings.apply_env(env(&[("MAX_RETRIES", "many")])).is_err());
    }

    #[test]
    fn test_missing_credentials_fail_validation() {
        let settings = bare();
        let err = settings.active_config().unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
        assert!(!settings.is_configured(ProviderKind::Gemini));
        assert!(!settings.is_configured(ProviderKind::Vertex));
    }

    #[test]
    fn test_direct_configs() {
        let mut settings = bare();
        settings
            .apply_env(env(&[("GEMINI_API_KEY", "abc"), ("VERTEX_PROJECT_ID", "menu-prod")]))
            .unwrap();

        assert!(settings.is_configured(ProviderKind::Gemini));
        assert!(settings.is_configured(ProviderKind::Vertex));
        assert_eq!(settings.cache_ttl(), Duration::from_secs(7 * 24 * 3600));
    }

    #[test]
    fn test_huge_cache_ttl() {
        let mut settings = bare();
        let result = settings.apply_env(env(&[("CACHE_TTL_DAYS", "300000000000000")]));
        assert!(result.is_err());
        assert_eq!(settings.cache.ttl_days, 7);

        // Values from the config file are clamped instead
        settings.cache.ttl_days = 300_000_000_000_000;
        assert_eq!(
            settings.cache_ttl(),
            Duration::from_secs(MAX_CACHE_TTL_DAYS * 24 * 3600)
        );
    }
}
