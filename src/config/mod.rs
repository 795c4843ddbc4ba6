mod provider;
mod settings;

pub use provider::{
    BackendMode, GeminiConfig, ProviderConfig, ProviderKind, ProxyConfig, VertexConfig,
    DEFAULT_GEMINI_ENDPOINT, DEFAULT_GEMINI_MODEL, DEFAULT_VERTEX_LOCATION, DEFAULT_VERTEX_MODEL,
};
pub use settings::{
    CacheSettings, ConnectivitySettings, GeminiSettings, ProxySettings, RequestSettings, Settings,
    VertexSettings, MAX_CACHE_TTL_DAYS,
};
