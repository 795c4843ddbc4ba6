mod cache;
mod gemini;
mod providers;
mod proxy;
mod retry;
mod store;
#[cfg(test)]
mod testing;
mod vertex;

pub use cache::{cache_key, CacheEntry, CacheStats, ResultCache, CACHE_KEY_PREFIX, DEFAULT_TTL};
pub use gemini::{GeminiAdapter, GenerateContentRequest, GenerationConfig};
pub use providers::{build_adapter, ProviderAdapter};
pub use proxy::{ProxyAdapter, ProxyCall, ProxyEnvelope, ProxyReply};
pub use retry::{retry_decision, ResilientTransport, RetryConfig, RetryDecision};
pub use store::{CacheStore, MemoryCacheStore, SqliteCacheStore};
pub use vertex::VertexAdapter;
