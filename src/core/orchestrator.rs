use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::gate::{AlwaysOnline, ConnectivityProbe, TrialGate, UnlimitedTrial};
use super::metrics::{self, Metrics, MetricsSummary};
use crate::analysis::{AnalysisRequest, AnalysisResponse, ConnectionStatus};
use crate::config::{BackendMode, ProviderConfig, ProviderKind, Settings};
use crate::error::{AnalysisError, AnalysisResult};
use crate::llm::{
    build_adapter, cache_key, CacheStats, CacheStore, MemoryCacheStore, ProviderAdapter,
    ResultCache, DEFAULT_TTL,
};

/// Collaborators handed to the orchestrator at construction.
#[derive(Clone)]
pub struct OrchestratorDeps {
    pub store: Arc<dyn CacheStore>,
    pub trial_gate: Arc<dyn TrialGate>,
    pub connectivity: Arc<dyn ConnectivityProbe>,
    pub cache_ttl: Duration,
}

impl Default for OrchestratorDeps {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl OrchestratorDeps {
    /// In-memory cache, no trial limit, always online.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(MemoryCacheStore::new()),
            trial_gate: Arc::new(UnlimitedTrial),
            connectivity: Arc::new(AlwaysOnline),
            cache_ttl: DEFAULT_TTL,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_trial_gate(mut self, gate: Arc<dyn TrialGate>) -> Self {
        self.trial_gate = gate;
        self
    }

    pub fn with_connectivity(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.connectivity = probe;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }
}

/// The adapter currently serving requests, swapped as a whole.
struct ActiveAdapter {
    mode: BackendMode,
    provider: ProviderKind,
    adapter: Arc<dyn ProviderAdapter>,
}

/// Entry point for menu analysis: gating, caching, offline fallback and
/// delegation to the active provider adapter.
pub struct Orchestrator {
    settings: Settings,
    active: RwLock<Arc<ActiveAdapter>>,
    cache: ResultCache,
    trial_gate: Arc<dyn TrialGate>,
    connectivity: Arc<dyn ConnectivityProbe>,
    metrics: Metrics,
}

impl Orchestrator {
    /// Build the adapter for the configured backend and provider.
    /// Fails with a configuration error when that configuration is incomplete.
    pub fn new(settings: Settings, deps: OrchestratorDeps) -> AnalysisResult<Self> {
        let config = settings.active_config()?;
        let adapter = build_adapter(&config)?;
        tracing::info!(
            "Using {} backend with provider {}",
            config.backend_mode(),
            config.provider()
        );
        Ok(Self::assemble(adapter, config.backend_mode(), config.provider(), settings, deps))
    }

    /// Use a ready-made adapter instead of building one from settings.
    pub fn with_adapter(
        adapter: Arc<dyn ProviderAdapter>,
        settings: Settings,
        deps: OrchestratorDeps,
    ) -> Self {
        let mode = settings.backend_mode;
        let provider = adapter.provider();
        Self::assemble(adapter, mode, provider, settings, deps)
    }

    fn assemble(
        adapter: Arc<dyn ProviderAdapter>,
        mode: BackendMode,
        provider: ProviderKind,
        settings: Settings,
        deps: OrchestratorDeps,
    ) -> Self {
        Self {
            settings,
            active: RwLock::new(Arc::new(ActiveAdapter {
                mode,
                provider,
                adapter,
            })),
            cache: ResultCache::new(deps.store, deps.cache_ttl),
            trial_gate: deps.trial_gate,
            connectivity: deps.connectivity,
            metrics: Metrics::new(),
        }
    }

    async fn current(&self) -> Arc<ActiveAdapter> {
        self.active.read().await.clone()
    }

    pub async fn analyze_menu(&self, request: AnalysisRequest) -> AnalysisResponse {
        self.run(request, false).await
    }

    pub async fn analyze_menu_multimodal(&self, request: AnalysisRequest) -> AnalysisResponse {
        self.run(request, true).await
    }

    async fn run(&self, request: AnalysisRequest, multimodal: bool) -> AnalysisResponse {
        let started = Instant::now();
        let request_id = request.request_id.clone();

        if !self.trial_gate.can_perform_call().await {
            self.metrics.increment(metrics::TRIAL_DENIALS);
            tracing::info!("Trial gate denied request {}", request_id);
            let err =
                AnalysisError::TrialExhausted("upgrade to continue analyzing menus".to_string());
            return AnalysisResponse::failure(&request_id, err.to_string(), started.elapsed());
        }

        let key = cache_key(&request);

        if !self.connectivity.is_online().await {
            return match self.cache.get(&key, &request_id, started).await {
                Some(cached) => {
                    self.metrics.increment(metrics::CACHE_HITS);
                    self.metrics.increment(metrics::OFFLINE_FALLBACKS);
                    tracing::info!("Offline, served request {} from cache", request_id);
                    cached
                }
                None => {
                    self.metrics.increment(metrics::CACHE_MISSES);
                    tracing::warn!("Offline and no cached analysis for request {}", request_id);
                    AnalysisResponse::failure(
                        &request_id,
                        AnalysisError::Offline.to_string(),
                        started.elapsed(),
                    )
                }
            };
        }

        if let Some(cached) = self.cache.get(&key, &request_id, started).await {
            self.metrics.increment(metrics::CACHE_HITS);
            tracing::info!("Cache hit for request {}", request_id);
            return cached;
        }
        self.metrics.increment(metrics::CACHE_MISSES);

        let active = self.current().await;
        let name = active.adapter.name().to_string();
        self.metrics.increment(metrics::LIVE_CALLS);

        let adapter = active.adapter.clone();
        let call = tokio::spawn(async move {
            if multimodal {
                adapter.analyze_multimodal(request).await
            } else {
                adapter.analyze(request).await
            }
        });

        let mut response = match call.await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("[{}] adapter task failed: {}", name, e);
                AnalysisResponse::failure(
                    &request_id,
                    format!("adapter task failed: {}", e),
                    started.elapsed(),
                )
                .with_provider(&name)
            }
        };
        self.metrics.record_time(metrics::ANALYSIS, started.elapsed());

        if response.success {
            if let Err(e) = self.cache.put(&key, &response).await {
                tracing::warn!("Could not cache analysis {}: {}", request_id, e);
            }
            self.trial_gate.record_call().await;
            return response;
        }

        self.metrics.increment(metrics::FAILURES);

        // A concurrent call may have filled the cache meanwhile
        if let Some(cached) = self.cache.get(&key, &request_id, started).await {
            self.metrics.increment(metrics::CACHE_HITS);
            tracing::info!(
                "[{}] live call failed, serving cached analysis for {}",
                name,
                request_id
            );
            return cached;
        }

        let message = response.message.take().unwrap_or_else(|| "analysis failed".to_string());
        response.message = Some(format!("[{}] {}", name, message));
        response
    }

    pub async fn test_connection(&self) -> ConnectionStatus {
        let active = self.current().await;
        let status = active.adapter.test_connection().await;
        if status.success {
            tracing::info!("[{}] {}", active.adapter.name(), status.message);
        } else {
            tracing::warn!("[{}] {}", active.adapter.name(), status.message);
        }
        status
    }

    /// Replace the active adapter. The new configuration is validated and the
    /// adapter built before the swap; on error the previous adapter stays live.
    ///
    /// Without an explicit config the settings supply one for the current
    /// backend mode, so in proxy mode this changes the upstream vendor.
    pub async fn switch_provider(
        &self,
        provider: ProviderKind,
        config: Option<ProviderConfig>,
    ) -> AnalysisResult<()> {
        let config = match config {
            Some(config) => config,
            None => self.settings.provider_config(provider)?,
        };

        if config.provider() != provider {
            return Err(AnalysisError::Configuration(format!(
                "configuration is for {}, not {}",
                config.provider(),
                provider
            )));
        }

        let adapter = build_adapter(&config)?;
        let next = Arc::new(ActiveAdapter {
            mode: config.backend_mode(),
            provider,
            adapter,
        });

        let mut active = self.active.write().await;
        let previous = active.provider;
        *active = next;
        tracing::info!("Switched provider {} -> {}", previous, provider);
        Ok(())
    }

    /// Whether `provider` has a complete configuration. No network access.
    pub fn is_provider_available(&self, provider: ProviderKind) -> bool {
        self.settings.is_configured(provider)
    }

    pub async fn active_provider(&self) -> ProviderKind {
        self.current().await.provider
    }

    pub async fn backend_mode(&self) -> BackendMode {
        self.current().await.mode
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn clear_cache(&self) -> AnalysisResult<usize> {
        self.cache.clear().await
    }

    pub async fn cache_stats(&self) -> AnalysisResult<CacheStats> {
        self.cache.stats().await
    }

    pub async fn purge_expired_cache(&self) -> AnalysisResult<usize> {
        self.cache.purge_expired().await
    }

    pub fn metrics(&self) -> MetricsSummary {
        self.metrics.summary()
    }
}
