use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::gemini::GeminiAdapter;
use super::proxy::ProxyAdapter;
use super::vertex::VertexAdapter;
use crate::analysis::{AnalysisRequest, AnalysisResponse, ConnectionStatus, ParsedAnalysis};
use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{AnalysisError, AnalysisResult};

/// One AI backend. Implementations never fail out of their boundary: every
/// runtime failure comes back as a response with `success == false`.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Analyze a structured item list.
    async fn analyze(&self, request: AnalysisRequest) -> AnalysisResponse;

    /// Analyze text and image parts (or items) as an ordered part list.
    async fn analyze_multimodal(&self, request: AnalysisRequest) -> AnalysisResponse;

    async fn test_connection(&self) -> ConnectionStatus;

    /// Vendor doing the work (the upstream vendor for the proxy).
    fn provider(&self) -> ProviderKind;

    /// Short tag used in responses and log lines.
    fn name(&self) -> &str;
}

/// Construct the adapter for a configuration, validating it first.
pub fn build_adapter(config: &ProviderConfig) -> AnalysisResult<Arc<dyn ProviderAdapter>> {
    config.validate()?;

    let adapter: Arc<dyn ProviderAdapter> = match config {
        ProviderConfig::Gemini(c) => Arc::new(GeminiAdapter::new(c.clone())?),
        ProviderConfig::Vertex(c) => Arc::new(VertexAdapter::new(c.clone())?),
        ProviderConfig::Proxy(c) => Arc::new(ProxyAdapter::new(c.clone())?),
    };
    Ok(adapter)
}

pub(crate) fn http_client(timeout: Duration) -> AnalysisResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("menulens/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AnalysisError::Configuration(format!("cannot build HTTP client: {}", e)))
}

/// Turn the outcome of one adapter call into the uniform response shape.
pub(crate) fn finish(
    outcome: AnalysisResult<ParsedAnalysis>,
    request: &AnalysisRequest,
    started: Instant,
    provider: &str,
) -> AnalysisResponse {
    match outcome {
        Ok(parsed) => {
            let response = parsed.into_response(
                request.items(),
                &request.request_id,
                started.elapsed(),
                provider,
            );
            tracing::info!(
                "[{}] analyzed {} item(s) in {}ms",
                provider,
                response.results.len(),
                response.processing_time_ms
            );
            response
        }
        Err(e) => {
            tracing::warn!("[{}] analysis failed ({:?}): {}", provider, e.code(), e);
            AnalysisResponse::failure(&request.request_id, e.to_string(), started.elapsed())
                .with_provider(provider)
        }
    }
}

/// Reject image-bearing requests on the text-only path.
pub(crate) fn ensure_text_only(request: &AnalysisRequest) -> AnalysisResult<()> {
    if request.has_images() {
        return Err(AnalysisError::InvalidRequest(
            "request contains images; use multimodal analysis".to_string(),
        ));
    }
    Ok(())
}
