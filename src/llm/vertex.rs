use async_trait::async_trait;
use std::time::{Duration, Instant};

use super::gemini::{send_generate_content, GenerateContentRequest};
use super::providers::{ensure_text_only, finish, http_client, ProviderAdapter};
use super::retry::{ResilientTransport, RetryConfig};
use crate::analysis::{
    parse_analysis, prompt, AnalysisRequest, AnalysisResponse, ConnectionStatus, ParsedAnalysis,
};
use crate::config::{ProviderKind, VertexConfig};
use crate::error::AnalysisResult;

/// Vertex AI hosting of the same model family. Shares the generateContent
/// payload with the Gemini adapter; only addressing and auth differ.
pub struct VertexAdapter {
    config: VertexConfig,
    client: reqwest::Client,
    transport: ResilientTransport,
}

impl VertexAdapter {
    pub fn new(config: VertexConfig) -> AnalysisResult<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        if config.access_token.is_none() {
            tracing::warn!("[vertex] no access token configured, requests are sent unauthenticated");
        }
        Ok(Self {
            client: http_client(timeout)?,
            transport: ResilientTransport::new(RetryConfig::new(config.max_retries, timeout)),
            config,
        })
    }

    fn url(&self) -> String {
        format!(
            "https://{loc}-aiplatform.googleapis.com/v1/projects/{project}/locations/{loc}/publishers/google/models/{model}:generateContent",
            loc = self.config.location,
            project = self.config.project_id,
            model = self.config.model,
        )
    }

    async fn generate(
        &self,
        body: &GenerateContentRequest,
        transport: &ResilientTransport,
    ) -> AnalysisResult<String> {
        let url = self.url();
        transport
            .execute(|| {
                let mut builder = self.client.post(&url);
                if let Some(token) = &self.config.access_token {
                    builder = builder.bearer_auth(token);
                }
                send_generate_content(builder, body)
            })
            .await
    }

    async fn run(
        &self,
        request: &AnalysisRequest,
        multimodal: bool,
    ) -> AnalysisResult<ParsedAnalysis> {
        if !multimodal {
            ensure_text_only(request)?;
        }
        let body = GenerateContentRequest::for_request(request, multimodal);
        let text = self.generate(&body, &self.transport).await?;
        parse_analysis(&text)
    }
}

#[async_trait]
impl ProviderAdapter for VertexAdapter {
    async fn analyze(&self, request: AnalysisRequest) -> AnalysisResponse {
        let started = Instant::now();
        let outcome = self.run(&request, false).await;
        finish(outcome, &request, started, self.name())
    }

    async fn analyze_multimodal(&self, request: AnalysisRequest) -> AnalysisResponse {
        let started = Instant::now();
        let outcome = self.run(&request, true).await;
        finish(outcome, &request, started, self.name())
    }

    async fn test_connection(&self) -> ConnectionStatus {
        let started = Instant::now();
        let probe = ResilientTransport::new(RetryConfig::probe(Duration::from_millis(
            self.config.timeout_ms,
        )));
        let body = GenerateContentRequest::from_text(prompt::connection_test_prompt());

        match self.generate(&body, &probe).await {
            Ok(_) => ConnectionStatus::ok(
                format!(
                    "Connected to Vertex AI ({} in {})",
                    self.config.model, self.config.location
                ),
                started.elapsed(),
            ),
            Err(e) => ConnectionStatus::failed(
                format!("Vertex AI connection failed: {}", e),
                started.elapsed(),
            ),
        }
    }

    fn provider(&self) -> ProviderKind {
        ProviderKind::Vertex
    }

    fn name(&self) -> &str {
        "vertex"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regional_url() {
        let adapter = VertexAdapter::new(VertexConfig {
            project_id: "menu-app".to_string(),
            location: "europe-west4".to_string(),
            model: "gemini-1.5-flash-002".to_string(),
            access_token: Some("ya29.token".to_string()),
            timeout_ms: 5_000,
            max_retries: 2,
        })
        .unwrap();

        assert_eq!(
            adapter.url(),
            "https://europe-west4-aiplatform.googleapis.com/v1/projects/menu-app/locations/europe-west4/publishers/google/models/gemini-1.5-flash-002:generateContent"
        );
        assert_eq!(adapter.provider(), ProviderKind::Vertex);
        assert_eq!(adapter.transport.config().max_retries, 2);
    }
}
