// ============================================
// MENULENS - Proxy Adapter
// Forwards analysis to the menulens proxy service
// ============================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::gemini::vendor_error_message;
use super::providers::{ensure_text_only, finish, http_client, ProviderAdapter};
use super::retry::{ResilientTransport, RetryConfig};
use crate::analysis::{
    AnalysisRequest, AnalysisResponse, ConnectionStatus, ContentPart, DietaryPreferences,
    FoodAnalysisResult, MenuInput, MenuItem, ParsedAnalysis,
};
use crate::config::{ProviderKind, ProxyConfig};
use crate::error::{AnalysisError, AnalysisResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyCall {
    Analyze,
    AnalyzeMultimodal,
    TestConnection,
}

/// Request envelope posted to `{base_url}/analyze`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyEnvelope<'a> {
    #[serde(rename = "type")]
    pub call: ProxyCall,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dietary_preferences: Option<&'a DietaryPreferences>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub menu_items: Option<&'a [MenuItem]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_parts: Option<&'a [ContentPart]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<&'a str>,
    pub request_id: &'a str,
    pub provider: ProviderKind,
}

impl<'a> ProxyEnvelope<'a> {
    pub fn for_request(
        request: &'a AnalysisRequest,
        call: ProxyCall,
        provider: ProviderKind,
    ) -> Self {
        let (menu_items, content_parts) = match &request.input {
            MenuInput::Items(items) => (Some(items.as_slice()), None),
            MenuInput::Parts(parts) => (None, Some(parts.as_slice())),
        };

        Self {
            call,
            dietary_preferences: Some(&request.dietary_preferences),
            menu_items,
            content_parts,
            context: request.context.as_deref(),
            request_id: &request.request_id,
            provider,
        }
    }

    pub fn test_connection(provider: ProviderKind, request_id: &'a str) -> Self {
        Self {
            call: ProxyCall::TestConnection,
            dietary_preferences: None,
            menu_items: None,
            content_parts: None,
            context: None,
            request_id,
            provider,
        }
    }
}

/// Reply body. The proxy has already parsed the model output.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyReply {
    pub success: bool,
    #[serde(default)]
    pub results: Vec<FoodAnalysisResult>,
    pub confidence: Option<f64>,
    pub message: Option<String>,
}

impl From<ProxyReply> for ParsedAnalysis {
    fn from(reply: ProxyReply) -> Self {
        ParsedAnalysis {
            success: reply.success,
            results: reply.results,
            confidence: reply.confidence.map(|c| c.clamp(0.0, 1.0)),
            message: reply.message,
        }
    }
}

pub struct ProxyAdapter {
    config: ProxyConfig,
    client: reqwest::Client,
    transport: ResilientTransport,
}

impl ProxyAdapter {
    pub fn new(config: ProxyConfig) -> AnalysisResult<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        Ok(Self {
            client: http_client(timeout)?,
            transport: ResilientTransport::new(RetryConfig::new(config.max_retries, timeout)),
            config,
        })
    }

    pub fn with_transport(mut self, transport: ResilientTransport) -> Self {
        self.transport = transport;
        self
    }

    fn url(&self) -> String {
        format!("{}/analyze", self.config.base_url.trim_end_matches('/'))
    }

    async fn post_once(
        &self,
        url: &str,
        envelope: &ProxyEnvelope<'_>,
    ) -> AnalysisResult<ProxyReply> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.access_token)
            .json(envelope)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AnalysisError::from_status(status.as_u16(), vendor_error_message(&body)));
        }

        serde_json::from_str(&body)
            .map_err(|e| AnalysisError::Parse(format!("unexpected proxy reply: {}", e)))
    }

    async fn post(
        &self,
        envelope: &ProxyEnvelope<'_>,
        transport: &ResilientTransport,
    ) -> AnalysisResult<ProxyReply> {
        let url = self.url();
        transport.execute(|| self.post_once(&url, envelope)).await
    }

    async fn run(
        &self,
        request: &AnalysisRequest,
        call: ProxyCall,
    ) -> AnalysisResult<ParsedAnalysis> {
        if call == ProxyCall::Analyze {
            ensure_text_only(request)?;
        }
        let envelope = ProxyEnvelope::for_request(request, call, self.config.provider);
        let reply = self.post(&envelope, &self.transport).await?;
        Ok(reply.into())
    }
}

#[async_trait]
impl ProviderAdapter for ProxyAdapter {
    async fn analyze(&self, request: AnalysisRequest) -> AnalysisResponse {
        let started = Instant::now();
        let outcome = self.run(&request, ProxyCall::Analyze).await;
        finish(outcome, &request, started, self.name())
    }

    async fn analyze_multimodal(&self, request: AnalysisRequest) -> AnalysisResponse {
        let started = Instant::now();
        let outcome = self.run(&request, ProxyCall::AnalyzeMultimodal).await;
        finish(outcome, &request, started, self.name())
    }

    async fn test_connection(&self) -> ConnectionStatus {
        let started = Instant::now();
        let single = ResilientTransport::new(RetryConfig::probe(Duration::from_millis(
            self.config.timeout_ms,
        )));
        let request_id = uuid::Uuid::new_v4().to_string();
        let envelope = ProxyEnvelope::test_connection(self.config.provider, &request_id);

        match self.post(&envelope, &single).await {
            Ok(reply) if reply.success => ConnectionStatus::ok(
                format!(
                    "Connected to proxy at {} ({})",
                    self.config.base_url, self.config.provider
                ),
                started.elapsed(),
            ),
            Ok(reply) => ConnectionStatus::failed(
                reply.message.unwrap_or_else(|| {
                    "Proxy reported an unsuccessful connection test".to_string()
                }),
                started.elapsed(),
            ),
            Err(e) => ConnectionStatus::failed(
                format!("Proxy connection failed: {}", e),
                started.elapsed(),
            ),
        }
    }

    fn provider(&self) -> ProviderKind {
        self.config.provider
    }

    fn name(&self) -> &str {
        "proxy"
    }
}
