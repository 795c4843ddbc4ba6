// ============================================
// MENULENS - Gemini Adapter
// generateContent wire types shared with the Vertex adapter
// ============================================

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::providers::{ensure_text_only, finish, http_client, ProviderAdapter};
use super::retry::{ResilientTransport, RetryConfig};
use crate::analysis::{
    parse_analysis, prompt, AnalysisRequest, AnalysisResponse, ConnectionStatus, ContentPart,
    ParsedAnalysis,
};
use crate::config::{GeminiConfig, ProviderKind};
use crate::error::{AnalysisError, AnalysisResult};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// Variant order matters for untagged decoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            top_k: 32,
            top_p: 1.0,
            max_output_tokens: 8192,
            response_mime_type: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl GenerateContentRequest {
    pub fn from_text(prompt: impl Into<String>) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::Text { text: prompt.into() }],
            }],
            generation_config: GenerationConfig::default(),
        }
    }

    pub fn from_parts(parts: &[ContentPart]) -> Self {
        let parts = parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => Part::Text { text: text.clone() },
                ContentPart::Image { mime_type, data } => Part::InlineData {
                    inline_data: InlineData {
                        mime_type: mime_type.clone(),
                        data: general_purpose::STANDARD.encode(data),
                    },
                },
            })
            .collect();

        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: GenerationConfig::default(),
        }
    }

    /// Build the body for an analysis request on the given path.
    pub fn for_request(request: &AnalysisRequest, multimodal: bool) -> Self {
        let mut body = if multimodal {
            Self::from_parts(&prompt::build_multimodal_parts(request))
        } else {
            Self::from_text(prompt::build_text_prompt(request))
        };
        body.generation_config.response_mime_type = Some("application/json".to_string());
        body
    }
}

/// Pull the vendor's error message out of an error body, falling back to the raw text.
pub(crate) fn vendor_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.status.is_empty() => {
            format!("{} ({})", envelope.error.message, envelope.error.status)
        }
        Ok(envelope) => envelope.error.message,
        Err(_) => body.chars().take(300).collect(),
    }
}

/// Extract the model's text from a generateContent reply body.
pub(crate) fn extract_text(body: &str) -> AnalysisResult<String> {
    let reply: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| AnalysisError::Parse(format!("unexpected generateContent reply: {}", e)))?;

    if let Some(reason) = reply.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(AnalysisError::InvalidRequest(format!("prompt blocked: {}", reason)));
    }

    let Some(candidate) = reply.candidates.into_iter().next() else {
        return Err(AnalysisError::Parse("model returned no candidates".to_string()));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|part| match part {
            Part::Text { text } => Some(text),
            Part::InlineData { .. } => None,
        })
        .collect();

    if text.trim().is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "UNKNOWN".to_string());
        return Err(AnalysisError::Parse(format!(
            "model returned no text (finish reason: {})",
            reason
        )));
    }

    Ok(text)
}

/// Send one generateContent call and return the model text.
pub(crate) async fn send_generate_content(
    builder: reqwest::RequestBuilder,
    body: &GenerateContentRequest,
) -> AnalysisResult<String> {
    let response = builder.json(body).send().await?;
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(AnalysisError::from_status(status.as_u16(), vendor_error_message(&text)));
    }

    // Some gateways wrap vendor errors in a 200
    if text.contains("\"error\"") && !text.contains("\"candidates\"") {
        return Err(AnalysisError::from_vendor_message(vendor_error_message(&text)));
    }

    extract_text(&text)
}

pub struct GeminiAdapter {
    config: GeminiConfig,
    client: reqwest::Client,
    transport: ResilientTransport,
}

impl GeminiAdapter {
    pub fn new(config: GeminiConfig) -> AnalysisResult<Self> {
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
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
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
                let builder = self
                    .client
                    .post(&url)
                    .header("x-goog-api-key", self.config.api_key.as_str());
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
impl ProviderAdapter for GeminiAdapter {
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
        let single = ResilientTransport::new(RetryConfig::probe(Duration::from_millis(
            self.config.timeout_ms,
        )));
        let body = GenerateContentRequest::from_text(prompt::connection_test_prompt());

        match self.generate(&body, &single).await {
            Ok(_) => ConnectionStatus::ok(
                format!("Connected to Gemini ({})", self.config.model),
                started.elapsed(),
            ),
            Err(e) => ConnectionStatus::failed(
                format!("Gemini connection failed: {}", e),
                started.elapsed(),
            ),
        }
    }

    fn provider(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{DietaryPreferences, DietaryType, MenuItem, Suitability};
    use crate::error::ErrorCode;
    use crate::llm::testing::ScriptedServer;

    const API_KEY: &str = "SECRET-KEY-123";

    fn adapter(endpoint: &str, attempts: u32) -> GeminiAdapter {
        GeminiAdapter::new(GeminiConfig {
            api_key: API_KEY.to_string(),
            endpoint: endpoint.to_string(),
            model: "gemini-1.5-flash".to_string(),
            timeout_ms: 2000,
            max_retries: attempts,
        })
        .unwrap()
        .with_transport(ResilientTransport::new(RetryConfig {
            initial_delay: Duration::from_millis(5),
            ..RetryConfig::new(attempts, Duration::from_secs(2))
        }))
    }

    fn salad_request() -> AnalysisRequest {
        AnalysisRequest::for_items(
            DietaryPreferences::new(DietaryType::Vegan),
            vec![MenuItem::new("1", "Garden Salad")],
        )
    }

    fn model_reply(text: &str) -> String {
        serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": text}]},
                "finishReason": "STOP"
            }]
        })
        .to_string()
    }

    fn safe_salad() -> String {
        model_reply(
            r#"{"success":true,"results":[{"itemId":"1","itemName":"Garden Salad","suitability":"SAFE","explanation":"Vegetables only","confidence":0.9}],"confidence":0.9}"#,
        )
    }

    #[test]
    fn test_text_body_shape() {
        let request = AnalysisRequest::for_items(
            DietaryPreferences::new(DietaryType::Vegan),
            vec![MenuItem::new("1", "Garden Salad")],
        );
        let body =
            serde_json::to_value(GenerateContentRequest::for_request(&request, false)).unwrap();

        assert_eq!(body["contents"][0]["role"], "user");
        let text = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(text.contains("Garden Salad"));
        assert!(body["generationConfig"]["topK"].is_number());
        assert!(body["generationConfig"]["maxOutputTokens"].is_number());
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn test_inline_image_part() {
        let body = GenerateContentRequest::from_parts(&[
            ContentPart::text("menu"),
            ContentPart::image("image/png", vec![1, 2, 3]),
        ]);
        let json = serde_json::to_value(body).unwrap();
        assert_eq!(json["contents"][0]["parts"][1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(json["contents"][0]["parts"][1]["inlineData"]["data"], "AQID");
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let body = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"{\"success\":true,"},{"text":"\"results\":[]}"}]},"finishReason":"STOP"}]}"#;
        assert_eq!(extract_text(body).unwrap(), "{\"success\":true,\"results\":[]}");
    }

    #[test]
    fn test_blocked_prompt() {
        let body = r#"{"candidates":[],"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let err = extract_text(body).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }

    #[test]
    fn test_empty_candidate_is_parse_error() {
        let body = r#"{"candidates":[{"finishReason":"MAX_TOKENS"}]}"#;
        let err = extract_text(body).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Parse);
        assert!(err.to_string().contains("MAX_TOKENS"));
    }

    #[test]
    fn test_vendor_error_message() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(vendor_error_message(body), "Quota exceeded (RESOURCE_EXHAUSTED)");
        assert_eq!(vendor_error_message("gateway down"), "gateway down");
    }

    #[test]
    fn test_url() {
        let adapter = GeminiAdapter::new(GeminiConfig {
            api_key: "k".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta/".to_string(),
            model: "gemini-1.5-flash".to_string(),
            timeout_ms: 1000,
            max_retries: 1,
        })
        .unwrap();
        assert_eq!(
            adapter.url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[tokio::test]
    async fn test_analyze_recovers_after_server_errors() {
        let server = ScriptedServer::start(vec![
            (500, r#"{"error":{"message":"internal","status":"INTERNAL"}}"#.to_string()),
            (503, r#"{"error":{"message":"overloaded","status":"UNAVAILABLE"}}"#.to_string()),
            (200, safe_salad()),
        ])
        .await;

        let response = adapter(&server.url, 3).analyze(salad_request()).await;

        assert!(response.success, "{:?}", response.message);
        assert_eq!(server.connections(), 3);
        assert_eq!(response.results[0].suitability, Suitability::Safe);
        assert_eq!(response.provider.as_deref(), Some("gemini"));
    }

    #[tokio::test]
    async fn test_rate_limit_is_not_retried() {
        let server = ScriptedServer::start(vec![
            (
                429,
                r#"{"error":{"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#.to_string(),
            ),
            (200, safe_salad()),
        ])
        .await;

        let response = adapter(&server.url, 3).analyze(salad_request()).await;

        assert!(!response.success);
        assert_eq!(server.connections(), 1);
        let message = response.message.unwrap();
        assert!(message.contains("Quota exceeded (RESOURCE_EXHAUSTED)"), "{}", message);
    }

    #[tokio::test]
    async fn test_unparseable_model_text_is_a_failed_response() {
        let server = ScriptedServer::start(vec![
            (200, model_reply("Sorry, I can't read this menu.")),
            (200, safe_salad()),
        ])
        .await;

        let response = adapter(&server.url, 3).analyze(salad_request()).await;

        assert!(!response.success);
        assert_eq!(server.connections(), 1);
        assert!(response.message.unwrap().contains("no JSON object"));
    }

    #[tokio::test]
    async fn test_api_key_travels_in_header() {
        let server = ScriptedServer::start(vec![(200, safe_salad())]).await;

        let response = adapter(&server.url, 1).analyze(salad_request()).await;
        assert!(response.success);

        let requests = server.requests();
        let request_line = requests[0].lines().next().unwrap();
        assert!(!request_line.contains(API_KEY), "{}", request_line);
        assert!(requests[0]
            .to_lowercase()
            .contains(&format!("x-goog-api-key: {}", API_KEY.to_lowercase())));
    }

    #[tokio::test]
    async fn test_transport_failure_message_omits_credentials() {
        let response = adapter("http://127.0.0.1:9", 1).analyze(salad_request()).await;

        assert!(!response.success);
        let message = response.message.unwrap();
        assert!(!message.contains(API_KEY), "{}", message);
        assert!(!message.contains("generateContent"), "{}", message);
    }
}
