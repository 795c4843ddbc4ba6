// ============================================
// MENULENS - Model Output Parser
// ============================================

use serde_json::Value;
use std::time::Duration;

use super::types::{AnalysisResponse, FoodAnalysisResult, MenuItem, Suitability};
use crate::error::{AnalysisError, AnalysisResult};

/// Structured result extracted from raw model text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAnalysis {
    pub success: bool,
    pub results: Vec<FoodAnalysisResult>,
    pub confidence: Option<f64>,
    pub message: Option<String>,
}

/// Isolate the candidate object between the first `{` and the last `}`.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

/// Parse model output that may be wrapped in prose or markdown fences.
///
/// Failures here are never retried: a malformed answer is not transient.
pub fn parse_analysis(raw: &str) -> AnalysisResult<ParsedAnalysis> {
    let candidate = extract_json_object(raw)
        .ok_or_else(|| AnalysisError::Parse("no JSON object found in model output".to_string()))?;

    let value: Value = serde_json::from_str(candidate)
        .map_err(|e| AnalysisError::Parse(format!("invalid JSON object: {}", e)))?;

    let success = value
        .get("success")
        .and_then(Value::as_bool)
        .ok_or_else(|| AnalysisError::Parse("missing boolean `success` field".to_string()))?;

    let raw_results = value
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| AnalysisError::Parse("missing array `results` field".to_string()))?;

    let mut results = Vec::with_capacity(raw_results.len());
    for (i, entry) in raw_results.iter().enumerate() {
        let result: FoodAnalysisResult = serde_json::from_value(entry.clone())
            .map_err(|e| AnalysisError::Parse(format!("invalid result at index {}: {}", i, e)))?;
        results.push(normalize(result));
    }

    Ok(ParsedAnalysis {
        success,
        results,
        confidence: value.get("confidence").and_then(Value::as_f64).map(clamp_unit),
        message: value
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty())
            .map(String::from),
    })
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn normalize(mut result: FoodAnalysisResult) -> FoodAnalysisResult {
    result.confidence = clamp_unit(result.confidence);

    if result.suitability != Suitability::NeedsClarification {
        result.questions = None;
    }
    if result.questions.as_ref().is_some_and(|q| q.is_empty()) {
        result.questions = None;
    }
    if result.concerns.as_ref().is_some_and(|c| c.is_empty()) {
        result.concerns = None;
    }
    result
}

impl ParsedAnalysis {
    /// Build the caller-facing response, filling ids the model left out from
    /// the request's items (by name first, then by position).
    pub fn into_response(
        mut self,
        items: &[MenuItem],
        request_id: &str,
        elapsed: Duration,
        provider: &str,
    ) -> AnalysisResponse {
        for (i, result) in self.results.iter_mut().enumerate() {
            if !result.item_id.is_empty() {
                continue;
            }
            let matched = items
                .iter()
                .find(|item| item.name.eq_ignore_ascii_case(result.item_name.trim()))
                .or_else(|| items.get(i));
            match matched {
                Some(item) => {
                    result.item_id = item.id.clone();
                    if result.item_name.is_empty() {
                        result.item_name = item.name.clone();
                    }
                }
                None => result.item_id = format!("item-{}", i + 1),
            }
        }

        let confidence = self.confidence.unwrap_or_else(|| {
            if self.results.is_empty() {
                0.0
            } else {
                self.results.iter().map(|r| r.confidence).sum::<f64>() / self.results.len() as f64
            }
        });

        AnalysisResponse {
            success: self.success,
            results: self.results,
            confidence,
            message: self.message,
            request_id: request_id.to_string(),
            processing_time_ms: elapsed.as_millis() as u64,
            provider: Some(provider.to_string()),
            from_cache: false,
        }
    }
}
