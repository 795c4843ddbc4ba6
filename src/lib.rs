//! Dietary analysis of restaurant menus over pluggable AI providers, with
//! retry, result caching, trial gating and offline fallback.

pub mod analysis;
pub mod config;
pub mod core;
pub mod error;
pub mod llm;

pub use crate::analysis::{AnalysisRequest, AnalysisResponse};
pub use crate::core::{Orchestrator, OrchestratorDeps};
pub use crate::error::{AnalysisError, AnalysisResult, ErrorCode};
