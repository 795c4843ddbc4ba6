pub mod parser;
pub mod prompt;
mod types;

pub use parser::{parse_analysis, ParsedAnalysis};
pub use types::{
    AnalysisRequest, AnalysisResponse, ConnectionStatus, ContentPart, DietaryPreferences,
    DietaryType, FoodAnalysisResult, MenuInput, MenuItem, Suitability,
};
