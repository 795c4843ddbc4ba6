use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Dietary regime the menu is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DietaryType {
    Vegan,
    Vegetarian,
    Pescatarian,
    GlutenFree,
    DairyFree,
    Keto,
    Halal,
    Kosher,
    NutFree,
    Custom,
}

impl DietaryType {
    pub fn label(&self) -> &'static str {
        match self {
            DietaryType::Vegan => "vegan",
            DietaryType::Vegetarian => "vegetarian",
            DietaryType::Pescatarian => "pescatarian",
            DietaryType::GlutenFree => "gluten-free",
            DietaryType::DairyFree => "dairy-free",
            DietaryType::Keto => "keto",
            DietaryType::Halal => "halal",
            DietaryType::Kosher => "kosher",
            DietaryType::NutFree => "nut-free",
            DietaryType::Custom => "custom",
        }
    }

    /// Rules handed to the model for this diet.
    pub fn rules(&self) -> &'static str {
        match self {
            DietaryType::Vegan => "No animal products of any kind: no meat, fish, dairy, eggs, honey, gelatin or animal-derived stocks.",
            DietaryType::Vegetarian => "No meat, poultry or fish, including meat or fish stocks and gelatin. Dairy and eggs are allowed.",
            DietaryType::Pescatarian => "No meat or poultry. Fish, seafood, dairy and eggs are allowed.",
            DietaryType::GlutenFree => "No wheat, barley, rye, spelt or derivatives; watch for breading, soy sauce, malt and cross-contamination.",
            DietaryType::DairyFree => "No milk, butter, cream, cheese, yogurt, whey or casein.",
            DietaryType::Keto => "Very low carbohydrate: avoid sugar, grains, bread, pasta, rice, potatoes and sweet sauces.",
            DietaryType::Halal => "No pork or pork derivatives, no alcohol in preparation, meat must be halal-certified.",
            DietaryType::Kosher => "No pork or shellfish, no mixing of meat and dairy, meat must be kosher-certified.",
            DietaryType::NutFree => "No tree nuts or peanuts, including nut oils, pesto, praline and nut-based sauces.",
            DietaryType::Custom => "Follow the custom restrictions stated below exactly.",
        }
    }
}

impl fmt::Display for DietaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DietaryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "vegan" => Ok(DietaryType::Vegan),
            "vegetarian" => Ok(DietaryType::Vegetarian),
            "pescatarian" => Ok(DietaryType::Pescatarian),
            "gluten-free" | "glutenfree" => Ok(DietaryType::GlutenFree),
            "dairy-free" | "dairyfree" => Ok(DietaryType::DairyFree),
            "keto" => Ok(DietaryType::Keto),
            "halal" => Ok(DietaryType::Halal),
            "kosher" => Ok(DietaryType::Kosher),
            "nut-free" | "nutfree" => Ok(DietaryType::NutFree),
            "custom" => Ok(DietaryType::Custom),
            other => Err(format!("Unknown dietary type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DietaryPreferences {
    pub dietary_type: DietaryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_restrictions: Option<String>,
}

impl DietaryPreferences {
    pub fn new(dietary_type: DietaryType) -> Self {
        Self {
            dietary_type,
            custom_restrictions: None,
        }
    }

    pub fn with_restrictions(mut self, restrictions: impl Into<String>) -> Self {
        let restrictions = restrictions.into();
        if !restrictions.trim().is_empty() {
            self.custom_restrictions = Some(restrictions);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingredients: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl MenuItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            ingredients: Vec::new(),
            price: None,
            category: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_ingredients<I, S>(mut self, ingredients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ingredients = ingredients.into_iter().map(Into::into).collect();
        self
    }
}

/// One element of a multimodal request: free text or an inline image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "mimeType")]
        mime_type: String,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        ContentPart::Image {
            mime_type: mime_type.into(),
            data,
        }
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&general_purpose::STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// What the menu is made of: structured items, or raw text/image parts.
#[derive(Debug, Clone, PartialEq)]
pub enum MenuInput {
    Items(Vec<MenuItem>),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub dietary_preferences: DietaryPreferences,
    pub input: MenuInput,
    pub context: Option<String>,
    /// Opaque, caller-side correlation only. Never part of the cache key.
    pub request_id: String,
}

impl AnalysisRequest {
    pub fn for_items(dietary_preferences: DietaryPreferences, items: Vec<MenuItem>) -> Self {
        Self {
            dietary_preferences,
            input: MenuInput::Items(items),
            context: None,
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn multimodal(dietary_preferences: DietaryPreferences, parts: Vec<ContentPart>) -> Self {
        Self {
            dietary_preferences,
            input: MenuInput::Parts(parts),
            context: None,
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn items(&self) -> &[MenuItem] {
        match &self.input {
            MenuInput::Items(items) => items,
            MenuInput::Parts(_) => &[],
        }
    }

    pub fn has_images(&self) -> bool {
        match &self.input {
            MenuInput::Items(_) => false,
            MenuInput::Parts(parts) => parts.iter().any(|p| matches!(p, ContentPart::Image { .. })),
        }
    }
}

/// Suitability of one menu item. Exactly three values exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Suitability {
    #[serde(rename = "SAFE", alias = "safe")]
    Safe,
    #[serde(
        rename = "NEEDS_CLARIFICATION",
        alias = "needs_clarification",
        alias = "NEEDS-CLARIFICATION"
    )]
    NeedsClarification,
    #[serde(rename = "AVOID", alias = "avoid")]
    Avoid,
}

impl fmt::Display for Suitability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Suitability::Safe => "SAFE",
            Suitability::NeedsClarification => "NEEDS CLARIFICATION",
            Suitability::Avoid => "AVOID",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodAnalysisResult {
    #[serde(default)]
    pub item_id: String,
    #[serde(default)]
    pub item_name: String,
    pub suitability: Suitability,
    #[serde(default)]
    pub explanation: String,
    /// Follow-up questions for the server; only kept for `NeedsClarification`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions: Option<Vec<String>>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concerns: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub success: bool,
    #[serde(default)]
    pub results: Vec<FoodAnalysisResult>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub request_id: String,
    #[serde(default, rename = "processingTime")]
    pub processing_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default)]
    pub from_cache: bool,
}

impl AnalysisResponse {
    pub fn failure(request_id: impl Into<String>, message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            success: false,
            results: Vec::new(),
            confidence: 0.0,
            message: Some(message.into()),
            request_id: request_id.into(),
            processing_time_ms: elapsed.as_millis() as u64,
            provider: None,
            from_cache: false,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub success: bool,
    pub message: String,
    pub latency_ms: u64,
}

impl ConnectionStatus {
    pub fn ok(message: impl Into<String>, latency: Duration) -> Self {
        Self {
            success: true,
            message: message.into(),
            latency_ms: latency.as_millis() as u64,
        }
    }

    pub fn failed(message: impl Into<String>, latency: Duration) -> Self {
        Self {
            success: false,
            message: message.into(),
            latency_ms: latency.as_millis() as u64,
        }
    }
}
