use super::types::{AnalysisRequest, ContentPart, DietaryPreferences, MenuInput, MenuItem};

const RESPONSE_FORMAT: &str = r#"Respond with a single JSON object and nothing else, using exactly this shape:
{
  "success": true,
  "results": [
    {
      "itemId": "<id of the menu item>",
      "itemName": "<name of the menu item>",
      "suitability": "SAFE" | "NEEDS_CLARIFICATION" | "AVOID",
      "explanation": "<one or two sentences>",
      "questions": ["<question to ask the server>"],
      "confidence": <number between 0 and 1>,
      "concerns": ["<ingredient or preparation concern>"]
    }
  ],
  "confidence": <overall number between 0 and 1>,
  "message": "<optional short summary>"
}
Only include "questions" for NEEDS_CLARIFICATION items. Keep the items in menu order."#;

/// Describes the diner's restrictions.
pub fn dietary_context(prefs: &DietaryPreferences) -> String {
    let mut context = format!(
        "Dietary restriction: {}\nRules: {}",
        prefs.dietary_type.label(),
        prefs.dietary_type.rules()
    );

    if let Some(custom) = prefs
        .custom_restrictions
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    {
        context.push_str("\nAdditional restrictions: ");
        context.push_str(custom);
    }

    context
}

/// Renders menu items as a numbered list.
pub fn item_context(items: &[MenuItem]) -> String {
    let mut context = String::from("Menu items:");

    for (i, item) in items.iter().enumerate() {
        context.push_str(&format!("\n{}. [id: {}] {}", i + 1, item.id, item.name));
        if let Some(description) = item.description.as_deref().filter(|d| !d.trim().is_empty()) {
            context.push_str(&format!("\n   Description: {}", description.trim()));
        }
        if !item.ingredients.is_empty() {
            context.push_str(&format!("\n   Ingredients: {}", item.ingredients.join(", ")));
        }
        if let Some(category) = &item.category {
            context.push_str(&format!("\n   Category: {}", category));
        }
    }

    context
}

fn instructions(request: &AnalysisRequest) -> String {
    let mut prompt = String::from(
        "You are a careful dietary assistant helping someone order at a restaurant. \
         Classify every menu item for the diner below. Use SAFE only when the item clearly \
         fits the restrictions, AVOID when it clearly does not, and NEEDS_CLARIFICATION when \
         hidden ingredients or preparation could matter.\n\n",
    );
    prompt.push_str(&dietary_context(&request.dietary_preferences));

    if let Some(context) = request.context.as_deref().filter(|c| !c.trim().is_empty()) {
        prompt.push_str("\n\nAdditional context: ");
        prompt.push_str(context.trim());
    }

    prompt
}

/// Full single-string prompt for a structured item list.
pub fn build_text_prompt(request: &AnalysisRequest) -> String {
    let mut prompt = instructions(request);
    prompt.push_str("\n\n");

    match &request.input {
        MenuInput::Items(items) => prompt.push_str(&item_context(items)),
        MenuInput::Parts(parts) => {
            prompt.push_str("Menu text:");
            for part in parts {
                if let ContentPart::Text { text } = part {
                    prompt.push('\n');
                    prompt.push_str(text);
                }
            }
        }
    }

    prompt.push_str("\n\n");
    prompt.push_str(RESPONSE_FORMAT);
    prompt
}

/// Ordered part list for multimodal vendors: instructions first, then the
/// caller's parts in their original order, then the response format.
pub fn build_multimodal_parts(request: &AnalysisRequest) -> Vec<ContentPart> {
    let mut parts = vec![ContentPart::text(format!(
        "{}\n\nThe menu follows. Identify each dish it shows and classify it; \
         invent short ids like \"item-1\" for dishes without one.",
        instructions(request)
    ))];

    match &request.input {
        MenuInput::Items(items) => parts.push(ContentPart::text(item_context(items))),
        MenuInput::Parts(content) => parts.extend(content.iter().cloned()),
    }

    parts.push(ContentPart::text(RESPONSE_FORMAT));
    parts
}

/// Tiny prompt used by connection tests.
pub fn connection_test_prompt() -> &'static str {
    "Reply with the JSON object {\"success\": true, \"results\": []} and nothing else."
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::DietaryType;

    #[test]
    fn test_dietary_context_includes_custom_restrictions() {
        let prefs = DietaryPreferences::new(DietaryType::Vegetarian).with_restrictions("no mushrooms");
        let context = dietary_context(&prefs);
        assert!(context.contains("vegetarian"));
        assert!(context.contains("no mushrooms"));
    }

    #[test]
    fn test_blank_restrictions_are_ignored() {
        let prefs = DietaryPreferences::new(DietaryType::Keto).with_restrictions("   ");
        assert!(prefs.custom_restrictions.is_none());
        assert!(!dietary_context(&prefs).contains("Additional restrictions"));
    }

    #[test]
    fn test_item_context_lists_ingredients() {
        let items = vec![
            MenuItem::new("1", "Pad Thai").with_ingredients(["rice noodles", "peanuts", "egg"]),
            MenuItem::new("2", "Miso Soup").with_description("Tofu and wakame in dashi"),
        ];
        let context = item_context(&items);
        assert!(context.contains("1. [id: 1] Pad Thai"));
        assert!(context.contains("Ingredients: rice noodles, peanuts, egg"));
        assert!(context.contains("Description: Tofu and wakame in dashi"));
    }

    #[test]
    fn test_multimodal_parts_keep_caller_order() {
        let request = AnalysisRequest::multimodal(
            DietaryPreferences::new(DietaryType::Vegan),
            vec![
                ContentPart::text("Lunch specials"),
                ContentPart::image("image/jpeg", vec![0xff, 0xd8]),
            ],
        );
        let parts = build_multimodal_parts(&request);
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[1], ContentPart::text("Lunch specials"));
        assert!(matches!(parts[2], ContentPart::Image { .. }));
    }
}
