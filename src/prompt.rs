//! Prompts sent to the classifier.

use crate::audit::FilterStrength;

pub const CONTENT_PLACEHOLDER: &str = "{{CONTENT}}";
pub const STRENGTH_PLACEHOLDER: &str = "{{FILTER_STRENGTH}}";

pub const SYSTEM_PROMPT: &str =
    "You are a content analyzer focused on mental health and positivity. Respond only with JSON.";

pub fn strength_description(strength: FilterStrength) -> &'static str {
    match strength {
        FilterStrength::Low => {
            "only filter extremely negative content like hate speech, threats, or severe harassment"
        }
        FilterStrength::Medium => {
            "filter negative content including arguments, complaints, doom scrolling content, or generally pessimistic posts"
        }
        FilterStrength::High => {
            "only allow highly positive, uplifting, educational, or constructive content"
        }
    }
}

/// A non-blank custom prompt has its first `{{CONTENT}}` and first
/// `{{FILTER_STRENGTH}}` substituted; otherwise the built-in prompt is used.
pub fn build_prompt(content: &str, strength: FilterStrength, custom: Option<&str>) -> String {
    match custom.filter(|c| !c.trim().is_empty()) {
        Some(template) => template
            .replacen(CONTENT_PLACEHOLDER, content, 1)
            .replacen(STRENGTH_PLACEHOLDER, strength.as_str(), 1),
        None => builtin_prompt(content, strength),
    }
}

fn builtin_prompt(content: &str, strength: FilterStrength) -> String {
    format!(
        r#"Analyze this social media content for positive mental impact. Filter strength: {strength} - {description}.

Content: "{content}"

Respond with only this JSON format:
{{
  "shouldShow": true/false,
  "score": 1-10,
  "reason": "brief explanation"
}}

Score 1-10 where 10 is most positive mental impact. Use shouldShow: false to filter content based on the {strength} filter strength."#,
        description = strength_description(strength),
    )
}

/// Template offered to users as a starting point for a custom prompt.
pub fn default_prompt_template() -> String {
    format!(
        r#"Analyze this social media content for positive mental impact. Filter strength: {STRENGTH_PLACEHOLDER} - based on the selected filter level.

Content: "{CONTENT_PLACEHOLDER}"

Respond with only this JSON format:
{{
  "shouldShow": true/false,
  "score": 1-10,
  "reason": "brief explanation"
}}

Score 1-10 where 10 is most positive mental impact. Use shouldShow: false to filter content based on the {STRENGTH_PLACEHOLDER} filter strength.

Filter Level Guidelines:
- LOW: {low}
- MEDIUM: {medium}
- HIGH: {high}"#,
        low = strength_description(FilterStrength::Low),
        medium = strength_description(FilterStrength::Medium),
        high = strength_description(FilterStrength::High),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_prompt_embeds_content_and_strength() {
        let p = build_prompt("sunny day", FilterStrength::High, None);
        assert!(p.contains("Content: \"sunny day\""));
        assert!(p.contains("Filter strength: high - only allow highly positive"));
        assert!(p.contains("\"shouldShow\": true/false"));
    }

    #[test]
    fn blank_custom_prompt_is_ignored() {
        let p = build_prompt("x", FilterStrength::Low, Some("   "));
        assert!(p.starts_with("Analyze this social media content"));
    }

    #[test]
    fn custom_prompt_replaces_first_placeholders_only() {
        let t = "Rate {{CONTENT}} at {{FILTER_STRENGTH}}; again {{CONTENT}}";
        let p = build_prompt("hi", FilterStrength::Medium, Some(t));
        assert_eq!(p, "Rate hi at medium; again {{CONTENT}}");
    }

    #[test]
    fn default_template_keeps_placeholders() {
        let t = default_prompt_template();
        assert!(t.contains(CONTENT_PLACEHOLDER));
        assert_eq!(t.matches(STRENGTH_PLACEHOLDER).count(), 2);
        assert!(t.contains("- MEDIUM: filter negative content"));
    }
}
