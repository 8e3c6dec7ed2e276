//! Tolerant extraction of a verdict from free-form model output.
//!
//! Never fails: anything undecodable degrades to a permissive verdict.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::audit::Verdict;

pub const FALLBACK_SCORE: f64 = 5.0;
pub const FALLBACK_REASON: &str = "parse failure";

static NEGATIVE_SHOW_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)"?shouldshow"?\s*:\s*false"#).expect("valid marker regex"));

/// Loose shape accepted from the model. The show flag is the one required field;
/// an object without it is not a verdict.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVerdict {
    #[serde(alias = "should_show")]
    should_show: bool,
    #[serde(default)]
    score: Option<serde_json::Value>,
    #[serde(default)]
    reason: Option<String>,
}

impl From<RawVerdict> for Verdict {
    fn from(raw: RawVerdict) -> Self {
        let score = raw.score.and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });
        Verdict {
            should_show: raw.should_show,
            score,
            reason: raw.reason.unwrap_or_default(),
        }
    }
}

pub fn parse(raw: &str) -> Verdict {
    first_json_object(raw)
        .and_then(|obj| serde_json::from_str::<RawVerdict>(obj).ok())
        .map(Verdict::from)
        .unwrap_or_else(|| fallback(raw))
}

fn fallback(raw: &str) -> Verdict {
    Verdict::new(
        !NEGATIVE_SHOW_MARKER.is_match(raw),
        FALLBACK_SCORE,
        FALLBACK_REASON,
    )
}

/// First balanced `{...}` span, ignoring braces inside JSON strings.
fn first_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in s[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_embedded_object() {
        let v = parse(r#"blah {"shouldShow":false,"score":2,"reason":"bad"} blah"#);
        assert_eq!(v, Verdict::new(false, 2.0, "bad"));
    }

    #[test]
    fn no_json_is_permissive() {
        assert_eq!(parse("no json here"), Verdict::new(true, 5.0, "parse failure"));
    }

    #[test]
    fn marker_flips_fallback() {
        let v = parse(r#"I'd say "shouldShow": FALSE because { it is rude"#);
        assert!(!v.should_show);
        assert_eq!(v.reason, FALLBACK_REASON);
    }

    #[test]
    fn fenced_multiline_output() {
        let raw = "```json\n{\n  \"shouldShow\": true,\n  \"score\": 8,\n  \"reason\": \"kind {words}\"\n}\n```\nextra {}";
        let v = parse(raw);
        assert_eq!(v, Verdict::new(true, 8.0, "kind {words}"));
    }

    #[test]
    fn malformed_object_falls_back() {
        let v = parse(r#"{"shouldShow": false, "score": }"#);
        assert!(!v.should_show);
        assert_eq!(v.score, Some(FALLBACK_SCORE));
    }

    #[test]
    fn unbalanced_braces_fall_back() {
        assert_eq!(parse("{{{"), Verdict::new(true, 5.0, "parse failure"));
    }

    #[test]
    fn partial_object_keeps_what_it_has() {
        let v = parse(r#"{"shouldShow": true, "score": "3"}"#);
        assert!(v.should_show);
        assert_eq!(v.score, Some(3.0));
        assert_eq!(v.reason, "");
    }

    #[test]
    fn object_without_show_flag_falls_back() {
        let fallback = Verdict::new(true, FALLBACK_SCORE, FALLBACK_REASON);
        assert_eq!(parse("{}"), fallback);
        assert_eq!(
            parse(r#"Here is an example {"note": "n/a"} and nothing else"#),
            fallback
        );
        assert_eq!(parse(r#"{"score": 9, "reason": "nice"}"#), fallback);
    }
}
