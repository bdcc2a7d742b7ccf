//! Untrusted-JSON handling for language-model responses.

use serde::de::DeserializeOwned;

use crate::error::{MlError, MlResult};

/// Strip optional markdown code fences around a JSON payload.
pub(crate) fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}

/// Parse a fenced-or-bare JSON payload into the declared shape.
pub(crate) fn parse_shaped<T: DeserializeOwned>(text: &str) -> MlResult<T> {
    let stripped = strip_code_fences(text);
    serde_json::from_str(stripped).map_err(|e| {
        MlError::invalid(format!(
            "response violated expected JSON shape: {} (preview: {})",
            e,
            stripped.chars().take(200).collect::<String>()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct Shape {
        value: u32,
    }

    #[test]
    fn test_strip_json_fence() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn test_parse_shaped() {
        let parsed: Shape = parse_shaped("```json\n{\"value\": 7}\n```").unwrap();
        assert_eq!(parsed, Shape { value: 7 });

        // Missing required key is a shape violation
        let err = parse_shaped::<Shape>("{\"other\": 7}").unwrap_err();
        assert!(matches!(err, MlError::InvalidResponse(_)));
    }
}
