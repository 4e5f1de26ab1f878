use crate::provider::{ModelError, ModelResult};
use serde::de::DeserializeOwned;

/// Extract a JSON object embedded in free-form model output.
///
/// Models asked for "strictly JSON" still wrap the object in prose or code
/// fences often enough that a plain parse fails; the slice from the first
/// `{` to the last `}` is what gets deserialized.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> ModelResult<T> {
    let start = text.find('{').ok_or_else(|| ModelError::Unknown {
        message: "No JSON object found in model output".to_string(),
    })?;
    let end = text.rfind('}').ok_or_else(|| ModelError::Unknown {
        message: "No JSON object found in model output".to_string(),
    })?;

    if end < start {
        return Err(ModelError::Unknown {
            message: "No JSON object found in model output".to_string(),
        });
    }

    Ok(serde_json::from_str(&text[start..=end])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn test_plain_json() {
        let parsed: Sample = extract_json(r#"{"name": "digest", "count": 3}"#).unwrap();
        assert_eq!(parsed.name, "digest");
        assert_eq!(parsed.count, 3);
    }

    #[test]
    fn test_json_wrapped_in_prose() {
        let text = "Here is the result:\n```json\n{\"name\": \"x\", \"count\": 1}\n```\nDone.";
        let parsed: Sample = extract_json(text).unwrap();
        assert_eq!(parsed, Sample { name: "x".to_string(), count: 1 });
    }

    #[test]
    fn test_no_json() {
        let result: ModelResult<Sample> = extract_json("no object here");
        assert!(result.is_err());
    }

    #[test]
    fn test_braces_out_of_order() {
        let result: ModelResult<Sample> = extract_json("} nothing {");
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_json() {
        let result: ModelResult<Sample> = extract_json("{\"name\": }");
        assert!(result.is_err());
    }
}
