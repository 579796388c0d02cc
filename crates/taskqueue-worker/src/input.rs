//! JSON-lines submission format read from stdin

use serde::Deserialize;
use taskqueue::SubmitOptions;

/// One submission request, e.g.
/// `{"task_type": "sum", "payload": {"a": 2, "b": 3}, "max_retries": 1}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubmitLine {
    pub task_type: String,
    #[serde(default = "empty_payload")]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

fn empty_payload() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl SubmitLine {
    /// Parse one input line; blank lines and `#` comments yield `None`
    pub fn parse(line: &str) -> serde_json::Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        serde_json::from_str(line).map(Some)
    }

    pub fn options(&self) -> SubmitOptions {
        let mut options = SubmitOptions::new();
        if let Some(id) = &self.id {
            options = options.with_id(id.clone());
        }
        if let Some(max_retries) = self.max_retries {
            options = options.with_max_retries(max_retries);
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_line() {
        let line = r#"{"task_type": "sum", "payload": {"a": 1}, "id": "t1", "max_retries": 0}"#;
        let parsed = SubmitLine::parse(line).unwrap().unwrap();

        assert_eq!(parsed.task_type, "sum");
        assert_eq!(parsed.payload, json!({"a": 1}));
        assert_eq!(
            parsed.options(),
            SubmitOptions::new().with_id("t1").with_max_retries(0)
        );
    }

    #[test]
    fn test_parse_minimal_line() {
        let parsed = SubmitLine::parse(r#"{"task_type": "echo"}"#)
            .unwrap()
            .unwrap();

        assert_eq!(parsed.payload, json!({}));
        assert_eq!(parsed.options(), SubmitOptions::default());
    }

    #[test]
    fn test_skips_blank_and_comment_lines() {
        assert_eq!(SubmitLine::parse("   ").unwrap(), None);
        assert_eq!(SubmitLine::parse("# warm-up batch").unwrap(), None);
    }

    #[test]
    fn test_rejects_malformed_line() {
        assert!(SubmitLine::parse("{not json").is_err());
        assert!(SubmitLine::parse(r#"{"payload": {}}"#).is_err());
    }
}
