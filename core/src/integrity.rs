//! Response body classification.
//!
//! The server answers with JSON, an empty body, or sometimes a plain sentence
//! ("Withdrawal request submitted."). A body that stopped mid-stream is the
//! case worth detecting: for writes it means the server may have committed
//! even though the client never saw the full answer.

use serde_json::Value;

/// What a response body turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum Integrity {
    /// Parsed JSON (`Value::Null` for an empty 2xx body).
    WellFormedJson(Value),
    /// A 2xx human-readable confirmation instead of JSON.
    PlainTextSuccess(String),
    /// A 2xx body that looks cut off.
    Truncated,
    /// Not JSON and not one of the above: an error body outside 2xx, or a
    /// malformed 2xx payload that still ends on a closing brace/bracket.
    RawText(String),
}

pub fn is_success_status(status: u16) -> bool {
    (200..=299).contains(&status)
}

/// Classify a body. Pure: the same input always gives the same answer.
pub fn classify(status: u16, body: &str) -> Integrity {
    let success = is_success_status(status);
    if success && body.trim().is_empty() {
        return Integrity::WellFormedJson(Value::Null);
    }

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Integrity::WellFormedJson(value);
    }

    if !success {
        // Error bodies are plain text often enough that a cut-off guess would be noise.
        return Integrity::RawText(body.to_string());
    }

    let trimmed = body.trim();
    if looks_like_sentence(trimmed) {
        return Integrity::PlainTextSuccess(trimmed.to_string());
    }
    if !trimmed.ends_with('}') && !trimmed.ends_with(']') {
        return Integrity::Truncated;
    }
    Integrity::RawText(body.to_string())
}

fn looks_like_sentence(trimmed: &str) -> bool {
    trimmed.ends_with(['.', '!', '?']) && !trimmed.contains(['{', '['])
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_success_body_is_null_json() {
        assert_eq!(classify(204, ""), Integrity::WellFormedJson(Value::Null));
        assert_eq!(classify(200, "  \n"), Integrity::WellFormedJson(Value::Null));
    }

    #[test]
    fn valid_json_is_well_formed_for_any_status() {
        assert_eq!(
            classify(200, r#"{"id": 5}"#),
            Integrity::WellFormedJson(json!({"id": 5}))
        );
        assert_eq!(
            classify(422, r#"{"error": "bad"}"#),
            Integrity::WellFormedJson(json!({"error": "bad"}))
        );
    }

    #[test]
    fn missing_closing_brace_is_truncated() {
        assert_eq!(classify(200, r#"{"id": 5, "name": "Widget""#), Integrity::Truncated);
        assert_eq!(classify(201, r#"[{"id": 1}, {"id""#), Integrity::Truncated);
    }

    #[test]
    fn sentence_is_plain_text_success() {
        assert_eq!(
            classify(200, "Operation completed successfully.\n"),
            Integrity::PlainTextSuccess("Operation completed successfully.".to_string())
        );
        assert_eq!(
            classify(200, "Done!"),
            Integrity::PlainTextSuccess("Done!".to_string())
        );
    }

    #[test]
    fn sentence_with_braces_is_not_plain_text() {
        assert_eq!(classify(200, r#"{"msg": "saved."#), Integrity::Truncated);
    }

    #[test]
    fn unpunctuated_text_is_treated_as_truncated() {
        assert_eq!(classify(200, "Operation completed"), Integrity::Truncated);
    }

    #[test]
    fn broken_json_ending_on_brace_is_raw_text() {
        assert_eq!(
            classify(200, "{id: 5}"),
            Integrity::RawText("{id: 5}".to_string())
        );
    }

    #[test]
    fn error_text_is_never_truncated() {
        assert_eq!(
            classify(502, "Bad Gateway"),
            Integrity::RawText("Bad Gateway".to_string())
        );
        assert_eq!(
            classify(500, r#"{"error": "boom"#),
            Integrity::RawText(r#"{"error": "boom"#.to_string())
        );
        assert_eq!(classify(404, ""), Integrity::RawText(String::new()));
    }

    #[test]
    fn classification_is_deterministic() {
        let body = r#"{"id": 5, "name": "Widget""#;
        assert_eq!(classify(200, body), classify(200, body));
    }
}
