use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of failure kinds a request can end in.
///
/// Every failure observed by the request layer (transport faults, body
/// classification, HTTP status) is mapped into exactly one of these before it
/// reaches a caller. Adding a variant is a breaking change on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The underlying call could not complete at all.
    Transport,
    /// Transport-level protocol fault, e.g. a broken HTTP/2 stream.
    ProtocolError,
    /// The body could not be fully read or parsed and looks cut off.
    IncompleteResponse,
    /// HTTP 401.
    AuthExpired,
    /// HTTP 403.
    Forbidden,
    /// HTTP 404.
    NotFound,
    /// 4xx with a (usually structured) field-error payload.
    Validation,
    /// 5xx or any other non-2xx.
    ServerError,
    /// 2xx whose body is neither JSON nor a plain-text confirmation,
    /// or JSON that does not decode into the expected shape.
    MalformedPayload,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => codes::TRANSPORT,
            ErrorKind::ProtocolError => codes::PROTOCOL_ERROR,
            ErrorKind::IncompleteResponse => codes::INCOMPLETE_RESPONSE,
            ErrorKind::AuthExpired => codes::AUTH_EXPIRED,
            ErrorKind::Forbidden => codes::FORBIDDEN,
            ErrorKind::NotFound => codes::NOT_FOUND,
            ErrorKind::Validation => codes::VALIDATION,
            ErrorKind::ServerError => codes::SERVER_ERROR,
            ErrorKind::MalformedPayload => codes::MALFORMED_PAYLOAD,
        }
    }

    /// Connection-level kinds: nothing trustworthy came back from the server.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            ErrorKind::Transport | ErrorKind::ProtocolError | ErrorKind::IncompleteResponse
        )
    }

    /// Kinds caused by the request itself (4xx family).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ErrorKind::AuthExpired
                | ErrorKind::Forbidden
                | ErrorKind::NotFound
                | ErrorKind::Validation
        )
    }

    /// Map a non-2xx HTTP status onto the taxonomy.
    ///
    /// 401/403/404 have dedicated kinds, the rest of 4xx is `Validation`,
    /// everything else (5xx, 1xx, 3xx that slipped through) is `ServerError`.
    pub fn from_status(status: u16) -> ErrorKind {
        match status {
            401 => ErrorKind::AuthExpired,
            403 => ErrorKind::Forbidden,
            404 => ErrorKind::NotFound,
            400..=499 => ErrorKind::Validation,
            _ => ErrorKind::ServerError,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable codes, stable across releases.
pub mod codes {
    pub const TRANSPORT: &str = "transport";
    pub const PROTOCOL_ERROR: &str = "protocol_error";
    pub const INCOMPLETE_RESPONSE: &str = "incomplete_response";
    pub const AUTH_EXPIRED: &str = "auth_expired";
    pub const FORBIDDEN: &str = "forbidden";
    pub const NOT_FOUND: &str = "not_found";
    pub const VALIDATION: &str = "validation";
    pub const SERVER_ERROR: &str = "server_error";
    pub const MALFORMED_PAYLOAD: &str = "malformed_payload";
}

/// Shown for 403 responses whose body carries nothing a user could act on.
pub const FORBIDDEN_FALLBACK_MESSAGE: &str =
    "You do not have permission to perform this action.";

/// Pull a human-readable message out of an error body.
///
/// Priority: `error`, `message`, `errors` (array joined, map-of-arrays
/// flattened), a bare JSON string, then the raw body text. `None` when none of
/// them carries text; callers then fall back to a generated message.
pub fn extract_error_message(parsed: &Value, raw_body: &str) -> Option<String> {
    if let Some(obj) = parsed.as_object() {
        for key in ["error", "message"] {
            if let Some(text) = obj.get(key).and_then(non_empty_text) {
                return Some(text);
            }
        }
        if let Some(text) = obj.get("errors").and_then(flatten_errors) {
            return Some(text);
        }
    }
    if let Some(text) = non_empty_text(parsed) {
        return Some(text);
    }
    let raw = raw_body.trim();
    if raw.is_empty() || parsed.is_object() || parsed.is_array() {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Message for a non-2xx response, never empty.
pub fn error_message_for_status(status: u16, parsed: &Value, raw_body: &str) -> String {
    match extract_error_message(parsed, raw_body) {
        Some(message) => message,
        None if status == 403 => FORBIDDEN_FALLBACK_MESSAGE.to_string(),
        None => format!("HTTP error! status: {status}"),
    }
}

fn non_empty_text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn flatten_errors(errors: &Value) -> Option<String> {
    let messages: Vec<String> = match errors {
        Value::Array(items) => items.iter().filter_map(message_of).collect(),
        Value::Object(fields) => fields
            .values()
            .flat_map(|v| match v {
                Value::Array(items) => items.iter().filter_map(message_of).collect::<Vec<_>>(),
                other => message_of(other).into_iter().collect(),
            })
            .collect(),
        other => message_of(other).into_iter().collect(),
    };
    if messages.is_empty() {
        None
    } else {
        Some(messages.join("; "))
    }
}

fn message_of(value: &Value) -> Option<String> {
    match value {
        Value::String(_) => non_empty_text(value),
        Value::Object(obj) => obj
            .get("message")
            .or_else(|| obj.get("error"))
            .and_then(non_empty_text),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn status_mapping_matches_taxonomy() {
        assert_eq!(ErrorKind::from_status(401), ErrorKind::AuthExpired);
        assert_eq!(ErrorKind::from_status(403), ErrorKind::Forbidden);
        assert_eq!(ErrorKind::from_status(404), ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_status(400), ErrorKind::Validation);
        assert_eq!(ErrorKind::from_status(409), ErrorKind::Validation);
        assert_eq!(ErrorKind::from_status(422), ErrorKind::Validation);
        assert_eq!(ErrorKind::from_status(500), ErrorKind::ServerError);
        assert_eq!(ErrorKind::from_status(503), ErrorKind::ServerError);
    }

    #[test]
    fn codes_serialize_as_snake_case() {
        assert_eq!(
            serde_json::to_value(ErrorKind::IncompleteResponse).unwrap(),
            json!("incomplete_response")
        );
        assert_eq!(ErrorKind::MalformedPayload.to_string(), "malformed_payload");
    }

    #[test]
    fn error_field_wins_over_message() {
        let body = json!({"error": "Insufficient balance", "message": "ignored"});
        assert_eq!(
            extract_error_message(&body, "").as_deref(),
            Some("Insufficient balance")
        );
    }

    #[test]
    fn errors_array_is_joined() {
        let body = json!({"errors": ["Amount is required", "Bank is required"]});
        assert_eq!(
            extract_error_message(&body, "").as_deref(),
            Some("Amount is required; Bank is required")
        );
    }

    #[test]
    fn errors_map_of_arrays_is_flattened() {
        let body = json!({
            "title": "One or more validation errors occurred.",
            "errors": {
                "Amount": ["Amount must be positive"],
                "BankName": ["Bank is required", "Bank is unknown"]
            }
        });
        assert_eq!(
            extract_error_message(&body, "").as_deref(),
            Some("Amount must be positive; Bank is required; Bank is unknown")
        );
    }

    #[test]
    fn bare_string_body_is_the_message() {
        assert_eq!(
            extract_error_message(&json!("Center not found"), "\"Center not found\"").as_deref(),
            Some("Center not found")
        );
    }

    #[test]
    fn raw_text_used_when_body_is_not_json() {
        assert_eq!(
            extract_error_message(&Value::Null, "Bad Gateway").as_deref(),
            Some("Bad Gateway")
        );
    }

    #[test]
    fn generated_message_when_nothing_useful() {
        assert_eq!(
            error_message_for_status(500, &json!({"traceId": "x"}), "{\"traceId\":\"x\"}"),
            "HTTP error! status: 500"
        );
        assert_eq!(
            error_message_for_status(403, &Value::Null, ""),
            FORBIDDEN_FALLBACK_MESSAGE
        );
    }
}
