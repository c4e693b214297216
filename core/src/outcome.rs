use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorKind;

/// Shown to the user when an ambiguous write could not be confirmed.
pub const UNCONFIRMED_MESSAGE: &str =
    "The request may or may not have gone through. Please check your history before trying again.";

/// Tri-state result of one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success { data: T },
    Failure(Failure),
    /// Only produced for requests carrying a [`MutationHint`].
    Ambiguous(Ambiguity),
}

impl<T> Outcome<T> {
    pub fn success(data: T) -> Self {
        Outcome::Success { data }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Outcome::Failure(Failure::new(kind, message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Outcome::Ambiguous(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Outcome::Failure(failure) => Some(failure.kind),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success { data } => Outcome::Success { data: f(data) },
            Outcome::Failure(failure) => Outcome::Failure(failure),
            Outcome::Ambiguous(ambiguity) => Outcome::Ambiguous(ambiguity),
        }
    }

    pub fn data(self) -> Option<T> {
        match self {
            Outcome::Success { data } => Some(data),
            _ => None,
        }
    }
}

/// A classified failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
    /// Parsed error body, when the server sent one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// HTTP status, absent for connection-level failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl Failure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            status: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        if !details.is_null() {
            self.details = Some(details);
        }
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Field-level messages of a validation failure (`errors` map in the body).
    ///
    /// Array-shaped `errors` carry no field names and yield an empty map.
    pub fn field_errors(&self) -> BTreeMap<String, Vec<String>> {
        let mut out = BTreeMap::new();
        if self.kind != ErrorKind::Validation {
            return out;
        }
        let Some(errors) = self
            .details
            .as_ref()
            .and_then(|d| d.get("errors"))
            .and_then(Value::as_object)
        else {
            return out;
        };
        for (field, messages) in errors {
            let messages: Vec<String> = match messages {
                Value::Array(items) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                Value::String(s) => vec![s.clone()],
                _ => Vec::new(),
            };
            if !messages.is_empty() {
                out.insert(field.clone(), messages);
            }
        }
        out
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// A write whose effect on the server is unknown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ambiguity {
    /// Whatever part of the body did arrive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_body: Option<String>,
    pub hint: MutationHint,
    /// When the request was handed to the transport.
    pub submitted_at: DateTime<Utc>,
}

/// Caller-supplied description of a write, used to find it again later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationHint {
    /// Resource class, e.g. `withdrawal`.
    pub resource: String,
    pub fields: Vec<ComparisonField>,
    /// Record field holding the creation time; `createdAt` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_field: Option<String>,
}

pub const DEFAULT_TIMESTAMP_FIELD: &str = "createdAt";

impl MutationHint {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            fields: Vec::new(),
            timestamp_field: None,
        }
    }

    pub fn number(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.push(ComparisonField {
            name: name.into(),
            value: FieldValue::Number(value),
        });
        self
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(ComparisonField {
            name: name.into(),
            value: FieldValue::Text(value.into()),
        });
        self
    }

    pub fn flag(mut self, name: impl Into<String>, value: bool) -> Self {
        self.fields.push(ComparisonField {
            name: name.into(),
            value: FieldValue::Bool(value),
        });
        self
    }

    pub fn timestamp_field(mut self, name: impl Into<String>) -> Self {
        self.timestamp_field = Some(name.into());
        self
    }

    pub fn timestamp_field_name(&self) -> &str {
        self.timestamp_field
            .as_deref()
            .unwrap_or(DEFAULT_TIMESTAMP_FIELD)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonField {
    pub name: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Interpret a CLI-style `key=value` right-hand side.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed {
            "true" => FieldValue::Bool(true),
            "false" => FieldValue::Bool(false),
            _ => match trimmed.parse::<f64>() {
                Ok(n) if n.is_finite() => FieldValue::Number(n),
                _ => FieldValue::Text(raw.to_string()),
            },
        }
    }
}

/// Verdict of a reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Confirmed { record: Value },
    Unconfirmed,
}

impl MatchResult {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, MatchResult::Confirmed { .. })
    }
}
