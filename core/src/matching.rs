//! Deciding whether a record in a collection is the write we lost track of.
//!
//! Without an idempotency key the best available evidence is "a record of the
//! same shape appeared around the time we submitted". A record matches iff
//! its creation time is inside the window AND every comparison field is
//! equal (numbers within an epsilon).

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::fields::{as_number, collection_items, lookup, parse_timestamp};
use crate::outcome::{ComparisonField, FieldValue, MatchResult, MutationHint};

pub const DEFAULT_EPSILON: f64 = 0.01;

/// Inclusive time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// `[submitted_at - lookbehind, submitted_at + lookahead]`.
    pub fn around(submitted_at: DateTime<Utc>, lookbehind: Duration, lookahead: Duration) -> Self {
        Self {
            start: submitted_at - lookbehind,
            end: submitted_at + lookahead,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }
}

/// Equality predicate over a hint's comparison fields plus a time window.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchPredicate {
    pub window: TimeWindow,
    pub fields: Vec<ComparisonField>,
    pub timestamp_field: String,
    pub epsilon: f64,
}

impl MatchPredicate {
    pub fn new(hint: &MutationHint, window: TimeWindow, epsilon: f64) -> Self {
        Self {
            window,
            fields: hint.fields.clone(),
            timestamp_field: hint.timestamp_field_name().to_string(),
            epsilon,
        }
    }

    pub fn matches(&self, record: &Value) -> bool {
        let Some(created_at) = lookup(record, &self.timestamp_field).and_then(parse_timestamp)
        else {
            return false;
        };
        if !self.window.contains(created_at) {
            return false;
        }
        self.fields.iter().all(|field| {
            lookup(record, &field.name)
                .is_some_and(|actual| field_equals(&field.value, actual, self.epsilon))
        })
    }

    /// First matching record of a collection response, in server order.
    pub fn first_match(&self, collection: &Value) -> MatchResult {
        collection_items(collection)
            .iter()
            .find(|record| self.matches(record))
            .map(|record| MatchResult::Confirmed {
                record: record.clone(),
            })
            .unwrap_or(MatchResult::Unconfirmed)
    }
}

fn field_equals(expected: &FieldValue, actual: &Value, epsilon: f64) -> bool {
    match expected {
        FieldValue::Number(n) => as_number(actual).is_some_and(|a| (a - n).abs() <= epsilon),
        FieldValue::Text(s) => match actual {
            Value::String(a) => a == s,
            Value::Number(a) => a.to_string() == *s,
            _ => false,
        },
        FieldValue::Bool(b) => actual.as_bool() == Some(*b),
    }
}
