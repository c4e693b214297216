//! Boundary normalization for loosely-shaped server records.
//!
//! The backend is not consistent about key spelling (`createdAt`,
//! `CreatedAt` and `created_at` all occur) or about how it wraps
//! collections. Everything here turns those shapes into one canonical view
//! so the rest of the layer never has to guess.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

/// Keys under which list endpoints wrap their items.
const COLLECTION_KEYS: [&str; 5] = ["data", "items", "results", "records", "$values"];

/// Spellings tried for a logical field name, original first.
pub fn field_variants(name: &str) -> Vec<String> {
    let words = split_words(name);
    let mut variants = vec![name.to_string()];
    if words.is_empty() {
        return variants;
    }

    let pascal: String = words.iter().map(|w| capitalize(w)).collect();
    let camel = {
        let mut s = words[0].clone();
        s.extend(words[1..].iter().map(|w| capitalize(w)));
        s
    };
    let snake = words.join("_");

    for candidate in [camel, pascal, snake] {
        if !variants.contains(&candidate) {
            variants.push(candidate);
        }
    }
    variants
}

/// Look a field up on a JSON object under any of its spellings.
pub fn lookup<'a>(record: &'a Value, name: &str) -> Option<&'a Value> {
    let obj = record.as_object()?;
    field_variants(name)
        .iter()
        .find_map(|variant| obj.get(variant.as_str()))
}

/// Items of a collection response: a bare array, or an array under one of the
/// usual wrapper keys (one level of nesting, e.g. `{"data": {"items": [...]}}`).
pub fn collection_items(value: &Value) -> &[Value] {
    fn unwrap_once(value: &Value) -> Option<&Value> {
        let obj = value.as_object()?;
        COLLECTION_KEYS.iter().find_map(|key| obj.get(*key))
    }

    if let Value::Array(items) = value {
        return items;
    }
    let Some(inner) = unwrap_once(value) else {
        return &[];
    };
    if let Value::Array(items) = inner {
        return items;
    }
    match unwrap_once(inner) {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}

/// Numeric view of a field; numeric strings count.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Timestamp view of a field: RFC 3339, naive ISO-8601 (taken as UTC), or
/// epoch milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Some(ts.with_timezone(&Utc));
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

/// Rewrite every object key into camelCase, recursively.
///
/// This is the decode step between the wire and canonical record types, which
/// all use `#[serde(rename_all = "camelCase")]`.
pub fn canonicalize_keys(value: Value) -> Value {
    match value {
        Value::Object(obj) => {
            let mut out = Map::with_capacity(obj.len());
            let (canonical, aliases): (Vec<_>, Vec<_>) = obj
                .into_iter()
                .map(|(key, inner)| {
                    let target = if key.starts_with('$') {
                        key.clone()
                    } else {
                        camel_case(&key)
                    };
                    (key == target, target, inner)
                })
                .partition(|(is_canonical, _, _)| *is_canonical);
            // Keys already in canonical form go in first; aliases only fill gaps.
            for (_, key, inner) in canonical.into_iter().chain(aliases) {
                out.entry(key).or_insert_with(|| canonicalize_keys(inner));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize_keys).collect()),
        other => other,
    }
}

fn camel_case(name: &str) -> String {
    let words = split_words(name);
    if words.is_empty() {
        return name.to_string();
    }
    let mut s = words[0].clone();
    s.extend(words[1..].iter().map(|w| capitalize(w)));
    s
}

/// Split `createdAt`, `CreatedAt`, `created_at`, `created-at` and `UserID`
/// into lowercase words.
fn split_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = name.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || c == ' ' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev_lower = chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit();
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let prev_upper = chars[i - 1].is_uppercase();
            if prev_lower || (prev_upper && next_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn variants_cover_all_three_spellings() {
        assert_eq!(
            field_variants("createdAt"),
            vec!["createdAt", "CreatedAt", "created_at"]
        );
        assert_eq!(
            field_variants("bank_name"),
            vec!["bank_name", "bankName", "BankName"]
        );
        assert_eq!(field_variants("amount"), vec!["amount", "Amount"]);
    }

    #[test]
    fn acronyms_split_sensibly() {
        assert_eq!(split_words("UserID"), vec!["user", "id"]);
        assert_eq!(split_words("HTTPStatus"), vec!["http", "status"]);
    }

    #[test]
    fn lookup_finds_pascal_case_key() {
        let record = json!({"Amount": 500000, "CreatedAt": "2024-05-01T10:00:00Z"});
        assert_eq!(lookup(&record, "amount"), Some(&json!(500000)));
        assert!(lookup(&record, "createdAt").is_some());
        assert!(lookup(&record, "bank").is_none());
    }

    #[test]
    fn collections_unwrap_common_wrappers() {
        assert_eq!(collection_items(&json!([1, 2])).len(), 2);
        assert_eq!(collection_items(&json!({"data": [1]})).len(), 1);
        assert_eq!(collection_items(&json!({"$values": [1, 2, 3]})).len(), 3);
        assert_eq!(
            collection_items(&json!({"data": {"items": [1, 2]}, "total": 2})).len(),
            2
        );
        assert!(collection_items(&json!({"total": 0})).is_empty());
        assert!(collection_items(&Value::Null).is_empty());
    }

    #[test]
    fn timestamps_accept_several_encodings() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp(&json!("2024-05-01T10:00:00Z")), Some(expected));
        assert_eq!(parse_timestamp(&json!("2024-05-01T17:00:00+07:00")), Some(expected));
        assert_eq!(parse_timestamp(&json!("2024-05-01T10:00:00.000")), Some(expected));
        assert_eq!(
            parse_timestamp(&json!(expected.timestamp_millis())),
            Some(expected)
        );
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
    }

    #[test]
    fn numeric_strings_are_numbers() {
        assert_eq!(as_number(&json!("500000")), Some(500000.0));
        assert_eq!(as_number(&json!(12.5)), Some(12.5));
        assert_eq!(as_number(&json!(true)), None);
    }

    #[test]
    fn canonicalize_rewrites_pascal_case_recursively() {
        let raw = json!({
            "Id": 7,
            "TutorName": "Lan",
            "Sessions": [{"StartTime": "x"}],
            "$id": "1"
        });
        assert_eq!(
            canonicalize_keys(raw),
            json!({
                "id": 7,
                "tutorName": "Lan",
                "sessions": [{"startTime": "x"}],
                "$id": "1"
            })
        );
    }

    #[test]
    fn canonical_key_wins_over_alias() {
        assert_eq!(canonicalize_keys(json!({"Id": 1, "id": 2})), json!({"id": 2}));
        assert_eq!(
            canonicalize_keys(json!({"created_at": "a", "CreatedAt": "b", "createdAt": "c"})),
            json!({"createdAt": "c"})
        );
    }
}
