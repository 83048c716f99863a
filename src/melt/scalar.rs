//! Serialization of terminal attribute values into row cells.

use crate::error::{MeltError, Result};
use crate::schema::types::TerminalKind;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

// Microsoft JSON dates, e.g. "/Date(1573755038314+0000)/"
static MS_DATE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/Date\((?P<millis>-?\d+)(?P<offset>[+-]\d{4})?\)/$").expect("valid date pattern")
});

/// Convert a terminal value into the value stored in the row
///
/// Date and datetime values in Microsoft JSON form are rewritten to ISO 8601
/// (UTC); anything else passes through unchanged. Objects and arrays are not
/// terminal values and indicate a schema out of sync with the payload.
pub fn serialize_scalar(kind: TerminalKind, value: &Value, column: &str) -> Result<Value> {
    match value {
        Value::Object(_) | Value::Array(_) => Err(MeltError::unsupported(
            format!("{:?}", kind).to_lowercase(),
            format!("column `{}` holds a nested value where a scalar was declared", column),
        )),
        Value::String(s) => Ok(match kind {
            TerminalKind::Date => Value::String(parse_ms_date(s).map_or_else(|| s.clone(), |d| d.format("%Y-%m-%d").to_string())),
            TerminalKind::DateTime => Value::String(
                parse_ms_date(s).map_or_else(|| s.clone(), |d| d.format("%Y-%m-%dT%H:%M:%S").to_string()),
            ),
            _ => value.clone(),
        }),
        _ => Ok(value.clone()),
    }
}

fn parse_ms_date(s: &str) -> Option<DateTime<Utc>> {
    let captures = MS_DATE_REGEX.captures(s)?;
    let millis: i64 = captures["millis"].parse().ok()?;
    DateTime::from_timestamp_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ms_dates() {
        let value = json!("/Date(1573755038314+0000)/");
        assert_eq!(
            serialize_scalar(TerminalKind::DateTime, &value, "UpdatedDateUTC").unwrap(),
            json!("2019-11-14T18:10:38")
        );
        assert_eq!(
            serialize_scalar(TerminalKind::Date, &value, "Date").unwrap(),
            json!("2019-11-14")
        );
    }

    #[test]
    fn test_iso_dates_pass_through() {
        let value = json!("2024-03-01T00:00:00");
        assert_eq!(serialize_scalar(TerminalKind::DateTime, &value, "Date").unwrap(), value);
    }

    #[test]
    fn test_scalars_pass_through() {
        assert_eq!(serialize_scalar(TerminalKind::Float, &json!(9.99), "Amount").unwrap(), json!(9.99));
        assert_eq!(serialize_scalar(TerminalKind::Boolean, &json!(true), "IsDiscounted").unwrap(), json!(true));
        assert_eq!(serialize_scalar(TerminalKind::String, &json!("BANK"), "Type").unwrap(), json!("BANK"));
    }

    #[test]
    fn test_nested_value_rejected() {
        let err = serialize_scalar(TerminalKind::String, &json!({"a": 1}), "Name").unwrap_err();
        assert!(matches!(err, MeltError::UnsupportedType { .. }));
    }
}
