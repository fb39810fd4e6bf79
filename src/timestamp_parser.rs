use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Parses the timestamp shapes found in conversation logs
pub struct TimestampParser;

impl TimestampParser {
    /// Parse an ISO-8601 timestamp string into a DateTime<Utc>
    /// Accepts a Z suffix, an explicit offset, or a naive time assumed to be UTC
    pub fn parse(timestamp_str: &str) -> Result<DateTime<Utc>> {
        let trimmed = timestamp_str.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(dt.with_timezone(&Utc));
        }

        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
        }

        anyhow::bail!("Failed to parse timestamp: {}", timestamp_str)
    }

    /// Read a timestamp from a JSON value: strings are parsed as ISO-8601,
    /// integers are epoch milliseconds. Anything else has no timestamp.
    pub fn from_value(value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::String(s) => Self::parse(s).ok(),
            Value::Number(n) => n
                .as_i64()
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_z_suffix() {
        let dt = TimestampParser::parse("2024-01-01T12:00:00.000Z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-01-01T12:00:00+00:00");
    }

    #[test]
    fn test_parse_offset_normalizes_to_utc() {
        let dt = TimestampParser::parse("2024-01-01T14:00:00+02:00").unwrap();
        assert_eq!(dt, TimestampParser::parse("2024-01-01T12:00:00Z").unwrap());
    }

    #[test]
    fn test_parse_naive() {
        assert!(TimestampParser::parse("2024-01-01T12:00:00.000").is_ok());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(TimestampParser::parse("invalid").is_err());
    }

    #[test]
    fn test_from_value() {
        assert!(TimestampParser::from_value(&json!("2024-01-01T12:00:00Z")).is_some());
        assert_eq!(
            TimestampParser::from_value(&json!(1_704_110_400_000i64)),
            Some(TimestampParser::parse("2024-01-01T12:00:00Z").unwrap())
        );
        assert!(TimestampParser::from_value(&json!(null)).is_none());
        assert!(TimestampParser::from_value(&json!("yesterday")).is_none());
    }
}
