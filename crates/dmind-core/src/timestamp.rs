//! RFC 3339 timestamps with fixed millisecond precision.
//!
//! Documents are ordered by comparing these strings, so every timestamp
//! written by the workspace uses the same width.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// Current time truncated to the stored millisecond precision
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    Utc.timestamp_millis_opt(now.timestamp_millis()).single().unwrap_or(now)
}

pub fn format(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(ts))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}

/// Same encoding for optional fields; pair with `#[serde(default)]`
pub mod option {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => serializer.serialize_str(&super::format(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => DateTime::parse_from_rfc3339(&raw)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_width() {
        let a = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(format(&a), "2024-01-15T10:30:00.000Z");
    }

    #[test]
    fn test_now_round_trips() {
        let now = now_millis();
        let json = format!("\"{}\"", format(&now));
        let mut de = serde_json::Deserializer::from_str(&json);
        assert_eq!(deserialize(&mut de).unwrap(), now);
    }

    #[test]
    fn test_optional_field() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Row {
            #[serde(default, with = "option", skip_serializing_if = "Option::is_none")]
            at: Option<DateTime<Utc>>,
        }
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let json = serde_json::to_string(&Row { at: Some(at) }).unwrap();
        assert_eq!(json, r#"{"at":"2024-03-01T00:00:00.000Z"}"#);
        assert_eq!(serde_json::from_str::<Row>("{}").unwrap(), Row { at: None });
        assert_eq!(serde_json::from_str::<Row>(&json).unwrap().at, Some(at));
    }
}
