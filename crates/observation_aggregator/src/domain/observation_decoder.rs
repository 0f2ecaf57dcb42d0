use crate::amqp::parse_routing_key;
use crate::domain::{DecodeError, DecodeResult};
use chrono::{DateTime, Utc};
use common::domain::ObservationUpdate;
use serde::Deserialize;
use serde_json::Value;

/// Wire shape of an observation payload.
///
/// Fields stay untyped here so that absence, `null` and wrong types each map to
/// their own rejection instead of a generic deserialization error.
#[derive(Debug, Deserialize)]
struct ObservationPayload {
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default, rename = "type")]
    observation_type: Option<Value>,
}

/// Decode a raw delivery into a validated observation.
///
/// Checks run in a fixed order (routing key, payload document, `value`,
/// `timestamp`, type) and the first failure wins. Pure: no I/O.
pub fn decode_observation(routing_key: &str, payload: &[u8]) -> DecodeResult<ObservationUpdate> {
    let routing_key = parse_routing_key(routing_key)?;

    let document: Value = serde_json::from_slice(payload)
        .map_err(|e| DecodeError::InvalidPayload(e.to_string()))?;
    if !document.is_object() {
        return Err(DecodeError::InvalidPayload(
            "expected a JSON object".to_string(),
        ));
    }
    let payload: ObservationPayload = serde_json::from_value(document)
        .map_err(|e| DecodeError::InvalidPayload(e.to_string()))?;

    let value = match payload.value {
        None | Some(Value::Null) => return Err(DecodeError::MissingField("value")),
        Some(Value::Number(n)) => n.as_f64().ok_or(DecodeError::WrongType("value"))?,
        Some(_) => return Err(DecodeError::WrongType("value")),
    };

    let measured_at = match payload.timestamp {
        None | Some(Value::Null) => return Err(DecodeError::MissingField("timestamp")),
        Some(Value::String(raw)) => parse_timestamp(&raw)?,
        Some(other) => {
            return Err(DecodeError::InvalidTimestamp(format!(
                "expected a string, got {}",
                other
            )))
        }
    };

    let observation_type = match payload.observation_type {
        Some(Value::String(t)) if !t.is_empty() => t,
        None | Some(Value::Null) | Some(Value::String(_)) => routing_key.remainder,
        Some(_) => return Err(DecodeError::WrongType("type")),
    };
    if observation_type.is_empty() {
        return Err(DecodeError::MissingField("type"));
    }

    Ok(ObservationUpdate {
        entity_id: routing_key.entity_id,
        observation_type,
        value,
        measured_at,
    })
}

fn parse_timestamp(raw: &str) -> DecodeResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| DecodeError::InvalidTimestamp(format!("'{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_decode_well_formed_payload() {
        let update = decode_observation(
            "station42.temperature",
            br#"{"value": 21.5, "timestamp": "2023-06-01T12:00:00Z"}"#,
        )
        .unwrap();

        assert_eq!(update.entity_id, "station42");
        assert_eq!(update.observation_type, "temperature");
        assert_eq!(update.value, 21.5);
        assert_eq!(
            update.measured_at,
            Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_integer_value_is_accepted() {
        let update = decode_observation(
            "station42.humidity",
            br#"{"value": 80, "timestamp": "2023-06-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(update.value, 80.0);
    }

    #[test]
    fn test_offset_timestamp_is_normalized_to_utc() {
        let update = decode_observation(
            "station42.temperature",
            br#"{"value": 1.0, "timestamp": "2023-06-01T14:00:00+02:00"}"#,
        )
        .unwrap();
        assert_eq!(
            update.measured_at,
            Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_payload_type_overrides_routing_key() {
        let update = decode_observation(
            "station42.sensors",
            br#"{"value": 3.2, "timestamp": "2023-06-01T12:00:00Z", "type": "wind_speed"}"#,
        )
        .unwrap();
        assert_eq!(update.observation_type, "wind_speed");
    }

    #[test]
    fn test_empty_payload_type_falls_back_to_routing_key() {
        let update = decode_observation(
            "station42.pressure",
            br#"{"value": 1013.0, "timestamp": "2023-06-01T12:00:00Z", "type": ""}"#,
        )
        .unwrap();
        assert_eq!(update.observation_type, "pressure");
    }

    #[test]
    fn test_no_type_anywhere_is_missing_field() {
        let err = decode_observation(
            "station42.",
            br#"{"value": 1.0, "timestamp": "2023-06-01T12:00:00Z"}"#,
        )
        .unwrap_err();
        assert_eq!(err, DecodeError::MissingField("type"));
    }

    #[test]
    fn test_non_string_type_is_wrong_type() {
        let err = decode_observation(
            "station42.temperature",
            br#"{"value": 1.0, "timestamp": "2023-06-01T12:00:00Z", "type": 7}"#,
        )
        .unwrap_err();
        assert_eq!(err, DecodeError::WrongType("type"));
    }

    #[test]
    fn test_malformed_routing_key() {
        let err = decode_observation(
            "bad key",
            br#"{"value": 1.0, "timestamp": "2023-06-01T12:00:00Z"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::MalformedTopic(_)));
    }

    #[test]
    fn test_routing_key_checked_before_payload() {
        let err = decode_observation("bad key", b"not json").unwrap_err();
        assert!(matches!(err, DecodeError::MalformedTopic(_)));
    }

    #[test]
    fn test_invalid_json() {
        let err = decode_observation("station42.temperature", b"{value: ").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidPayload(_)));
    }

    #[test]
    fn test_non_object_document() {
        let err = decode_observation("station42.temperature", b"[21.5]").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidPayload(_)));
    }

    #[test]
    fn test_missing_value() {
        let err = decode_observation(
            "station42.temperature",
            br#"{"timestamp": "2023-06-01T12:00:00Z"}"#,
        )
        .unwrap_err();
        assert_eq!(err, DecodeError::MissingField("value"));
    }

    #[test]
    fn test_null_value() {
        let err = decode_observation(
            "station42.temperature",
            br#"{"value": null, "timestamp": "2023-06-01T12:00:00Z"}"#,
        )
        .unwrap_err();
        assert_eq!(err, DecodeError::MissingField("value"));
    }

    #[test]
    fn test_string_value_is_wrong_type() {
        let err = decode_observation(
            "station42.temperature",
            br#"{"value": "21.5", "timestamp": "2023-06-01T12:00:00Z"}"#,
        )
        .unwrap_err();
        assert_eq!(err, DecodeError::WrongType("value"));
    }

    #[test]
    fn test_missing_timestamp() {
        let err = decode_observation("station42.temperature", br#"{"value": 21.5}"#).unwrap_err();
        assert_eq!(err, DecodeError::MissingField("timestamp"));
    }

    #[test]
    fn test_null_timestamp() {
        let err = decode_observation(
            "station42.temperature",
            br#"{"value": 21.5, "timestamp": null}"#,
        )
        .unwrap_err();
        assert_eq!(err, DecodeError::MissingField("timestamp"));
    }

    #[test]
    fn test_unparseable_timestamp() {
        let err = decode_observation(
            "station42.temperature",
            br#"{"value": 21.5, "timestamp": "yesterday"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidTimestamp(_)));
    }

    #[test]
    fn test_numeric_timestamp_is_invalid() {
        let err = decode_observation(
            "station42.temperature",
            br#"{"value": 21.5, "timestamp": 1685620800}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidTimestamp(_)));
    }

    #[test]
    fn test_value_checked_before_timestamp() {
        let err = decode_observation("station42.temperature", br#"{}"#).unwrap_err();
        assert_eq!(err, DecodeError::MissingField("value"));
    }
}
