use crate::domain::{DecodeError, DecodeResult};
use regex::Regex;
use std::sync::LazyLock;

static ROUTING_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9A-Za-z_]+)\.(.*)$").expect("routing key pattern is valid"));

/// Routing key split into its entity identifier and the remaining suffix
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRoutingKey {
    pub entity_id: String,
    /// Everything after the first dot, may be empty
    pub remainder: String,
}

/// Parse a routing key in the format `{entity_id}.{suffix}`
///
/// # Examples
/// ```
/// use observation_aggregator::amqp::parse_routing_key;
///
/// let parsed = parse_routing_key("station42.temperature").unwrap();
/// assert_eq!(parsed.entity_id, "station42");
/// assert_eq!(parsed.remainder, "temperature");
/// ```
pub fn parse_routing_key(routing_key: &str) -> DecodeResult<ParsedRoutingKey> {
    let captures = ROUTING_KEY
        .captures(routing_key)
        .ok_or_else(|| DecodeError::MalformedTopic(routing_key.to_string()))?;

    let entity_id = captures.get(1).map_or("", |m| m.as_str());
    if entity_id.is_empty() {
        return Err(DecodeError::MalformedTopic(routing_key.to_string()));
    }

    Ok(ParsedRoutingKey {
        entity_id: entity_id.to_string(),
        remainder: captures
            .get(2)
            .map_or(String::new(), |m| m.as_str().to_string()),
    })
}

/// Extract the entity identifier from a routing key
pub fn extract_entity_id(routing_key: &str) -> DecodeResult<String> {
    parse_routing_key(routing_key).map(|parsed| parsed.entity_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_entity_id() {
        assert_eq!(
            extract_entity_id("station42.temperature").unwrap(),
            "station42"
        );
    }

    #[test]
    fn test_extract_entity_id_with_underscores() {
        assert_eq!(
            extract_entity_id("weather_station_01.wind.speed").unwrap(),
            "weather_station_01"
        );
    }

    #[test]
    fn test_trailing_dot_is_accepted() {
        let parsed = parse_routing_key("station42.").unwrap();
        assert_eq!(parsed.entity_id, "station42");
        assert_eq!(parsed.remainder, "");
    }

    #[test]
    fn test_remainder_keeps_nested_segments() {
        let parsed = parse_routing_key("station42.wind.speed").unwrap();
        assert_eq!(parsed.remainder, "wind.speed");
    }

    #[test]
    fn test_key_with_space_is_malformed() {
        assert_eq!(
            extract_entity_id("bad key"),
            Err(DecodeError::MalformedTopic("bad key".to_string()))
        );
    }

    #[test]
    fn test_key_without_dot_is_malformed() {
        assert!(extract_entity_id("station42").is_err());
    }

    #[test]
    fn test_empty_entity_is_malformed() {
        assert!(extract_entity_id(".temperature").is_err());
    }

    #[test]
    fn test_non_word_entity_is_malformed() {
        assert!(extract_entity_id("station-42.temperature").is_err());
    }

    #[test]
    fn test_non_ascii_entity_is_malformed() {
        assert_eq!(
            extract_entity_id("stätion42.temperature"),
            Err(DecodeError::MalformedTopic("stätion42.temperature".to_string()))
        );
        assert!(extract_entity_id("станция.temperature").is_err());
        assert!(extract_entity_id("station٤٢.temperature").is_err());
    }

    #[test]
    fn test_empty_key_is_malformed() {
        assert!(extract_entity_id("").is_err());
    }
}
