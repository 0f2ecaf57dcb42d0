use bytes::Bytes;

/// Request type for handling a single AMQP delivery through Tower.
///
/// Owns the delivery data so it can pass through middleware layers without
/// borrowing from the broker client. Settling the delivery stays with the consumer.
#[derive(Debug, Clone)]
pub struct ConsumeRequest {
    /// Routing key the message was published with
    pub routing_key: String,
    pub payload: Bytes,
    /// Whether the broker has delivered this message before
    pub redelivered: bool,
}

impl ConsumeRequest {
    pub fn new(routing_key: String, payload: Bytes, redelivered: bool) -> Self {
        Self {
            routing_key,
            payload,
            redelivered,
        }
    }
}

/// Response type for delivery handling.
///
/// Tells the consumer how to settle the delivery once handling is complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeResponse {
    /// Delivery was fully handled - acknowledge it
    Ack,
    /// Delivery was rejected - negatively acknowledge it
    Nack(Option<String>),
}

impl ConsumeResponse {
    pub fn ack() -> Self {
        Self::Ack
    }

    pub fn nack(reason: impl Into<String>) -> Self {
        Self::Nack(Some(reason.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_request_new() {
        let req = ConsumeRequest::new(
            "station42.temperature".to_string(),
            Bytes::from("payload"),
            false,
        );

        assert_eq!(req.routing_key, "station42.temperature");
        assert_eq!(req.payload, Bytes::from("payload"));
        assert!(!req.redelivered);
    }

    #[test]
    fn test_consume_response_nack_keeps_reason() {
        let resp = ConsumeResponse::nack("missing field: value");
        assert_eq!(
            resp,
            ConsumeResponse::Nack(Some("missing field: value".to_string()))
        );
    }
}
