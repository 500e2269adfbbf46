//! Pub/sub envelope carried by subscriber queues.
//!
//! A topic delivers `{"Type": "Notification", "Subject": ..., "Message": ...}`
//! to each subscribed queue, with the event JSON as a string in `Message`.
//! Producers that write straight to a queue send the bare event instead, so
//! consumers accept both shapes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// `Type` value of a topic notification.
pub const NOTIFICATION_TYPE: &str = "Notification";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Subject", default)]
    pub subject: String,
    #[serde(rename = "Message")]
    pub message: String,
}

impl Envelope {
    pub fn notification(subject: &str, message: impl Into<String>) -> Self {
        Self {
            kind: NOTIFICATION_TYPE.to_string(),
            subject: subject.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Queue body is not valid JSON: {0}")]
    Body(#[source] serde_json::Error),

    #[error("Event payload is malformed: {0}")]
    Event(#[source] serde_json::Error),
}

/// Decode an event from a queue body, unwrapping the envelope if present.
pub fn decode_event<T: DeserializeOwned>(body: &str) -> Result<T, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(DecodeError::Body)?;

    let wrapped = value
        .get("Message")
        .and_then(|m| m.as_str())
        .filter(|_| value.get("Type").is_some());

    match wrapped {
        Some(inner) => serde_json::from_str(inner).map_err(DecodeError::Event),
        None => serde_json::from_value(value).map_err(DecodeError::Event),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use gas_core::events::{CompletionEvent, COMPLETION_SUBJECT};

    use super::*;

    const RAW: &str =
        r#"{"job_id":"J1","user_id":"u1","user_name":"Ada","user_email":"ada@example.com"}"#;

    #[test]
    fn decodes_bare_event() {
        let event: CompletionEvent = decode_event(RAW).unwrap();
        assert_eq!(event.job_id, "J1");
    }

    #[test]
    fn decodes_enveloped_event() {
        let body =
            serde_json::to_string(&Envelope::notification(COMPLETION_SUBJECT, RAW)).unwrap();
        assert!(body.contains(r#""Type":"Notification""#));

        let event: CompletionEvent = decode_event(&body).unwrap();
        assert_eq!(event.user_email, "ada@example.com");
    }

    #[test]
    fn envelope_with_broken_message_is_an_event_error() {
        let body = r#"{"Type":"Notification","Subject":"x","Message":"{not json"}"#;
        assert_matches!(
            decode_event::<CompletionEvent>(body),
            Err(DecodeError::Event(_))
        );
    }

    #[test]
    fn non_json_body_is_a_body_error() {
        assert_matches!(
            decode_event::<CompletionEvent>("hello"),
            Err(DecodeError::Body(_))
        );
    }
}
