use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::Timestamp;

/// Upper bound on message bodies accepted by the send endpoint.
pub const MAX_MESSAGE_LENGTH: usize = 4_000;

/// A persisted message, as returned to the sender after a successful send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Message {
    /// Projection used for conversation history and live pushes.
    #[must_use]
    pub fn view(&self) -> MessageView {
        MessageView {
            id: self.id,
            body: self.body.clone(),
            sender_id: self.sender_id,
            created_at: self.created_at,
        }
    }
}

/// Compact message shape pushed over the socket and listed in history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub body: String,
    pub sender_id: Uuid,
    pub created_at: Timestamp,
}

impl From<&Message> for MessageView {
    fn from(message: &Message) -> Self {
        message.view()
    }
}

/// Body of `POST /api/messages/send/{receiver_id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SendMessageRequest {
    #[serde(alias = "content", alias = "body")]
    pub message: String,
}

impl SendMessageRequest {
    /// Checks the body is present and within bounds.
    ///
    /// # Errors
    /// Returns a human readable reason when the message cannot be sent.
    pub fn validate(&self) -> Result<(), String> {
        if self.message.trim().is_empty() {
            return Err("message cannot be empty".to_string());
        }
        if self.message.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(format!(
                "message exceeds {MAX_MESSAGE_LENGTH} characters"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn sample() -> Message {
        let at = Timestamp(Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap());
        Message {
            id: Uuid::from_u128(10),
            conversation_id: Uuid::from_u128(20),
            sender_id: Uuid::from_u128(30),
            body: "hi".into(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn message_serializes_send_response_shape() {
        let value = serde_json::to_value(sample()).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();

        for key in ["id", "conversationId", "senderId", "body", "createdAt", "updatedAt"] {
            assert!(keys.contains(&key), "missing {key}");
        }
        assert_eq!(value["createdAt"], "2025-01-02T03:04:05Z");
    }

    #[test]
    fn view_keeps_push_fields_only() {
        let value = serde_json::to_value(sample().view()).unwrap();
        assert_eq!(
            value,
            json!({
                "id": Uuid::from_u128(10),
                "body": "hi",
                "senderId": Uuid::from_u128(30),
                "createdAt": "2025-01-02T03:04:05Z",
            })
        );
    }

    #[test]
    fn send_request_accepts_content_alias() {
        let request: SendMessageRequest =
            serde_json::from_value(json!({ "content": "hello" })).unwrap();
        assert_eq!(request.message, "hello");
    }

    #[test]
    fn send_request_rejects_blank_and_oversized_bodies() {
        let blank = SendMessageRequest {
            message: "  \n".into(),
        };
        assert!(blank.validate().is_err());

        let huge = SendMessageRequest {
            message: "x".repeat(MAX_MESSAGE_LENGTH + 1),
        };
        assert!(huge.validate().unwrap_err().contains("exceeds"));

        let fine = SendMessageRequest {
            message: "hello".into(),
        };
        assert!(fine.validate().is_ok());
    }
}
