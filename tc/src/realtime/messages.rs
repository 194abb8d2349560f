//! Realtime wire messages
//!
//! Every frame is a JSON envelope `{ "type": ..., "payload": ... }`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::ChannelError;
use crate::chat::ChatMessage;

/// Events this client sends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Chat line for the other participants
    ChatMessage { message: String },

    /// Prompt for the assistant, which may rewrite the itinerary
    #[serde(rename = "gpt_prompt")]
    AssistantPrompt { user_prompt: String },
}

/// Events the server pushes
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    ChatMessage(ChatMessage),

    /// The itinerary was changed elsewhere
    PlanUpdate { message: Option<String> },

    /// Informational notice, e.g. someone left
    SystemMessage { message: String },

    /// The assistant finished generating the first plan
    InitialPlanReady,
}

impl InboundEvent {
    /// Whether this event means the local itinerary is stale
    pub fn invalidates_itinerary(&self) -> bool {
        matches!(self, Self::PlanUpdate { .. } | Self::InitialPlanReady)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,

    #[serde(default)]
    payload: Value,
}

/// Parse one text frame; unknown event types yield `Ok(None)`
pub fn parse_inbound(text: &str) -> Result<Option<InboundEvent>, ChannelError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    let event = match envelope.kind.as_str() {
        "chat_message" => InboundEvent::ChatMessage(serde_json::from_value(envelope.payload)?),
        "plan_update" => InboundEvent::PlanUpdate {
            message: payload_message(&envelope.payload),
        },
        "system_message" => InboundEvent::SystemMessage {
            message: payload_message(&envelope.payload)
                .ok_or_else(|| ChannelError::Protocol("system_message without message".to_string()))?,
        },
        "initial_plan_ready" => InboundEvent::InitialPlanReady,
        other => {
            debug!(kind = other, "parse_inbound: unknown event type");
            return Ok(None);
        }
    };
    Ok(Some(event))
}

fn payload_message(payload: &Value) -> Option<String> {
    match payload {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => map.get("message").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::MessageId;

    #[test]
    fn test_outbound_envelopes() {
        let chat = serde_json::to_value(OutboundEvent::ChatMessage {
            message: "hi".to_string(),
        })
        .unwrap();
        assert_eq!(chat, serde_json::json!({"type": "chat_message", "payload": {"message": "hi"}}));

        let prompt = serde_json::to_value(OutboundEvent::AssistantPrompt {
            user_prompt: "add a museum on day 2".to_string(),
        })
        .unwrap();
        assert_eq!(
            prompt,
            serde_json::json!({"type": "gpt_prompt", "payload": {"user_prompt": "add a museum on day 2"}})
        );
    }

    #[test]
    fn test_parse_chat_message() {
        let text = r#"{"type": "chat_message", "payload": {"id": 8, "trip_id": 1, "sender": {"id": 2, "nickname": "jun"}, "message": "lunch?", "is_from_gpt": false, "created_at": "2024-05-01T12:00:00"}}"#;
        let Some(InboundEvent::ChatMessage(message)) = parse_inbound(text).unwrap() else {
            panic!("expected chat message");
        };
        assert_eq!(message.id, MessageId::Server(8));
        assert_eq!(message.text, "lunch?");
    }

    #[test]
    fn test_parse_plan_update() {
        let text = r#"{"type": "plan_update", "payload": {"message": "Trip itinerary has been updated by GPT."}}"#;
        let event = parse_inbound(text).unwrap().unwrap();
        assert!(event.invalidates_itinerary());
        assert_eq!(
            event,
            InboundEvent::PlanUpdate {
                message: Some("Trip itinerary has been updated by GPT.".to_string())
            }
        );
    }

    #[test]
    fn test_parse_initial_plan_ready_without_payload() {
        let event = parse_inbound(r#"{"type": "initial_plan_ready"}"#).unwrap().unwrap();
        assert_eq!(event, InboundEvent::InitialPlanReady);
        assert!(event.invalidates_itinerary());
    }

    #[test]
    fn test_parse_system_message() {
        let text = r#"{"type": "system_message", "payload": {"message": "jun has left the chat."}}"#;
        assert_eq!(
            parse_inbound(text).unwrap(),
            Some(InboundEvent::SystemMessage {
                message: "jun has left the chat.".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_type_is_skipped() {
        assert_eq!(parse_inbound(r#"{"type": "typing", "payload": {}}"#).unwrap(), None);
    }

    #[test]
    fn test_malformed_frames_error() {
        assert!(parse_inbound("not json").is_err());
        assert!(parse_inbound(r#"{"type": "chat_message", "payload": {"id": 1}}"#).is_err());
    }
}
