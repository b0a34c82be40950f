use liftlive_metrics::{
    parse_rep, MusicAction, RepEvent, SetContext, SetEnd, SetUpdate,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::SessionId;
use crate::error::GatewayError;

/// Events pushed from the gateway to clients.
///
/// Framed as `{"event": <name>, "data": <payload>}`. Everything except
/// `connection_ack` and `processing_error` is broadcast to every session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// One rep observed during an active set
    #[serde(rename = "rep")]
    Rep(RepEvent),

    /// Running snapshot of the active set
    #[serde(rename = "setUpdate")]
    SetUpdate(SetUpdate),

    /// Final summary; last event of a set
    #[serde(rename = "setEnd")]
    SetEnd(SetEnd),

    #[serde(rename = "musicCue")]
    MusicCue { action: MusicAction },

    /// Rest-period video ids
    #[serde(rename = "shorts")]
    Shorts { queue: Vec<String> },

    /// Sent to a new session only
    #[serde(rename = "connection_ack")]
    ConnectionAck { status: String, sid: String },

    /// Sent only to the session whose frame was rejected
    #[serde(rename = "processing_error")]
    ProcessingError { code: String, message: String },
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Rep(_) => "rep",
            ServerEvent::SetUpdate(_) => "setUpdate",
            ServerEvent::SetEnd(_) => "setEnd",
            ServerEvent::MusicCue { .. } => "musicCue",
            ServerEvent::Shorts { .. } => "shorts",
            ServerEvent::ConnectionAck { .. } => "connection_ack",
            ServerEvent::ProcessingError { .. } => "processing_error",
        }
    }
}

#[derive(Deserialize)]
struct ClientFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Commands accepted from clients
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    StartSet(SetContext),
    /// `None` when the client sent no rep list; the gateway then uses its buffer.
    /// Raw values are validated one by one by the gateway.
    EndSet { reps: Option<Vec<Value>> },
    /// Rep pushed by a sensor bridge client
    Rep(RepEvent),
}

impl ClientCommand {
    /// Parse one text frame.
    pub fn parse(text: &str) -> Result<Self, GatewayError> {
        let frame: ClientFrame = serde_json::from_str(text)
            .map_err(|e| GatewayError::MalformedFrame(e.to_string()))?;

        match frame.event.as_str() {
            "startSet" => Self::parse_start_set(frame.data),
            "endSet" => Self::parse_end_set(frame.data),
            "rep" => parse_rep(&frame.data)
                .map(ClientCommand::Rep)
                .map_err(|e| GatewayError::MalformedPayload {
                    event: "rep",
                    reason: e.to_string(),
                }),
            other => Err(GatewayError::UnknownEvent(other.to_string())),
        }
    }

    fn parse_start_set(data: Value) -> Result<Self, GatewayError> {
        match data {
            Value::Null => Ok(ClientCommand::StartSet(SetContext::default())),
            Value::Object(_) => serde_json::from_value(data)
                .map(ClientCommand::StartSet)
                .map_err(|e| GatewayError::MalformedPayload {
                    event: "startSet",
                    reason: e.to_string(),
                }),
            _ => Err(GatewayError::MalformedPayload {
                event: "startSet",
                reason: "payload must be an object".to_string(),
            }),
        }
    }

    fn parse_end_set(data: Value) -> Result<Self, GatewayError> {
        let reps = match data {
            Value::Null => None,
            Value::Object(mut map) => match map.remove("reps") {
                None | Some(Value::Null) => None,
                Some(Value::Array(values)) => Some(values),
                Some(_) => {
                    return Err(GatewayError::MalformedPayload {
                        event: "endSet",
                        reason: "reps must be an array".to_string(),
                    })
                }
            },
            _ => {
                return Err(GatewayError::MalformedPayload {
                    event: "endSet",
                    reason: "payload must be an object".to_string(),
                })
            }
        };
        Ok(ClientCommand::EndSet { reps })
    }
}

/// In-process set lifecycle notifications for hooks (history, rest cues)
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    SetStarted {
        context: SetContext,
        started_by: Option<SessionId>,
    },
    SetEnded {
        set_end: SetEnd,
        context: SetContext,
        /// False for an `endSet` that arrived while idle
        was_active: bool,
    },
    /// Active set dropped by the idle watchdog; no `setEnd` was sent
    SetExpired { discarded_reps: usize },
}
