//! Wire types shared by the gateway, its client and the chat bridges.
//!
//! WebSocket traffic is a stream of JSON frames tagged by `type`:
//! requests (`req`) from the client, correlated responses (`res`), and
//! unsolicited server pushes (`event`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const METHOD_CONNECT: &str = "connect";
pub const METHOD_AGENT_LIST: &str = "agent.list";
pub const METHOD_SESSION_LIST: &str = "session.list";
pub const METHOD_SESSION_EVENTS: &str = "session.events";
pub const METHOD_SESSION_SEND: &str = "session.send";
pub const EVENT_SESSION_UPDATE: &str = "session.update";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Req {
        #[serde(default)]
        id: Value,
        method: String,
        #[serde(default)]
        params: Value,
    },
    Res {
        #[serde(default)]
        id: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<FrameError>,
    },
    Event {
        method: String,
        #[serde(default)]
        params: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameError {
    pub message: String,
}

impl Frame {
    pub fn request(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self::Req {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    pub fn result(id: Value, result: Value) -> Self {
        Self::Res {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, message: impl Into<String>) -> Self {
        Self::Res {
            id,
            result: None,
            error: Some(FrameError {
                message: message.into(),
            }),
        }
    }

    pub fn session_update(session_id: &str) -> Self {
        Self::Event {
            method: EVENT_SESSION_UPDATE.to_string(),
            params: serde_json::json!({ "session_id": session_id }),
        }
    }
}

/// Credentials carried by the `connect` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectParams {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
}

/// Body of `POST /api/session/send` and params of `session.send`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    pub agent_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_peer")]
    pub peer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendResponse {
    pub session_id: String,
    pub assistant_message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentParams {
    pub agent_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionParams {
    pub agent_id: String,
    pub session_id: String,
}

fn default_channel() -> String {
    "cli".to_string()
}

fn default_peer() -> String {
    "local".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_frame_parses_without_params() {
        let f: Frame = serde_json::from_str(r#"{"type":"req","id":7,"method":"agent.list"}"#).unwrap();
        match f {
            Frame::Req { id, method, params } => {
                assert_eq!(id, json!(7));
                assert_eq!(method, "agent.list");
                assert!(params.is_null());
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn error_response_omits_result() {
        let v = serde_json::to_value(Frame::error(json!(1), "unauthorized")).unwrap();
        assert_eq!(v, json!({"type": "res", "id": 1, "error": {"message": "unauthorized"}}));
    }

    #[test]
    fn session_update_event_shape() {
        let v = serde_json::to_value(Frame::session_update("abc")).unwrap();
        assert_eq!(
            v,
            json!({"type": "event", "method": "session.update", "params": {"session_id": "abc"}})
        );
    }

    #[test]
    fn send_request_defaults_channel_and_peer() {
        let req: SendRequest =
            serde_json::from_value(json!({"agent_id": "default", "message": "hi"})).unwrap();
        assert_eq!(req.channel, "cli");
        assert_eq!(req.peer, "local");
        assert!(req.session_id.is_none());
    }
}
