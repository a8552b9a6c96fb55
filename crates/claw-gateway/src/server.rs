//! HTTP routes and the WebSocket protocol.
//!
//! Every failure is reported in the body (`{ok:false, error}` over HTTP,
//! an `error` result frame over WebSocket); handlers never answer with an
//! HTTP error status.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use uuid::Uuid;

use claw_types::error::ClawError;
use claw_types::protocol::{
    AgentParams, ConnectParams, Frame, SendRequest, SessionParams, METHOD_AGENT_LIST,
    METHOD_CONNECT, METHOD_SESSION_EVENTS, METHOD_SESSION_LIST, METHOD_SESSION_SEND,
};

use crate::{describe_error, Gateway, SERVER_NAME};

pub const TOKEN_HEADER: &str = "x-token";
pub const PASSWORD_HEADER: &str = "x-password";

impl Gateway {
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/api/agents", get(list_agents))
            .route("/api/session/send", post(session_send))
            .route("/api/session/list", get(session_list))
            .route("/api/session/events", get(session_events))
            .route("/ws", get(ws_upgrade))
            .with_state(self)
    }

    /// Serve on an already-bound listener until the process stops.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr().context("Failed to read listener address")?;
        info!("Gateway listening on {}", addr);
        axum::serve(listener, self.router())
            .await
            .context("Gateway server failed")
    }

    /// Bind the configured host and port, then serve.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let addr = format!("{}:{}", self.config().gateway.host, self.config().gateway.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        self.serve(listener).await
    }

    /// Process one inbound WebSocket text frame for a connection whose
    /// authentication state is `authed`, returning the frames to send back.
    pub async fn handle_frame(&self, text: &str, authed: &mut bool) -> Vec<Frame> {
        let (id, method, params) = match serde_json::from_str::<Frame>(text) {
            Ok(Frame::Req { id, method, params }) => (id, method, params),
            _ => {
                let id = serde_json::from_str::<Value>(text)
                    .ok()
                    .and_then(|v| v.get("id").cloned())
                    .unwrap_or(Value::Null);
                return vec![Frame::error(id, "invalid frame")];
            }
        };

        if method == METHOD_CONNECT {
            let creds: ConnectParams = serde_json::from_value(params).unwrap_or_default();
            return match self.authorize(creds.token.as_deref(), creds.password.as_deref()) {
                Ok(()) => {
                    *authed = true;
                    debug!("WebSocket client connected ({})", creds.client.as_deref().unwrap_or("unknown"));
                    vec![Frame::result(
                        id,
                        json!({
                            "ok": true,
                            "server_info": {
                                "name": SERVER_NAME,
                                "version": env!("CARGO_PKG_VERSION"),
                            }
                        }),
                    )]
                }
                Err(e) => {
                    *authed = false;
                    warn!("WebSocket connect rejected: bad credentials");
                    vec![Frame::error(id, e.to_string())]
                }
            };
        }

        if !*authed {
            return vec![Frame::error(id, "not connected")];
        }

        match self.dispatch(&method, params).await {
            Ok((result, updated)) => {
                let mut frames = vec![Frame::result(id, ok(result))];
                if let Some(session_id) = updated {
                    frames.push(Frame::session_update(&session_id));
                }
                frames
            }
            Err(e) => vec![Frame::error(id, describe_error(&e))],
        }
    }

    /// Run an authenticated method. The second value names a session that
    /// changed and should be announced.
    async fn dispatch(&self, method: &str, params: Value) -> Result<(Value, Option<String>)> {
        match method {
            METHOD_AGENT_LIST => Ok((json!({ "agents": self.list_agents() }), None)),
            METHOD_SESSION_LIST => {
                let p: AgentParams = parse_params(params)?;
                Ok((json!({ "sessions": self.list_sessions(&p.agent_id)? }), None))
            }
            METHOD_SESSION_EVENTS => {
                let p: SessionParams = parse_params(params)?;
                Ok((json!({ "events": self.read_events(&p.agent_id, &p.session_id)? }), None))
            }
            METHOD_SESSION_SEND => {
                let req: SendRequest = parse_params(params)?;
                let resp = self.send(&req).await?;
                let session_id = resp.session_id.clone();
                Ok((serde_json::to_value(resp)?, Some(session_id)))
            }
            other => Err(ClawError::validation(format!("unknown method {other}")).into()),
        }
    }

    fn check_headers(&self, headers: &HeaderMap) -> Result<()> {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        self.authorize(header(TOKEN_HEADER), header(PASSWORD_HEADER))
            .map_err(|e| {
                warn!("HTTP request rejected: bad credentials");
                e.into()
            })
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|e| ClawError::validation(format!("invalid params: {e}")).into())
}

/// Mark a result object successful.
fn ok(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        map.insert("ok".to_string(), Value::Bool(true));
    }
    value
}

fn respond(result: Result<Value>) -> Json<Value> {
    match result {
        Ok(value) => Json(ok(value)),
        Err(e) => Json(json!({ "ok": false, "error": describe_error(&e) })),
    }
}

// ─── HTTP handlers ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AgentQuery {
    agent_id: String,
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    agent_id: String,
    session_id: String,
}

fn query<T>(q: Result<Query<T>, QueryRejection>) -> Result<T> {
    q.map(|Query(v)| v)
        .map_err(|e| ClawError::validation(e.body_text()).into())
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn list_agents(State(gw): State<Arc<Gateway>>, headers: HeaderMap) -> Json<Value> {
    respond(gw.check_headers(&headers).map(|()| json!({ "agents": gw.list_agents() })))
}

async fn session_list(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    q: Result<Query<AgentQuery>, QueryRejection>,
) -> Json<Value> {
    respond((|| -> Result<Value> {
        gw.check_headers(&headers)?;
        let q = query(q)?;
        Ok(json!({ "sessions": gw.list_sessions(&q.agent_id)? }))
    })())
}

async fn session_events(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    q: Result<Query<EventsQuery>, QueryRejection>,
) -> Json<Value> {
    respond((|| -> Result<Value> {
        gw.check_headers(&headers)?;
        let q = query(q)?;
        Ok(json!({ "events": gw.read_events(&q.agent_id, &q.session_id)? }))
    })())
}

async fn session_send(
    State(gw): State<Arc<Gateway>>,
    headers: HeaderMap,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Json<Value> {
    if let Err(e) = gw.check_headers(&headers) {
        return respond(Err(e));
    }
    let req = match body {
        Ok(Json(req)) => req,
        Err(e) => return respond(Err(ClawError::validation(e.body_text()).into())),
    };
    respond(
        gw.send(&req)
            .await
            .and_then(|resp| serde_json::to_value(resp).map_err(Into::into)),
    )
}

// ─── WebSocket ────────────────────────────────────────────────────────────────

async fn ws_upgrade(ws: WebSocketUpgrade, State(gw): State<Arc<Gateway>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, gw))
}

/// One connection: frames are processed strictly in arrival order.
async fn handle_socket(socket: WebSocket, gw: Arc<Gateway>) {
    let conn_id = Uuid::new_v4();
    info!("WebSocket connection established: {}", conn_id);

    let (mut sender, mut receiver) = socket.split();
    let mut authed = false;

    'conn: while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("WebSocket {} receive error: {}", conn_id, e);
                break;
            }
        };

        for frame in gw.handle_frame(&text, &mut authed).await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to encode frame: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break 'conn;
            }
        }
    }

    info!("WebSocket connection closed: {}", conn_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AgentRuntime, SessionStore};
    use async_trait::async_trait;
    use claw_agent::{ApprovalStore, ChatMessage, ModelBackend, ModelReply, ToolRegistry, UserHome};
    use claw_types::config::ClawConfig;

    struct Fixed;

    #[async_trait]
    impl ModelBackend for Fixed {
        async fn invoke(&self, _messages: &[ChatMessage]) -> Result<ModelReply> {
            Ok(ModelReply::text("pong"))
        }
    }

    fn gateway(dir: &std::path::Path) -> Gateway {
        let mut config = ClawConfig::with_credentials("tok", "pw");
        config.storage.base_path = dir.join("agents");
        let store = Arc::new(SessionStore::new(&config.storage));
        let approvals = Arc::new(ApprovalStore::new(dir.join("approvals.json")));
        let tools = Arc::new(ToolRegistry::with_default_tools(
            &config.tools,
            approvals,
            UserHome::new(dir, false),
        ));
        let runtime = AgentRuntime::new(config.agents.clone(), Arc::clone(&store), tools)
            .with_backend("default", Arc::new(Fixed));
        Gateway::from_parts(config, store, Arc::new(runtime))
    }

    fn req(id: u64, method: &str, params: Value) -> String {
        serde_json::to_string(&Frame::request(id, method, params)).unwrap()
    }

    fn error_message(frame: &Frame) -> Option<&str> {
        match frame {
            Frame::Res { error: Some(e), .. } => Some(e.message.as_str()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn requests_before_connect_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(dir.path());
        let mut authed = false;

        let out = gw.handle_frame(&req(1, "agent.list", Value::Null), &mut authed).await;
        assert_eq!(error_message(&out[0]), Some("not connected"));

        let out = gw
            .handle_frame(&req(2, "connect", json!({"token": "tok", "password": "nope"})), &mut authed)
            .await;
        assert_eq!(error_message(&out[0]), Some("unauthorized"));
        assert!(!authed);

        let out = gw
            .handle_frame(&req(3, "connect", json!({"token": "tok", "password": "pw"})), &mut authed)
            .await;
        assert!(authed);
        match &out[0] {
            Frame::Res { id, result: Some(r), .. } => {
                assert_eq!(id, &json!(3));
                assert_eq!(r["server_info"]["name"], "claw-gateway");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_reconnect_drops_authentication() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(dir.path());
        let mut authed = false;

        gw.handle_frame(&req(1, "connect", json!({"token": "tok", "password": "pw"})), &mut authed)
            .await;
        assert!(authed);

        let out = gw
            .handle_frame(&req(2, "connect", json!({"token": "tok", "password": "bad"})), &mut authed)
            .await;
        assert_eq!(error_message(&out[0]), Some("unauthorized"));
        assert!(!authed);

        let out = gw.handle_frame(&req(3, "agent.list", Value::Null), &mut authed).await;
        assert_eq!(error_message(&out[0]), Some("not connected"));
    }

    #[tokio::test]
    async fn malformed_and_unknown_frames_keep_connection_usable() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(dir.path());
        let mut authed = true;

        let out = gw.handle_frame("not json", &mut authed).await;
        assert_eq!(error_message(&out[0]), Some("invalid frame"));

        let out = gw
            .handle_frame(r#"{"type":"event","id":4,"method":"x"}"#, &mut authed)
            .await;
        assert_eq!(error_message(&out[0]), Some("invalid frame"));

        let out = gw.handle_frame(&req(5, "session.delete", json!({})), &mut authed).await;
        assert!(error_message(&out[0]).unwrap().starts_with("ValidationError"));

        let out = gw.handle_frame(&req(6, "agent.list", Value::Null), &mut authed).await;
        assert!(error_message(&out[0]).is_none());
    }

    #[tokio::test]
    async fn send_pushes_session_update() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(dir.path());
        let mut authed = true;
        let out = gw
            .handle_frame(
                &req(9, "session.send", json!({"agent_id": "default", "message": "ping"})),
                &mut authed,
            )
            .await;
        assert_eq!(out.len(), 2);
        let session_id = match &out[0] {
            Frame::Res { result: Some(r), .. } => {
                assert_eq!(r["assistant_message"], "pong");
                r["session_id"].as_str().unwrap().to_string()
            }
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(out[1], Frame::session_update(&session_id));
    }

    #[tokio::test]
    async fn empty_session_id_reuses_latest_session() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(dir.path());
        let req = SendRequest {
            agent_id: "default".into(),
            message: "hi".into(),
            session_id: Some(String::new()),
            channel: "cli".into(),
            peer: "local".into(),
        };
        let first = gw.send(&req).await.unwrap();
        let second = gw.send(&req).await.unwrap();
        assert_eq!(first.session_id, second.session_id);
        assert!(first.session_id.starts_with("default-"));
        assert_eq!(gw.list_sessions("default").unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_sends_to_many_peers() {
        let dir = tempfile::tempdir().unwrap();
        let gw = Arc::new(gateway(dir.path()));
        let tasks: Vec<_> = (0..8)
            .map(|n| {
                let gw = Arc::clone(&gw);
                tokio::spawn(async move {
                    let req = SendRequest {
                        agent_id: "default".into(),
                        message: format!("hello {n}"),
                        session_id: None,
                        channel: "cli".into(),
                        peer: format!("peer-{n}"),
                    };
                    gw.send(&req).await
                })
            })
            .collect();
        for task in tasks {
            let resp = task.await.unwrap().unwrap();
            let events = gw.read_events("default", &resp.session_id).unwrap();
            assert_eq!(events.len(), 2);
        }
        assert_eq!(gw.list_sessions("default").unwrap().len(), 8);
    }

    #[tokio::test]
    async fn send_to_unknown_agent_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(dir.path());
        let mut authed = true;
        let out = gw
            .handle_frame(
                &req(1, "session.send", json!({"agent_id": "ghost", "message": "hi"})),
                &mut authed,
            )
            .await;
        assert_eq!(out.len(), 1);
        assert!(error_message(&out[0]).unwrap().starts_with("ValidationError"));
        assert!(!dir.path().join("agents").join("ghost").exists());
    }
}
