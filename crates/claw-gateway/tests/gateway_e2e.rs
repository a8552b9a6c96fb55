use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use claw_agent::{ApprovalStore, ChatMessage, ModelBackend, ModelReply, ToolRegistry, UserHome};
use claw_gateway::{AgentRuntime, Gateway, GatewayClient, SessionStore};
use claw_types::config::ClawConfig;
use claw_types::protocol::{Frame, SendRequest};

/// Replies with the number of messages it was given.
struct Counting;

#[async_trait]
impl ModelBackend for Counting {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<ModelReply> {
        Ok(ModelReply::text(format!("seen {}", messages.len())))
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    addr: String,
    http: reqwest::Client,
}

impl Harness {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(dir.path());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(gw.serve(listener));
        Self {
            _dir: dir,
            addr,
            http: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> Value {
        self.http
            .get(format!("http://{}{}", self.addr, path))
            .header("x-token", "tok")
            .header("x-password", "pw")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    async fn send(&self, body: Value) -> Value {
        self.http
            .post(format!("http://{}/api/session/send", self.addr))
            .header("x-token", "tok")
            .header("x-password", "pw")
            .json(&body)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

fn gateway(dir: &Path) -> Arc<Gateway> {
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
        .with_backend("default", Arc::new(Counting));
    Arc::new(Gateway::from_parts(config, store, Arc::new(runtime)))
}

#[tokio::test]
async fn health_needs_no_credentials() {
    let h = Harness::start().await;
    let body: Value = reqwest::get(format!("http://{}/health", h.addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "ok": true }));
}

#[tokio::test]
async fn wrong_credentials_are_rejected_in_body() {
    let h = Harness::start().await;
    let resp = h
        .http
        .get(format!("http://{}/api/agents", h.addr))
        .header("x-token", "tok")
        .header("x-password", "wrong")
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], false);
    assert!(body["error"].as_str().unwrap().starts_with("Unauthorized"));
}

#[tokio::test]
async fn http_send_reuses_the_peer_session() {
    let h = Harness::start().await;

    let first = h.send(json!({ "agent_id": "default", "message": "hello" })).await;
    assert_eq!(first["ok"], true, "{first}");
    // system prompt + user message
    assert_eq!(first["assistant_message"], "seen 2");
    let session_id = first["session_id"].as_str().unwrap().to_string();

    let second = h.send(json!({ "agent_id": "default", "message": "again" })).await;
    assert_eq!(second["session_id"], session_id.as_str());
    assert_eq!(second["assistant_message"], "seen 4");

    let other_peer = h
        .send(json!({ "agent_id": "default", "message": "hi", "peer": "someone-else" }))
        .await;
    assert_ne!(other_peer["session_id"], session_id.as_str());

    let sessions = h.get("/api/session/list?agent_id=default").await;
    assert_eq!(sessions["sessions"].as_array().unwrap().len(), 2);

    let events = h
        .get(&format!("/api/session/events?agent_id=default&session_id={session_id}"))
        .await;
    let roles: Vec<&str> = events["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, ["user", "assistant", "user", "assistant"]);
}

#[tokio::test]
async fn http_errors_carry_their_kind() {
    let h = Harness::start().await;

    let body = h.send(json!({ "agent_id": "ghost", "message": "hi" })).await;
    assert_eq!(body["ok"], false);
    assert!(body["error"].as_str().unwrap().starts_with("ValidationError"));

    let body = h.send(json!({ "message": "no agent" })).await;
    assert!(body["error"].as_str().unwrap().starts_with("ValidationError"));

    let body = h.get("/api/session/list").await;
    assert!(body["error"].as_str().unwrap().starts_with("ValidationError"));
}

#[tokio::test]
async fn client_sends_over_websocket() {
    let h = Harness::start().await;
    let client = GatewayClient::new(h.ws_url(), "tok", "pw");
    let resp = client
        .send_message(&SendRequest {
            agent_id: "default".into(),
            message: "ping".into(),
            session_id: Some("fixed-id".into()),
            channel: "cli".into(),
            peer: "local".into(),
        })
        .await
        .unwrap();
    assert_eq!(resp.session_id, "fixed-id");
    assert_eq!(resp.assistant_message, "seen 2");

    let agents = client.request("agent.list", Value::Null).await.unwrap();
    assert_eq!(agents["agents"][0]["id"], "default");

    let bad = GatewayClient::new(h.ws_url(), "tok", "nope");
    let err = bad.request("agent.list", Value::Null).await.unwrap_err();
    assert!(format!("{err:#}").contains("unauthorized"));
}

#[tokio::test]
async fn websocket_pushes_session_updates() {
    let h = Harness::start().await;
    let (mut ws, _) = connect_async(h.ws_url()).await.unwrap();

    ws.send(text(Frame::request(1, "agent.list", Value::Null))).await.unwrap();
    let refused = next_frame(&mut ws).await;
    assert_eq!(refused, Frame::error(json!(1), "not connected"));

    let connect = Frame::request(2, "connect", json!({ "token": "tok", "password": "pw" }));
    ws.send(text(connect)).await.unwrap();
    assert!(matches!(next_frame(&mut ws).await, Frame::Res { error: None, .. }));

    let send = Frame::request(3, "session.send", json!({ "agent_id": "default", "message": "hi" }));
    ws.send(text(send)).await.unwrap();
    let session_id = match next_frame(&mut ws).await {
        Frame::Res { id, result: Some(r), error: None } => {
            assert_eq!(id, json!(3));
            r["session_id"].as_str().unwrap().to_string()
        }
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(next_frame(&mut ws).await, Frame::session_update(&session_id));
}

fn text(frame: Frame) -> Message {
    Message::Text(serde_json::to_string(&frame).unwrap())
}

async fn next_frame<S>(ws: &mut S) -> Frame
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match ws.next().await.expect("socket closed").unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            _ => continue,
        }
    }
}
