//! WebSocket client for the gateway, used by the CLI.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use claw_types::config::GatewayConfig;
use claw_types::error::ClawError;
use claw_types::protocol::{Frame, SendRequest, SendResponse, METHOD_CONNECT, METHOD_SESSION_SEND};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct GatewayClient {
    url: String,
    token: String,
    password: String,
}

impl GatewayClient {
    pub fn new(url: impl Into<String>, token: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            password: password.into(),
        }
    }

    /// Client for the gateway described by `config`.
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            format!("ws://{}:{}/ws", config.host, config.port),
            config.token.clone(),
            config.password.clone(),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open a connection, authenticate, issue one request and return its
    /// result.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let (mut ws, _) = connect_async(self.url.as_str())
            .await
            .with_context(|| format!("Failed to connect to gateway at {}", self.url))?;

        let connect = Frame::request(
            1,
            METHOD_CONNECT,
            json!({ "token": self.token, "password": self.password, "client": "cli" }),
        );
        send_frame(&mut ws, &connect).await?;
        recv_result(&mut ws, 1).await?;

        send_frame(&mut ws, &Frame::request(2, method, params)).await?;
        let result = recv_result(&mut ws, 2).await;
        let _ = ws.close(None).await;
        result
    }

    pub async fn send_message(&self, req: &SendRequest) -> Result<SendResponse> {
        let result = self
            .request(METHOD_SESSION_SEND, serde_json::to_value(req)?)
            .await?;
        serde_json::from_value(result).context("Malformed session.send result")
    }
}

async fn send_frame(ws: &mut Socket, frame: &Frame) -> Result<()> {
    let json = serde_json::to_string(frame)?;
    ws.send(Message::Text(json))
        .await
        .context("Failed to send frame to gateway")
}

/// Wait for the response to request `id`, skipping pushed events.
async fn recv_result(ws: &mut Socket, id: u64) -> Result<Value> {
    while let Some(msg) = ws.next().await {
        let msg = msg.context("Gateway connection failed")?;
        let Message::Text(text) = msg else {
            continue;
        };
        match serde_json::from_str::<Frame>(&text) {
            Ok(Frame::Res { id: rid, result, error }) if rid == json!(id) => {
                if let Some(e) = error {
                    anyhow::bail!("gateway error: {}", e.message);
                }
                return Ok(result.unwrap_or(Value::Null));
            }
            Ok(other) => debug!("Skipping frame while waiting for {}: {:?}", id, other),
            Err(e) => debug!("Ignoring undecodable frame: {}", e),
        }
    }
    Err(ClawError::Transport("gateway closed the connection".into()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_from_config() {
        let cfg = claw_types::config::ClawConfig::with_credentials("t", "p");
        let client = GatewayClient::from_config(&cfg.gateway);
        assert_eq!(client.url(), "ws://127.0.0.1:18789/ws");
    }

    #[tokio::test]
    async fn unreachable_gateway_is_an_error() {
        let client = GatewayClient::new("ws://127.0.0.1:9/ws", "t", "p");
        assert!(client.request("agent.list", Value::Null).await.is_err());
    }
}
