use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{ToolContext, ToolError};

pub struct WebFetch {
    timeout: Duration,
}

impl WebFetch {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl super::ToolExecutor for WebFetch {
    fn name(&self) -> &str {
        "web.fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL with HTTP GET and return the status code and body text."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch (must start with http:// or https://)"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let url = args["url"]
            .as_str()
            .ok_or_else(|| ToolError::invalid("web.fetch", "missing 'url'"))?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::invalid(
                "web.fetch",
                "URL must start with http:// or https://",
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("claw/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let resp = client.get(url).send().await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        debug!("web.fetch {} -> {} ({} bytes)", url, status, text.len());

        Ok(json!({ "ok": true, "status": status, "text": text }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::ToolExecutor;
    use super::*;

    #[tokio::test]
    async fn rejects_non_http_scheme() {
        let tool = WebFetch::new(Duration::from_secs(1));
        let ctx = ToolContext {
            channel: "cli".to_string(),
        };
        let err = tool
            .execute(&json!({"url": "file:///etc/passwd"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs { .. }));
    }

    #[tokio::test]
    async fn connection_failure_is_transport_error() {
        let tool = WebFetch::new(Duration::from_secs(2));
        let ctx = ToolContext {
            channel: "cli".to_string(),
        };
        // Port 9 on loopback is the discard port; nothing listens there in CI.
        let err = tool
            .execute(&json!({"url": "http://127.0.0.1:9/"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Transport(_)));
        assert!(!err.is_soft());
    }
}
