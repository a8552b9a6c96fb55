use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::{ToolContext, ToolError};

pub struct Exec {
    allowlist: Vec<String>,
    timeout: Duration,
}

impl Exec {
    pub fn new(allowlist: Vec<String>, timeout: Duration) -> Self {
        Self { allowlist, timeout }
    }
}

/// An empty allow-list permits everything.
pub fn matches_allowlist(cmd: &str, allowlist: &[String]) -> bool {
    allowlist.is_empty() || allowlist.iter().any(|prefix| cmd.starts_with(prefix.as_str()))
}

/// A command is either a shell string or an argv list.
enum CommandSpec {
    Shell(String),
    Argv(Vec<String>),
}

impl CommandSpec {
    fn parse(cmd: &Value) -> Result<Self, ToolError> {
        match cmd {
            Value::String(s) if !s.trim().is_empty() => Ok(Self::Shell(s.clone())),
            Value::Array(items) if !items.is_empty() => Ok(Self::Argv(
                items
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            )),
            _ => Err(ToolError::invalid(
                "exec",
                "'cmd' must be a non-empty string or argument list",
            )),
        }
    }

    fn display(&self) -> String {
        match self {
            Self::Shell(s) => s.clone(),
            Self::Argv(argv) => argv.join(" "),
        }
    }

    fn command(&self) -> Command {
        match self {
            Self::Shell(s) => {
                let mut cmd = if cfg!(target_os = "windows") {
                    let mut c = Command::new("cmd");
                    c.arg("/C");
                    c
                } else {
                    let mut c = Command::new("sh");
                    c.arg("-c");
                    c
                };
                cmd.arg(s);
                cmd
            }
            Self::Argv(argv) => {
                let mut cmd = Command::new(&argv[0]);
                cmd.args(&argv[1..]);
                cmd
            }
        }
    }
}

#[async_trait]
impl super::ToolExecutor for Exec {
    fn name(&self) -> &str {
        "exec"
    }

    fn description(&self) -> &str {
        "Execute a command and return stdout, stderr and the exit code. \
         'cmd' is either a shell command string or an argument list."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "cmd": {
                    "description": "Shell command string, or a list of program and arguments",
                    "anyOf": [
                        { "type": "string" },
                        { "type": "array", "items": { "type": "string" } }
                    ]
                }
            },
            "required": ["cmd"]
        })
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let spec = CommandSpec::parse(&args["cmd"])?;
        let cmd_str = spec.display();

        if !matches_allowlist(&cmd_str, &self.allowlist) {
            debug!("exec rejected by allow-list: {}", cmd_str);
            return Ok(json!({ "ok": false, "error": "command not allowed" }));
        }

        let child = spec
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::io(format!("Failed to execute '{cmd_str}'"), e))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => {
                result.map_err(|e| ToolError::io(format!("Failed to execute '{cmd_str}'"), e))?
            }
            Err(_) => {
                return Ok(json!({
                    "ok": false,
                    "error": format!("command timed out after {}s", self.timeout.as_secs()),
                }))
            }
        };

        let code = output.status.code().unwrap_or(-1);
        Ok(json!({
            "ok": code == 0,
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
            "code": code,
        }))
    }
}
