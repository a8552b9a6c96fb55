use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::file_index::{FileIndex, FILE_INDEX_NAME};
use super::paths::{infer_usage, resolve_path, UserHome};
use super::{ToolContext, ToolError};

pub struct FileWrite {
    user: UserHome,
    index: FileIndex,
}

impl FileWrite {
    pub fn new(user: UserHome) -> Self {
        let index = FileIndex::new(user.app_dir().join(FILE_INDEX_NAME));
        Self { user, index }
    }

    pub fn index(&self) -> &FileIndex {
        &self.index
    }
}

#[async_trait]
impl super::ToolExecutor for FileWrite {
    fn name(&self) -> &str {
        "file.write"
    }

    fn description(&self) -> &str {
        "Write text to a file, replacing its contents. Without a path the file \
         is chosen from 'usage' (tasks, meetings, journal, ideas, notes) or \
         from the content itself."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Target path (optional)" },
                "usage": { "type": "string", "description": "What the file is for (optional)" },
                "content": { "type": "string", "description": "Full text to write" }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let content = args["content"]
            .as_str()
            .ok_or_else(|| ToolError::invalid("file.write", "missing 'content'"))?;
        let usage_arg = args["usage"].as_str().map(str::trim).filter(|u| !u.is_empty());

        let path = resolve_path(&self.user, args["path"].as_str(), usage_arg, Some(content))
            .map_err(|e| ToolError::io("Failed to resolve path", e))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::io(format!("Failed to create {}", parent.display()), e))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ToolError::io(format!("Failed to write {}", path.display()), e))?;

        let usage = usage_arg.unwrap_or_else(|| infer_usage(content));
        self.index.record(&path, usage, &ctx.channel)?;
        info!("Wrote {} bytes to {}", content.len(), path.display());

        Ok(json!({ "ok": true, "path": path.to_string_lossy() }))
    }
}
