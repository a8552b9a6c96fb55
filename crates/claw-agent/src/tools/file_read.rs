use async_trait::async_trait;
use serde_json::{json, Value};

use super::paths::{resolve_path, UserHome};
use super::{ToolContext, ToolError};

pub struct FileRead {
    user: UserHome,
}

impl FileRead {
    pub fn new(user: UserHome) -> Self {
        Self { user }
    }
}

#[async_trait]
impl super::ToolExecutor for FileRead {
    fn name(&self) -> &str {
        "file.read"
    }

    fn description(&self) -> &str {
        "Read the full text content of a file."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file (absolute, relative or starting with ~)"
                },
                "usage": {
                    "type": "string",
                    "description": "Category file to read when no path is given (tasks, meetings, journal, ideas, notes, inbox)"
                }
            }
        })
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let path = resolve_path(
            &self.user,
            args["path"].as_str(),
            args["usage"].as_str(),
            args["content"].as_str(),
        )
            .map_err(|e| ToolError::io("Failed to resolve path", e))?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::io(format!("Failed to read {}", path.display()), e))?;
        Ok(json!({
            "ok": true,
            "path": path.to_string_lossy(),
            "content": content,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::ToolExecutor;
    use super::*;

    fn ctx() -> ToolContext {
        ToolContext {
            channel: "cli".to_string(),
        }
    }

    #[tokio::test]
    async fn reads_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "hello\nworld").unwrap();
        let tool = FileRead::new(UserHome::new(dir.path(), false));
        let out = tool
            .execute(&json!({"path": file.to_str().unwrap()}), &ctx())
            .await
            .unwrap();
        assert_eq!(out["ok"], true);
        assert_eq!(out["content"], "hello\nworld");
    }

    #[tokio::test]
    async fn usage_without_path_reads_category_file() {
        use super::super::file_write::FileWrite;

        let dir = tempfile::tempdir().unwrap();
        let user = UserHome::new(dir.path(), false);
        FileWrite::new(user.clone())
            .execute(&json!({"usage": "tasks", "content": "- buy milk"}), &ctx())
            .await
            .unwrap();

        let out = FileRead::new(user)
            .execute(&json!({"usage": "tasks"}), &ctx())
            .await
            .unwrap();
        assert_eq!(out["content"], "- buy milk");
        assert!(out["path"].as_str().unwrap().ends_with(".claw/tasks.md"));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileRead::new(UserHome::new(dir.path(), false));
        let err = tool
            .execute(&json!({"path": "~/nope.txt"}), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Io { .. }));
        assert!(err.is_soft());
    }
}
