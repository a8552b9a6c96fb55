pub mod agent_loop;
pub mod approvals;
pub mod llm;
pub mod tools;

pub use agent_loop::{run_turn, EventSink, TurnOutcome};
pub use approvals::ApprovalStore;
pub use llm::{backend_for, ChatMessage, ModelBackend, ModelReply, OpenAiBackend};
pub use tools::paths::UserHome;
pub use tools::{ToolError, ToolRegistry};
