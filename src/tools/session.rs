//! session 工具：跨会话工作流（message / new / compact / fork）
//!
//! 立即返回确认文本；需要等当前轮结束的动作登记到编排器，由事件反应器完成。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::agents::{describe_agents, AgentProfile};
use crate::core::{Orchestrator, OrchestratorError, WorkflowRequest};
use crate::tools::{current_context, Tool};

const BASE_DESCRIPTION: &str = "Continue work across sessions. Modes: \
\"message\" sends text to this session after the current turn finishes (optionally under another agent/model); \
\"new\" starts a fresh session and sends text as its first message; \
\"compact\" compacts this session's history after the current turn, then continues with text; \
\"fork\" copies this session (history preserved) into a new one and sends text there. \
Agent, model, system prompt and tool permissions default to those of the last assistant reply.";

/// session 工具
pub struct SessionTool {
    orchestrator: Arc<Orchestrator>,
    description: String,
}

impl SessionTool {
    pub fn new(orchestrator: Arc<Orchestrator>, agents: &[AgentProfile]) -> Self {
        Self {
            orchestrator,
            description: format!("{BASE_DESCRIPTION}\n\n{}", describe_agents(agents)),
        }
    }

    async fn run(&self, args: Value) -> Result<String, OrchestratorError> {
        let context = current_context()?;
        let request: WorkflowRequest = serde_json::from_value(args)
            .map_err(|e| OrchestratorError::InvalidArguments(e.to_string()))?;
        Ok(self
            .orchestrator
            .run(&context.session_id, &context.directory, request)
            .await)
    }
}

#[async_trait]
impl Tool for SessionTool {
    fn name(&self) -> &str {
        "session"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "Message to send (or to continue with after compaction)"
                },
                "mode": {
                    "type": "string",
                    "enum": ["message", "new", "compact", "fork"],
                    "description": "Workflow to run"
                },
                "agent": { "type": "string", "description": "Agent to continue with" },
                "directory": { "type": "string", "description": "Project directory override" },
                "title": { "type": "string", "description": "Title for the new or forked session" },
                "modelID": { "type": "string", "description": "Model override" },
                "providerID": { "type": "string", "description": "Provider override" },
                "system": { "type": "string", "description": "System prompt override" },
                "tools": {
                    "type": "string",
                    "description": "JSON object of tool permissions, e.g. {\"bash\": false}"
                },
                "async": {
                    "type": "boolean",
                    "description": "For new/fork: return without waiting for the first reply"
                }
            },
            "required": ["text", "mode"]
        })
    }

    /// 同步发送由编排器按 prompt_timeout 限时，超时以 `Error: ...` 文本返回
    fn uses_executor_timeout(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        Ok(self
            .run(args)
            .await
            .unwrap_or_else(|e| format!("Error: {e}")))
    }
}
