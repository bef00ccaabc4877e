//! 编排层错误类型
//!
//! 所有错误在工具边界被转为 `Error: {message}` 文本返回给调用方，从不向宿主进程传播。

use thiserror::Error;

use crate::backend::BackendError;

/// 工作流 / 工具执行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("No assistant messages found in session. Cannot determine model for compaction.")]
    NoAssistantMessages,

    #[error("Could not determine model for compaction. Pass modelID and providerID explicitly.")]
    MissingModel,

    #[error("Invalid tools JSON: {0}")]
    InvalidTools(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("No session context for this tool call")]
    MissingSession,

    #[error("Timed out after {secs}s waiting for session {session_id} to reply")]
    PromptTimeout { session_id: String, secs: u64 },

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),
}

impl OrchestratorError {
    /// 远程调用失败才需要通知用户；参数类错误只回给调用方
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Backend(_) | OrchestratorError::PromptTimeout { .. }
        )
    }
}
