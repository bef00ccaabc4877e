//! 工具层：会话工作流工具与只读报告工具
//!
//! 发起调用的会话由协议层通过 task_local `CURRENT_SESSION` 注入（见 `with_context`）。

pub mod executor;
pub mod project_list;
pub mod registry;
pub mod session;
pub mod session_info;
pub mod session_list;

use std::future::Future;

use serde::Deserialize;

use crate::core::OrchestratorError;

pub use executor::ToolExecutor;
pub use project_list::ProjectListTool;
pub use registry::{Tool, ToolRegistry};
pub use session::SessionTool;
pub use session_info::SessionInfoTool;
pub use session_list::SessionListTool;

/// 一次工具调用的宿主上下文
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ToolContext {
    #[serde(rename = "sessionID", alias = "session_id")]
    pub session_id: String,
    pub directory: String,
}

tokio::task_local! {
    /// 当前工具调用所属的会话，由协议层在执行前设置
    pub static CURRENT_SESSION: ToolContext;
}

/// 在给定会话上下文中运行工具调用
pub async fn with_context<F: Future>(context: ToolContext, fut: F) -> F::Output {
    CURRENT_SESSION.scope(context, fut).await
}

/// 读取当前调用的会话上下文
pub fn current_context() -> Result<ToolContext, OrchestratorError> {
    CURRENT_SESSION
        .try_with(|c| c.clone())
        .map_err(|_| OrchestratorError::MissingSession)
}

/// 只读报告工具共用的参数
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ReportArgs {
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default, rename = "sessionID")]
    pub session_id: Option<String>,
}

impl ReportArgs {
    pub(crate) fn parse(args: serde_json::Value) -> Result<Self, OrchestratorError> {
        if args.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(args).map_err(|e| OrchestratorError::InvalidArguments(e.to_string()))
    }

    /// 参数 > 调用上下文 > 默认目录
    pub(crate) fn directory_or(&self, fallback: &str) -> String {
        self.directory
            .clone()
            .or_else(|| current_context().ok().map(|c| c.directory))
            .unwrap_or_else(|| fallback.to_string())
    }
}

pub(crate) fn report_args_schema(with_session: bool) -> serde_json::Value {
    let mut properties = serde_json::json!({
        "directory": {
            "type": "string",
            "description": "Project directory (defaults to the current session's directory)"
        }
    });
    if with_session {
        properties["sessionID"] = serde_json::json!({
            "type": "string",
            "description": "Session to inspect (defaults to the current session)"
        });
    }
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": []
    })
}
