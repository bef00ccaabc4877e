//! session_info 工具：会话标题、状态与最近消息

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ReportingSection;
use crate::core::{Orchestrator, OrchestratorError};
use crate::reporting;
use crate::tools::{current_context, report_args_schema, ReportArgs, Tool};

pub struct SessionInfoTool {
    orchestrator: Arc<Orchestrator>,
    options: ReportingSection,
    default_directory: String,
}

impl SessionInfoTool {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        options: ReportingSection,
        default_directory: String,
    ) -> Self {
        Self {
            orchestrator,
            options,
            default_directory,
        }
    }

    async fn run(&self, args: Value) -> Result<String, OrchestratorError> {
        let args = ReportArgs::parse(args)?;
        let directory = args.directory_or(&self.default_directory);
        let session_id = match args.session_id {
            Some(id) => id,
            None => current_context()?.session_id,
        };
        let backend = self.orchestrator.backend();
        Ok(reporting::session_info(backend.as_ref(), &session_id, &directory, &self.options).await?)
    }
}

#[async_trait]
impl Tool for SessionInfoTool {
    fn name(&self) -> &str {
        "session_info"
    }

    fn description(&self) -> &str {
        "Show a session's title, status and last messages. Defaults to the current session."
    }

    fn parameters_schema(&self) -> Value {
        report_args_schema(true)
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        Ok(match self.run(args).await {
            Ok(text) => text,
            Err(e) => self.orchestrator.report_error(&e),
        })
    }
}
