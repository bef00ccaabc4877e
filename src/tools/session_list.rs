//! session_list 工具：列出目录下的会话及其状态

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ReportingSection;
use crate::core::{Orchestrator, OrchestratorError};
use crate::reporting;
use crate::tools::{report_args_schema, ReportArgs, Tool};

pub struct SessionListTool {
    orchestrator: Arc<Orchestrator>,
    options: ReportingSection,
    default_directory: String,
}

impl SessionListTool {
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
        let directory = ReportArgs::parse(args)?.directory_or(&self.default_directory);
        let backend = self.orchestrator.backend();
        Ok(reporting::list_sessions(backend.as_ref(), &directory, &self.options).await?)
    }
}

#[async_trait]
impl Tool for SessionListTool {
    fn name(&self) -> &str {
        "session_list"
    }

    fn description(&self) -> &str {
        "List sessions in a project directory, most recently updated first, with their status (idle / busy / retry)."
    }

    fn parameters_schema(&self) -> Value {
        report_args_schema(false)
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        Ok(match self.run(args).await {
            Ok(text) => text,
            Err(e) => self.orchestrator.report_error(&e),
        })
    }
}
