//! project_list 工具：列出后端已知的项目

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{Orchestrator, OrchestratorError};
use crate::reporting;
use crate::tools::{report_args_schema, ReportArgs, Tool};

pub struct ProjectListTool {
    orchestrator: Arc<Orchestrator>,
    default_directory: String,
}

impl ProjectListTool {
    pub fn new(orchestrator: Arc<Orchestrator>, default_directory: String) -> Self {
        Self {
            orchestrator,
            default_directory,
        }
    }

    async fn run(&self, args: Value) -> Result<String, OrchestratorError> {
        let directory = ReportArgs::parse(args)?.directory_or(&self.default_directory);
        let backend = self.orchestrator.backend();
        Ok(reporting::list_projects(backend.as_ref(), &directory).await?)
    }
}

#[async_trait]
impl Tool for ProjectListTool {
    fn name(&self) -> &str {
        "project_list"
    }

    fn description(&self) -> &str {
        "List projects known to the backend with their worktree and version control system."
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
