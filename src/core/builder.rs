//! 编排器构建器：统一的进程初始化逻辑
//!
//! 二进制与集成测试共用同一套装配：后端 → 编排器 → agent 列表 → 工具注册表 → 执行器。

use std::path::Path;
use std::sync::Arc;

use crate::agents::{AgentDiscovery, AgentProfile};
use crate::backend::{Backend, BackendError, HttpBackend, Notifier};
use crate::config::AppConfig;
use crate::core::{Orchestrator, OrchestratorSettings};
use crate::tools::{
    ProjectListTool, SessionInfoTool, SessionListTool, SessionTool, ToolExecutor, ToolRegistry,
};

/// 装配完成的运行时组件
pub struct Handoff {
    pub orchestrator: Arc<Orchestrator>,
    pub executor: Arc<ToolExecutor>,
    /// 默认工作目录（工具调用未带上下文时使用）
    pub directory: String,
}

/// 构建器：未指定后端时按 [backend] 配置创建 HTTP 后端
pub struct HandoffBuilder {
    config: AppConfig,
    directory: String,
    backend: Option<(Arc<dyn Backend>, Arc<dyn Notifier>)>,
    agents: Option<Vec<AgentProfile>>,
}

impl HandoffBuilder {
    pub fn new(config: AppConfig) -> Self {
        let directory = config.backend.resolve_directory();
        Self {
            config,
            directory,
            backend: None,
            agents: None,
        }
    }

    pub fn with_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = directory.into();
        self
    }

    /// 替换后端（测试中传入 MockBackend）
    pub fn with_backend(mut self, backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>) -> Self {
        self.backend = Some((backend, notifier));
        self
    }

    /// 跳过磁盘扫描，直接使用给定的 agent 列表
    pub fn with_agents(mut self, agents: Vec<AgentProfile>) -> Self {
        self.agents = Some(agents);
        self
    }

    pub fn build_orchestrator(&self) -> Result<Arc<Orchestrator>, BackendError> {
        let (backend, notifier) = match &self.backend {
            Some((backend, notifier)) => (Arc::clone(backend), Arc::clone(notifier)),
            None => {
                let http = Arc::new(HttpBackend::new(
                    &self.config.backend.base_url,
                    self.config.backend.request_timeout_secs,
                    &self.directory,
                )?);
                (http.clone() as Arc<dyn Backend>, http as Arc<dyn Notifier>)
            }
        };
        Ok(Arc::new(Orchestrator::new(
            backend,
            notifier,
            OrchestratorSettings::from_config(&self.config),
        )))
    }

    pub fn discover_agents(&self) -> Vec<AgentProfile> {
        match &self.agents {
            Some(agents) => agents.clone(),
            None => AgentDiscovery::for_directory(Path::new(&self.directory), &self.config.agents)
                .discover(),
        }
    }

    /// 所有工具共享同一个编排器
    pub fn build_tool_registry(&self, orchestrator: &Arc<Orchestrator>) -> ToolRegistry {
        let agents = self.discover_agents();
        tracing::debug!(count = agents.len(), "Discovered agents");

        let mut tools = ToolRegistry::new();
        tools.register(SessionTool::new(Arc::clone(orchestrator), &agents));
        tools.register(SessionListTool::new(
            Arc::clone(orchestrator),
            self.config.reporting.clone(),
            self.directory.clone(),
        ));
        tools.register(SessionInfoTool::new(
            Arc::clone(orchestrator),
            self.config.reporting.clone(),
            self.directory.clone(),
        ));
        tools.register(ProjectListTool::new(
            Arc::clone(orchestrator),
            self.directory.clone(),
        ));
        tools
    }

    pub fn build(self) -> Result<Handoff, BackendError> {
        let orchestrator = self.build_orchestrator()?;
        let registry = self.build_tool_registry(&orchestrator);
        let executor = ToolExecutor::new(registry, self.config.orchestrator.tool_timeout_secs);
        Ok(Handoff {
            orchestrator,
            executor: Arc::new(executor),
            directory: self.directory,
        })
    }
}
