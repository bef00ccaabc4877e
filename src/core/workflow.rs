//! 工作流引擎：message / new / compact / fork 四种模式
//!
//! 每种模式先解析执行上下文（显式参数逐项优先），然后要么立即执行远程调用并返回确认文本，
//! 要么写入待执行表后立即返回，由 Reactor 在对应事件到来时完成。
//! 任何错误都以 `Error: ...` 文本返回，不向外传播。

use std::sync::Arc;

use serde::Deserialize;

use crate::backend::{PromptRequest, SessionInfo, ToastVariant};
use crate::core::{
    resolve_context, ExecutionContext, Orchestrator, OrchestratorError, PendingCompaction,
    PendingRelay,
};

/// 工作流模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// 当前轮结束后向本会话中继一条消息
    Message,
    /// 新建会话并发送首条消息
    New,
    /// 当前轮结束后压缩本会话，再续接
    Compact,
    /// 分叉本会话并在分支中发送消息
    Fork,
}

/// 工作流请求（即 session 工具的参数）
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRequest {
    pub text: String,
    pub mode: Mode,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "modelID")]
    pub model_id: Option<String>,
    #[serde(default, rename = "providerID")]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub tools: Option<String>,
    #[serde(default, rename = "async")]
    pub run_async: bool,
}

impl WorkflowRequest {
    pub fn new(mode: Mode, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode,
            agent: None,
            directory: None,
            title: None,
            model_id: None,
            provider_id: None,
            system: None,
            tools: None,
            run_async: false,
        }
    }

    /// 调用方显式给出的上下文字段
    pub fn explicit_context(&self) -> ExecutionContext {
        ExecutionContext {
            agent: self.agent.clone(),
            provider_id: self.provider_id.clone(),
            model_id: self.model_id.clone(),
            system: self.system.clone(),
            tools: self.tools.clone(),
        }
    }
}

impl Orchestrator {
    /// 执行一次工作流请求；`session_id` 为发起调用的当前会话
    pub async fn run(
        self: &Arc<Self>,
        session_id: &str,
        default_directory: &str,
        request: WorkflowRequest,
    ) -> String {
        let directory = request
            .directory
            .clone()
            .unwrap_or_else(|| default_directory.to_string());
        tracing::info!(
            session = %session_id,
            mode = ?request.mode,
            agent = ?request.agent,
            "Workflow request"
        );
        match self.dispatch(session_id, &directory, &request).await {
            Ok(ack) => ack,
            Err(e) => self.report_error(&e),
        }
    }

    async fn dispatch(
        self: &Arc<Self>,
        session_id: &str,
        directory: &str,
        request: &WorkflowRequest,
    ) -> Result<String, OrchestratorError> {
        if request.text.trim().is_empty() {
            return Err(OrchestratorError::InvalidArguments(
                "text must not be empty".to_string(),
            ));
        }
        match request.mode {
            Mode::Message => self.relay(session_id, directory, request).await,
            Mode::New => self.handoff(session_id, directory, request).await,
            Mode::Compact => self.compact(session_id, directory, request).await,
            Mode::Fork => self.fork(session_id, directory, request).await,
        }
    }

    /// 继承上下文并叠加显式参数；同时返回是否存在助手消息
    async fn context_for(
        &self,
        session_id: &str,
        directory: &str,
        request: &WorkflowRequest,
    ) -> Result<(ExecutionContext, bool), OrchestratorError> {
        let inherited = resolve_context(self.backend.as_ref(), session_id, directory).await?;
        let found = inherited.is_some();
        let context = inherited
            .unwrap_or_default()
            .overridden_by(&request.explicit_context());
        Ok((context, found))
    }

    /// message：此时发送会撞上仍未结束的当前轮，只能登记等 idle
    async fn relay(
        &self,
        session_id: &str,
        directory: &str,
        request: &WorkflowRequest,
    ) -> Result<String, OrchestratorError> {
        let (context, _) = self.context_for(session_id, directory, request).await?;
        context.tool_permissions()?;

        let relay = PendingRelay {
            context,
            text: request.text.clone(),
            directory: directory.to_string(),
        };
        if self.pending.relays.put(session_id, relay).await.is_some() {
            tracing::info!(session = %session_id, "Replaced pending relay");
        }

        Ok(match &request.agent {
            Some(agent) => format!(
                "Message queued for agent \"{agent}\". It will be sent to this session once the current turn finishes."
            ),
            None => "Message queued. It will be sent to this session once the current turn finishes."
                .to_string(),
        })
    }

    /// new：新建会话并发送首条消息
    async fn handoff(
        self: &Arc<Self>,
        session_id: &str,
        directory: &str,
        request: &WorkflowRequest,
    ) -> Result<String, OrchestratorError> {
        let (context, _) = self.context_for(session_id, directory, request).await?;
        let prompt = context.to_prompt(&request.text)?;
        let title = request.title.clone().unwrap_or_else(|| match &request.agent {
            Some(agent) => format!("Session via {agent}"),
            None => "New session".to_string(),
        });

        let session = self.backend.create_session(directory, Some(&title)).await?;
        tracing::info!(session = %session.id, parent = %session_id, "Created handoff session");
        let delivery = self
            .deliver(&session, directory, prompt, request.run_async)
            .await?;

        Ok(format!(
            "Started new session {} (\"{}\"){}. {}",
            session.id,
            title,
            agent_suffix(&context),
            delivery
        ))
    }

    /// compact：插入标记消息并登记压缩请求，真正的 summarize 由 Reactor 在 idle 时发出
    async fn compact(
        &self,
        session_id: &str,
        directory: &str,
        request: &WorkflowRequest,
    ) -> Result<String, OrchestratorError> {
        let (context, found) = self.context_for(session_id, directory, request).await?;
        let model = match context.model() {
            Some(model) => model,
            None if !found => return Err(OrchestratorError::NoAssistantMessages),
            None => return Err(OrchestratorError::MissingModel),
        };
        context.tool_permissions()?;

        let mut marker = PromptRequest::text(format!(
            "[handoff] Compacting this session with {}/{}{}. The conversation continues after compaction with:\n\n{}",
            model.provider_id,
            model.model_id,
            agent_suffix(&context),
            request.text
        ));
        marker.no_reply = Some(true);
        self.send_prompt_bounded(session_id, directory, marker).await?;

        let pending = PendingCompaction {
            provider_id: model.provider_id.clone(),
            model_id: model.model_id.clone(),
            context: context.clone(),
            text: request.text.clone(),
            directory: directory.to_string(),
        };
        if self.pending.compactions.put(session_id, pending).await.is_some() {
            tracing::info!(session = %session_id, "Replaced pending compaction");
        }

        Ok(format!(
            "Compaction scheduled with {}/{}. This session will be compacted after the current turn finishes, then continue{}.",
            model.provider_id,
            model.model_id,
            agent_suffix(&context)
        ))
    }

    /// fork：复制完整历史到新会话，可选重命名，再发送消息
    async fn fork(
        self: &Arc<Self>,
        session_id: &str,
        directory: &str,
        request: &WorkflowRequest,
    ) -> Result<String, OrchestratorError> {
        let (context, _) = self.context_for(session_id, directory, request).await?;
        let prompt = context.to_prompt(&request.text)?;

        let mut forked = self.backend.fork_session(session_id, directory).await?;
        tracing::info!(session = %forked.id, parent = %session_id, "Forked session");
        if let Some(title) = &request.title {
            self.backend
                .update_session_title(&forked.id, directory, title)
                .await?;
            forked.title = title.clone();
        }
        let delivery = self
            .deliver(&forked, directory, prompt, request.run_async)
            .await?;

        Ok(format!(
            "Forked session {} from {} (history preserved){}. {}",
            forked.id,
            session_id,
            agent_suffix(&context),
            delivery
        ))
    }

    /// 向新会话发送首条消息：async 时后台发送，失败走通知；否则等待完成
    async fn deliver(
        self: &Arc<Self>,
        session: &SessionInfo,
        directory: &str,
        prompt: PromptRequest,
        run_async: bool,
    ) -> Result<&'static str, OrchestratorError> {
        if !run_async {
            self.send_prompt_bounded(&session.id, directory, prompt).await?;
            return Ok("Message delivered.");
        }
        let this = Arc::clone(self);
        let session_id = session.id.clone();
        let directory = directory.to_string();
        tokio::spawn(async move {
            if let Err(e) = this.send_prompt_bounded(&session_id, &directory, prompt).await {
                tracing::warn!(session = %session_id, "Background prompt failed: {}", e);
                this.notify_in_background(
                    format!("Failed to send message to session {session_id}: {e}"),
                    ToastVariant::Error,
                );
            }
        });
        Ok("Message is being delivered in the background.")
    }
}

fn agent_suffix(context: &ExecutionContext) -> String {
    match &context.agent {
        Some(agent) => format!(" with agent \"{agent}\""),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserializes_tool_args() {
        let req: WorkflowRequest = serde_json::from_value(serde_json::json!({
            "text": "hello",
            "mode": "fork",
            "providerID": "openai",
            "modelID": "gpt-4o",
            "async": true
        }))
        .unwrap();
        assert_eq!(req.mode, Mode::Fork);
        assert!(req.run_async);
        let ctx = req.explicit_context();
        assert_eq!(ctx.provider_id.as_deref(), Some("openai"));
        assert!(ctx.agent.is_none());
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let parsed = serde_json::from_value::<WorkflowRequest>(serde_json::json!({
            "text": "hello",
            "mode": "teleport"
        }));
        assert!(parsed.is_err());
    }
}
