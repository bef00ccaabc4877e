//! 执行上下文解析
//!
//! 续接默认沿用会话最近一次助手回复所用的 agent / 模型 / system / 工具权限；
//! 调用方显式给出的字段逐项覆盖继承值。

use crate::backend::{
    Backend, BackendError, MessageInfo, ModelRef, PromptRequest, Role, ToolPermissions,
};
use crate::core::OrchestratorError;

/// 一次请求使用的执行上下文（构造后不再修改）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    pub agent: Option<String>,
    pub provider_id: Option<String>,
    pub model_id: Option<String>,
    pub system: Option<String>,
    /// 序列化后的工具权限表（JSON 对象字符串）
    pub tools: Option<String>,
}

impl ExecutionContext {
    /// 从助手消息提取；工具权限表重新序列化为字符串
    pub fn from_message(info: &MessageInfo) -> Self {
        Self {
            agent: info.agent.clone(),
            provider_id: info.provider_id.clone(),
            model_id: info.model_id.clone(),
            system: info.system.clone(),
            tools: info
                .tools
                .as_ref()
                .and_then(|t| serde_json::to_string(t).ok()),
        }
    }

    /// 以 `explicit` 中存在的字段逐项覆盖自身
    pub fn overridden_by(self, explicit: &ExecutionContext) -> Self {
        Self {
            agent: explicit.agent.clone().or(self.agent),
            provider_id: explicit.provider_id.clone().or(self.provider_id),
            model_id: explicit.model_id.clone().or(self.model_id),
            system: explicit.system.clone().or(self.system),
            tools: explicit.tools.clone().or(self.tools),
        }
    }

    /// provider 与 model 同时存在时才构成可用模型
    pub fn model(&self) -> Option<ModelRef> {
        match (&self.provider_id, &self.model_id) {
            (Some(provider_id), Some(model_id)) => Some(ModelRef {
                provider_id: provider_id.clone(),
                model_id: model_id.clone(),
            }),
            _ => None,
        }
    }

    pub fn tool_permissions(&self) -> Result<Option<ToolPermissions>, OrchestratorError> {
        match self.tools.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => serde_json::from_str(raw)
                .map(Some)
                .map_err(|e| OrchestratorError::InvalidTools(e.to_string())),
        }
    }

    /// 以本上下文构造 prompt 请求体
    pub fn to_prompt(&self, text: &str) -> Result<PromptRequest, OrchestratorError> {
        let mut request = PromptRequest::text(text);
        request.agent = self.agent.clone();
        request.model = self.model();
        request.system = self.system.clone();
        request.tools = self.tool_permissions()?;
        Ok(request)
    }
}

/// 读取会话历史，取最近一条助手消息（按到达顺序）的上下文；没有助手消息时返回 None
pub async fn resolve_context(
    backend: &dyn Backend,
    session_id: &str,
    directory: &str,
) -> Result<Option<ExecutionContext>, BackendError> {
    let messages = backend.list_messages(session_id, directory).await?;
    Ok(messages
        .iter()
        .rev()
        .find(|m| m.info.role == Role::Assistant)
        .map(|m| ExecutionContext::from_message(&m.info)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{assistant_record, user_record};
    use crate::backend::MockBackend;

    #[tokio::test]
    async fn test_resolve_uses_latest_assistant_by_arrival_order() {
        let backend = MockBackend::new();
        let mut older = assistant_record("a1", Some("build"), Some("openai"), Some("gpt-4o"));
        older.info.time.created = 2_000;
        let mut newer = assistant_record("a2", Some("plan"), Some("anthropic"), Some("sonnet"));
        newer.info.time.created = 1_000;
        let mut tools = ToolPermissions::new();
        tools.insert("bash".into(), false);
        newer.info.tools = Some(tools);
        backend.set_messages("s1", vec![older, user_record("u1", "hi"), newer, user_record("u2", "again")]);

        let ctx = resolve_context(&backend, "s1", "/w").await.unwrap().unwrap();
        assert_eq!(ctx.agent.as_deref(), Some("plan"));
        assert_eq!(ctx.provider_id.as_deref(), Some("anthropic"));
        assert_eq!(ctx.tools.as_deref(), Some(r#"{"bash":false}"#));
    }

    #[tokio::test]
    async fn test_resolve_without_assistant_is_none() {
        let backend = MockBackend::new();
        backend.set_messages("s1", vec![user_record("u1", "hi")]);
        assert!(resolve_context(&backend, "s1", "/w").await.unwrap().is_none());
    }

    #[test]
    fn test_override_is_field_by_field() {
        let inherited = ExecutionContext {
            agent: Some("build".into()),
            provider_id: Some("openai".into()),
            model_id: Some("gpt-4o".into()),
            system: Some("be brief".into()),
            tools: None,
        };
        let explicit = ExecutionContext {
            model_id: Some("gpt-4.1".into()),
            agent: Some("plan".into()),
            ..Default::default()
        };
        let merged = inherited.overridden_by(&explicit);
        assert_eq!(merged.agent.as_deref(), Some("plan"));
        assert_eq!(merged.provider_id.as_deref(), Some("openai"));
        assert_eq!(merged.model_id.as_deref(), Some("gpt-4.1"));
        assert_eq!(merged.system.as_deref(), Some("be brief"));
    }

    #[test]
    fn test_to_prompt_requires_valid_tools_json() {
        let ctx = ExecutionContext {
            tools: Some("{not json".into()),
            ..Default::default()
        };
        assert!(matches!(ctx.to_prompt("x"), Err(OrchestratorError::InvalidTools(_))));

        let ctx = ExecutionContext {
            provider_id: Some("openai".into()),
            tools: Some(r#"{"edit": true}"#.into()),
            ..Default::default()
        };
        let req = ctx.to_prompt("x").unwrap();
        assert!(req.model.is_none());
        assert_eq!(req.tools.unwrap().get("edit"), Some(&true));
    }
}
