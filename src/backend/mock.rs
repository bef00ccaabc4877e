//! Mock 后端（用于测试，无需真实会话宿主）
//!
//! 记录每一次远程调用，可预置会话消息 / 列表 / 状态 / 事件，并按操作名注入失败。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;

use super::error::BackendError;
use super::events::BackendEvent;
use super::traits::{Backend, EventStream, Notifier};
use super::types::{
    MessageInfo, MessagePart, MessageRecord, MessageTime, ProjectInfo, PromptRequest, Role,
    SessionId, SessionInfo, SessionTime, StatusMap, SummarizeRequest, ToastVariant,
};

/// 一次被记录的远程调用
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CreateSession {
        directory: String,
        title: Option<String>,
    },
    ForkSession {
        session_id: SessionId,
        directory: String,
    },
    UpdateTitle {
        session_id: SessionId,
        title: String,
    },
    SendPrompt {
        session_id: SessionId,
        request: PromptRequest,
    },
    SendPromptAsync {
        session_id: SessionId,
        request: PromptRequest,
    },
    Summarize {
        session_id: SessionId,
        request: SummarizeRequest,
    },
    ListSessions,
    SessionStatus,
    ListMessages {
        session_id: SessionId,
    },
    ListProjects,
    Notify {
        message: String,
        variant: ToastVariant,
    },
}

impl BackendCall {
    /// 与 `fail_on` 使用的操作名一致
    pub fn op(&self) -> &'static str {
        match self {
            BackendCall::CreateSession { .. } => "create_session",
            BackendCall::ForkSession { .. } => "fork_session",
            BackendCall::UpdateTitle { .. } => "update_session_title",
            BackendCall::SendPrompt { .. } => "send_prompt",
            BackendCall::SendPromptAsync { .. } => "send_prompt_async",
            BackendCall::Summarize { .. } => "summarize",
            BackendCall::ListSessions => "list_sessions",
            BackendCall::SessionStatus => "session_status",
            BackendCall::ListMessages { .. } => "list_messages",
            BackendCall::ListProjects => "list_projects",
            BackendCall::Notify { .. } => "notify",
        }
    }
}

/// 记录型 Mock 后端
#[derive(Default)]
pub struct MockBackend {
    calls: Mutex<Vec<BackendCall>>,
    failing: Mutex<HashSet<&'static str>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
    messages: Mutex<HashMap<SessionId, Vec<MessageRecord>>>,
    sessions: Mutex<Vec<SessionInfo>>,
    statuses: Mutex<StatusMap>,
    projects: Mutex<Vec<ProjectInfo>>,
    events: Mutex<Vec<BackendEvent>>,
    next_id: AtomicU64,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后对该操作的调用都返回错误（仍会被记录）
    pub fn fail_on(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    /// 该操作在记录后先等待给定时长再返回（模拟迟迟不回复的会话）
    pub fn delay_on(&self, op: &'static str, delay: Duration) {
        self.delays.lock().unwrap().insert(op, delay);
    }

    async fn wait_if_delayed(&self, op: &str) {
        let delay = self.delays.lock().unwrap().get(op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn set_messages(&self, session_id: &str, records: Vec<MessageRecord>) {
        self.messages
            .lock()
            .unwrap()
            .insert(session_id.to_string(), records);
    }

    pub fn set_sessions(&self, sessions: Vec<SessionInfo>) {
        *self.sessions.lock().unwrap() = sessions;
    }

    pub fn set_statuses(&self, statuses: StatusMap) {
        *self.statuses.lock().unwrap() = statuses;
    }

    pub fn set_projects(&self, projects: Vec<ProjectInfo>) {
        *self.projects.lock().unwrap() = projects;
    }

    /// 下一次 subscribe_events 返回的事件（取走后清空）
    pub fn push_events(&self, events: Vec<BackendEvent>) {
        self.events.lock().unwrap().extend(events);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| c.op() == op).count()
    }

    /// 所有 prompt 调用（同步与异步），按发生顺序
    pub fn prompts(&self) -> Vec<(SessionId, PromptRequest)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::SendPrompt {
                    session_id,
                    request,
                }
                | BackendCall::SendPromptAsync {
                    session_id,
                    request,
                } => Some((session_id, request)),
                _ => None,
            })
            .collect()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::Notify { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    /// 清空调用记录（保留预置数据）
    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: BackendCall) -> Result<(), BackendError> {
        let op = call.op();
        self.calls.lock().unwrap().push(call);
        if self.failing.lock().unwrap().contains(op) {
            return Err(BackendError::Status {
                status: 500,
                body: format!("mock {op} failure"),
            });
        }
        Ok(())
    }

    fn new_session(&self, prefix: &str, directory: &str, title: Option<&str>) -> SessionInfo {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("{prefix}_{n}");
        SessionInfo {
            title: title.map(String::from).unwrap_or_else(|| id.clone()),
            id,
            directory: directory.to_string(),
            parent_id: None,
            time: SessionTime::default(),
        }
    }
}

/// 构造一条助手消息记录
pub fn assistant_record(
    id: &str,
    agent: Option<&str>,
    provider_id: Option<&str>,
    model_id: Option<&str>,
) -> MessageRecord {
    MessageRecord {
        info: MessageInfo {
            id: id.to_string(),
            role: Role::Assistant,
            time: MessageTime::default(),
            agent: agent.map(String::from),
            model_id: model_id.map(String::from),
            provider_id: provider_id.map(String::from),
            system: None,
            tools: None,
        },
        parts: vec![MessagePart {
            kind: "text".to_string(),
            text: Some(format!("reply {id}")),
        }],
    }
}

/// 构造一条用户消息记录
pub fn user_record(id: &str, text: &str) -> MessageRecord {
    MessageRecord {
        info: MessageInfo {
            id: id.to_string(),
            role: Role::User,
            time: MessageTime::default(),
            agent: None,
            model_id: None,
            provider_id: None,
            system: None,
            tools: None,
        },
        parts: vec![MessagePart {
            kind: "text".to_string(),
            text: Some(text.to_string()),
        }],
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn create_session(
        &self,
        directory: &str,
        title: Option<&str>,
    ) -> Result<SessionInfo, BackendError> {
        self.record(BackendCall::CreateSession {
            directory: directory.to_string(),
            title: title.map(String::from),
        })?;
        Ok(self.new_session("ses_new", directory, title))
    }

    async fn fork_session(
        &self,
        session_id: &str,
        directory: &str,
    ) -> Result<SessionInfo, BackendError> {
        self.record(BackendCall::ForkSession {
            session_id: session_id.to_string(),
            directory: directory.to_string(),
        })?;
        let mut info = self.new_session("ses_fork", directory, None);
        info.parent_id = Some(session_id.to_string());
        Ok(info)
    }

    async fn update_session_title(
        &self,
        session_id: &str,
        _directory: &str,
        title: &str,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::UpdateTitle {
            session_id: session_id.to_string(),
            title: title.to_string(),
        })
    }

    async fn send_prompt(
        &self,
        session_id: &str,
        _directory: &str,
        request: PromptRequest,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::SendPrompt {
            session_id: session_id.to_string(),
            request,
        })?;
        self.wait_if_delayed("send_prompt").await;
        Ok(())
    }

    async fn send_prompt_async(
        &self,
        session_id: &str,
        _directory: &str,
        request: PromptRequest,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::SendPromptAsync {
            session_id: session_id.to_string(),
            request,
        })
    }

    async fn summarize(
        &self,
        session_id: &str,
        _directory: &str,
        request: SummarizeRequest,
    ) -> Result<(), BackendError> {
        self.wait_if_delayed("summarize").await;
        self.record(BackendCall::Summarize {
            session_id: session_id.to_string(),
            request,
        })
    }

    async fn list_sessions(&self, _directory: &str) -> Result<Vec<SessionInfo>, BackendError> {
        self.record(BackendCall::ListSessions)?;
        Ok(self.sessions.lock().unwrap().clone())
    }

    async fn session_status(&self, _directory: &str) -> Result<StatusMap, BackendError> {
        self.record(BackendCall::SessionStatus)?;
        Ok(self.statuses.lock().unwrap().clone())
    }

    async fn list_messages(
        &self,
        session_id: &str,
        _directory: &str,
    ) -> Result<Vec<MessageRecord>, BackendError> {
        self.record(BackendCall::ListMessages {
            session_id: session_id.to_string(),
        })?;
        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_projects(&self, _directory: &str) -> Result<Vec<ProjectInfo>, BackendError> {
        self.record(BackendCall::ListProjects)?;
        Ok(self.projects.lock().unwrap().clone())
    }

    async fn subscribe_events(&self, _directory: &str) -> Result<EventStream, BackendError> {
        if self.failing.lock().unwrap().contains("subscribe_events") {
            return Err(BackendError::Stream("mock subscribe failure".to_string()));
        }
        let events: Vec<_> = self.events.lock().unwrap().drain(..).collect();
        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }
}

#[async_trait]
impl Notifier for MockBackend {
    async fn notify(&self, message: &str, variant: ToastVariant) -> Result<(), BackendError> {
        self.record(BackendCall::Notify {
            message: message.to_string(),
            variant,
        })
    }
}
