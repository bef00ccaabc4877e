//! 后端抽象
//!
//! 编排器只通过 `Backend` 访问会话宿主（创建、分叉、发送、压缩、查询、事件订阅），
//! 通知用户走独立的 `Notifier`，便于测试中分别断言。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use super::error::BackendError;
use super::events::BackendEvent;
use super::types::{
    MessageRecord, ProjectInfo, PromptRequest, SessionInfo, StatusMap,
    SummarizeRequest, ToastVariant,
};

/// 生命周期事件流
pub type EventStream = Pin<Box<dyn Stream<Item = Result<BackendEvent, BackendError>> + Send>>;

/// 会话宿主的远程操作
#[async_trait]
pub trait Backend: Send + Sync {
    async fn create_session(
        &self,
        directory: &str,
        title: Option<&str>,
    ) -> Result<SessionInfo, BackendError>;

    /// 复制完整历史，返回新会话
    async fn fork_session(
        &self,
        session_id: &str,
        directory: &str,
    ) -> Result<SessionInfo, BackendError>;

    async fn update_session_title(
        &self,
        session_id: &str,
        directory: &str,
        title: &str,
    ) -> Result<(), BackendError>;

    /// 发送并等待本轮回复完成
    async fn send_prompt(
        &self,
        session_id: &str,
        directory: &str,
        request: PromptRequest,
    ) -> Result<(), BackendError>;

    /// 发送后立即返回（后端受理即可）
    async fn send_prompt_async(
        &self,
        session_id: &str,
        directory: &str,
        request: PromptRequest,
    ) -> Result<(), BackendError>;

    /// 触发压缩；完成时后端发出 compacted 事件
    async fn summarize(
        &self,
        session_id: &str,
        directory: &str,
        request: SummarizeRequest,
    ) -> Result<(), BackendError>;

    async fn list_sessions(&self, directory: &str) -> Result<Vec<SessionInfo>, BackendError>;

    async fn session_status(&self, directory: &str) -> Result<StatusMap, BackendError>;

    async fn list_messages(
        &self,
        session_id: &str,
        directory: &str,
    ) -> Result<Vec<MessageRecord>, BackendError>;

    async fn list_projects(&self, directory: &str) -> Result<Vec<ProjectInfo>, BackendError>;

    /// 订阅生命周期事件流
    async fn subscribe_events(&self, directory: &str) -> Result<EventStream, BackendError>;
}

/// 尽力而为的用户通知通道
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str, variant: ToastVariant) -> Result<(), BackendError>;
}

