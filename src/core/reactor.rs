//! 事件反应器：后端生命周期事件的唯一分发点
//!
//! idle：先查待发中继（后登记的中继不能被更早的压缩请求遮蔽），再查待压缩请求；
//! compacted：取出进行中的压缩，等待 settle 延迟后发送续接消息。
//! summarize 调用在后台任务中执行，失败时由 `abandon_compaction` 清除进行中的条目（不重试）。

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendEvent, ModelRef, SummarizeRequest, ToastVariant};
use crate::core::{ActiveCompaction, Orchestrator, PendingCompaction};

/// 单个事件引起的状态迁移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorAction {
    /// idle：待发中继已发出
    RelaySent,
    /// idle：待发中继已取出但发送失败
    RelayFailed,
    /// idle：待压缩请求已提升为进行中并触发 summarize
    CompactionStarted,
    /// compacted：续接消息已发出
    ContinuationSent,
    /// compacted：续接消息发送失败
    ContinuationFailed,
    /// 无匹配状态或无关事件
    Ignored,
}

impl Orchestrator {
    /// 处理一个事件；调用方须按到达顺序逐个调用
    pub async fn handle_event(self: &Arc<Self>, event: BackendEvent) -> ReactorAction {
        match event {
            BackendEvent::Idle { session_id } => self.on_idle(&session_id).await,
            BackendEvent::Compacted { session_id } => self.on_compacted(&session_id).await,
            BackendEvent::Other(kind) => {
                tracing::trace!(event = %kind, "Ignoring event");
                ReactorAction::Ignored
            }
        }
    }

    async fn on_idle(self: &Arc<Self>, session_id: &str) -> ReactorAction {
        if let Some(relay) = self.pending.relays.take(session_id).await {
            tracing::info!(session = %session_id, agent = ?relay.context.agent, "Sending relayed message");
            let result = match relay.context.to_prompt(&relay.text) {
                Ok(prompt) => self
                    .backend
                    .send_prompt_async(session_id, &relay.directory, prompt)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            return match result {
                Ok(()) => ReactorAction::RelaySent,
                Err(e) => {
                    tracing::warn!(session = %session_id, "Relay failed: {}", e);
                    self.notify_in_background(
                        format!("Failed to relay message to session {session_id}: {e}"),
                        ToastVariant::Error,
                    );
                    ReactorAction::RelayFailed
                }
            };
        }

        if let Some(pending) = self.pending.compactions.take(session_id).await {
            self.begin_compaction(session_id, pending).await;
            return ReactorAction::CompactionStarted;
        }

        tracing::debug!(session = %session_id, "Idle with nothing pending");
        ReactorAction::Ignored
    }

    /// 将待压缩请求提升为进行中，并在后台发出 summarize（不等待其完成）
    pub async fn begin_compaction(
        self: &Arc<Self>,
        session_id: &str,
        pending: PendingCompaction,
    ) -> JoinHandle<()> {
        let request = SummarizeRequest {
            provider_id: pending.provider_id.clone(),
            model_id: pending.model_id.clone(),
        };
        let directory = pending.directory.clone();
        let attempt = self.next_compaction_attempt();
        self.pending
            .active
            .put(session_id, ActiveCompaction::new(pending, attempt))
            .await;
        tracing::info!(
            session = %session_id,
            model = %format!("{}/{}", request.provider_id, request.model_id),
            "Starting compaction"
        );

        let this = Arc::clone(self);
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = this.backend.summarize(&session_id, &directory, request).await {
                tracing::warn!(session = %session_id, "Compaction failed: {}", e);
                this.abandon_compaction(&session_id, attempt).await;
            }
        })
    }

    /// summarize 失败后的迁移：删除该次进行中的压缩，不重试、不通知
    ///
    /// 同一会话之后发起的压缩（序号不同）保持原样。
    pub async fn abandon_compaction(
        &self,
        session_id: &str,
        attempt: u64,
    ) -> Option<ActiveCompaction> {
        let dropped = self
            .pending
            .active
            .take_if(session_id, |active| active.attempt == attempt)
            .await;
        if dropped.is_some() {
            tracing::info!(session = %session_id, "Dropped active compaction");
        }
        dropped
    }

    async fn on_compacted(&self, session_id: &str) -> ReactorAction {
        let Some(active) = self.pending.active.take(session_id).await else {
            tracing::debug!(session = %session_id, "Compacted without active compaction");
            return ReactorAction::Ignored;
        };

        tokio::time::sleep(self.settings.settle_delay).await;

        let payload = active.payload;
        let result = payload.context.to_prompt(&payload.text).map(|mut prompt| {
            prompt.model = Some(ModelRef {
                provider_id: payload.provider_id.clone(),
                model_id: payload.model_id.clone(),
            });
            prompt
        });
        let result = match result {
            Ok(prompt) => self
                .backend
                .send_prompt_async(session_id, &payload.directory, prompt)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match result {
            Ok(()) => {
                tracing::info!(session = %session_id, agent = ?payload.context.agent, "Sent post-compaction continuation");
                ReactorAction::ContinuationSent
            }
            Err(e) => {
                tracing::warn!(session = %session_id, "Continuation failed: {}", e);
                self.notify_in_background(
                    format!("Failed to continue session {session_id} after compaction: {e}"),
                    ToastVariant::Error,
                );
                ReactorAction::ContinuationFailed
            }
        }
    }
}

/// 订阅后端事件并逐个分发；流结束或出错后按 `reconnect_delay` 重连，直到取消
pub async fn run_event_loop(
    orchestrator: Arc<Orchestrator>,
    directory: String,
    cancel: CancellationToken,
) {
    let reconnect_delay = orchestrator.settings.reconnect_delay;
    while !cancel.is_cancelled() {
        match orchestrator.backend.subscribe_events(&directory).await {
            Ok(mut events) => loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    next = events.next() => match next {
                        Some(Ok(event)) => {
                            orchestrator.handle_event(event).await;
                        }
                        Some(Err(e)) => {
                            tracing::warn!("Event stream error: {}", e);
                            break;
                        }
                        None => {
                            tracing::info!("Event stream ended");
                            break;
                        }
                    },
                }
            },
            Err(e) => tracing::warn!("Event subscription failed: {}", e),
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }
}
