//! 编排器：显式持有的进程级状态
//!
//! 负责：持有后端 / 通知通道 / 三张待执行表与运行参数；进程启动时构造一次，
//! 以 `Arc` 同时交给工具处理器（workflow）与事件处理器（reactor）。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Backend, Notifier, PromptRequest, ToastVariant};
use crate::config::AppConfig;
use crate::core::{OrchestratorError, PendingState};

/// compacted 事件后等待后端释放会话锁的时长。
///
/// 后端在内部锁真正释放前就发出 compacted，立即发送会被拒绝；这是经验值，
/// 正确性依赖后端未明确规定的释放时序。
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 100;

/// 编排器运行参数
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub settle_delay: Duration,
    pub notify_errors: bool,
    pub reconnect_delay: Duration,
    /// 同步发送（new / fork 首条消息、compact 标记）等待回复的上限
    pub prompt_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            notify_errors: true,
            reconnect_delay: Duration::from_millis(1000),
            prompt_timeout: Duration::from_secs(300),
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            settle_delay: Duration::from_millis(cfg.orchestrator.settle_delay_ms),
            notify_errors: cfg.orchestrator.notify_errors,
            reconnect_delay: Duration::from_millis(cfg.backend.reconnect_delay_ms),
            prompt_timeout: Duration::from_secs(cfg.orchestrator.tool_timeout_secs),
        }
    }
}

/// 延迟动作编排器
pub struct Orchestrator {
    pub(crate) backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
    pub(crate) pending: PendingState,
    pub(crate) settings: OrchestratorSettings,
    compaction_attempts: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn Backend>,
        notifier: Arc<dyn Notifier>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            backend,
            notifier,
            pending: PendingState::new(),
            settings,
            compaction_attempts: AtomicU64::new(0),
        }
    }

    pub(crate) fn next_compaction_attempt(&self) -> u64 {
        self.compaction_attempts.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn pending(&self) -> &PendingState {
        &self.pending
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// 后台发送通知；失败只记日志，不阻塞也不影响调用方
    pub fn notify_in_background(&self, message: String, variant: ToastVariant) {
        if !self.settings.notify_errors {
            return;
        }
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&message, variant).await {
                tracing::debug!("Notification failed: {}", e);
            }
        });
    }

    /// 同步发送 prompt，超过 `prompt_timeout` 记为 `PromptTimeout`
    pub(crate) async fn send_prompt_bounded(
        &self,
        session_id: &str,
        directory: &str,
        prompt: PromptRequest,
    ) -> Result<(), OrchestratorError> {
        let limit = self.settings.prompt_timeout;
        match tokio::time::timeout(limit, self.backend.send_prompt(session_id, directory, prompt)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(OrchestratorError::PromptTimeout {
                session_id: session_id.to_string(),
                secs: limit.as_secs(),
            }),
        }
    }

    /// 将错误转为返回给调用方的文本；远程失败额外通知用户
    pub fn report_error(&self, err: &OrchestratorError) -> String {
        tracing::warn!("Workflow failed: {}", err);
        if err.is_remote() {
            self.notify_in_background(format!("Session workflow failed: {err}"), ToastVariant::Error);
        }
        format!("Error: {err}")
    }
}
