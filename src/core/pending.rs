//! 待执行状态存储
//!
//! 三个相互独立、按会话 ID 键控的表：待发送中继、待压缩请求、进行中的压缩。
//! 每表每会话至多一条，put 覆盖（后写者胜），take 原子地读出并删除。无 TTL，进程重启即丢失。

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::backend::SessionId;
use crate::core::ExecutionContext;

/// 按会话键控的单槽表
#[derive(Debug)]
pub struct PendingStore<T> {
    entries: RwLock<HashMap<SessionId, T>>,
}

impl<T> Default for PendingStore<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> PendingStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入并返回被覆盖的旧值
    pub async fn put(&self, session_id: &str, value: T) -> Option<T> {
        self.entries
            .write()
            .await
            .insert(session_id.to_string(), value)
    }

    pub async fn take(&self, session_id: &str) -> Option<T> {
        self.entries.write().await.remove(session_id)
    }

    /// 仅当现值满足条件时取出
    pub async fn take_if(&self, session_id: &str, pred: impl FnOnce(&T) -> bool) -> Option<T> {
        let mut entries = self.entries.write().await;
        if entries.get(session_id).is_some_and(pred) {
            entries.remove(session_id)
        } else {
            None
        }
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.entries.read().await.contains_key(session_id)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl<T: Clone> PendingStore<T> {
    /// 只读查看（测试 / 诊断用）
    pub async fn get(&self, session_id: &str) -> Option<T> {
        self.entries.read().await.get(session_id).cloned()
    }
}

/// 等会话空闲后发送的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRelay {
    pub context: ExecutionContext,
    pub text: String,
    pub directory: String,
}

/// 当前轮结束后先压缩、再续接的请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCompaction {
    pub context: ExecutionContext,
    pub provider_id: String,
    pub model_id: String,
    pub text: String,
    pub directory: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionPhase {
    /// summarize 已发出，等待 compacted 事件
    Summarizing,
}

/// 后端正在执行的压缩
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveCompaction {
    pub payload: PendingCompaction,
    pub phase: CompactionPhase,
    /// 进程内递增的序号，区分同一会话先后发起的压缩
    pub attempt: u64,
}

impl ActiveCompaction {
    pub fn new(payload: PendingCompaction, attempt: u64) -> Self {
        Self {
            payload,
            phase: CompactionPhase::Summarizing,
            attempt,
        }
    }
}

/// 编排器持有的全部可变状态
#[derive(Debug, Default)]
pub struct PendingState {
    pub relays: PendingStore<PendingRelay>,
    pub compactions: PendingStore<PendingCompaction>,
    pub active: PendingStore<ActiveCompaction>,
}

impl PendingState {
    pub fn new() -> Self {
        Self::default()
    }
}
