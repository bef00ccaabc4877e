//! 后端生命周期事件：类型化事件与 SSE 增量解码
//!
//! 事件 JSON 形如 `{"type": "session.idle", "properties": {"sessionID": "..."}}`。
//! 只识别 idle / compacted 两类，其余一律归入 `Other`，由 Reactor 忽略。

use serde::Deserialize;

use super::types::SessionId;

pub const IDLE_EVENT: &str = "session.idle";
pub const COMPACTED_EVENT: &str = "session.compacted";

/// 类型化后端事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// 会话当前轮次结束，会话锁已释放
    Idle { session_id: SessionId },
    /// 会话压缩完成（后端锁可能尚未释放）
    Compacted { session_id: SessionId },
    /// 其它事件（仅保留类型名用于日志）
    Other(String),
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    properties: Option<RawProperties>,
}

#[derive(Deserialize)]
struct RawProperties {
    #[serde(default, rename = "sessionID")]
    session_id: Option<String>,
}

impl BackendEvent {
    /// 从一条事件 JSON 解析；缺少 sessionID 的 idle / compacted 也视为 `Other`
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        let raw: RawEvent = serde_json::from_str(data)?;
        let session_id = raw.properties.and_then(|p| p.session_id);
        Ok(match (raw.kind.as_str(), session_id) {
            (IDLE_EVENT, Some(session_id)) => BackendEvent::Idle { session_id },
            (COMPACTED_EVENT, Some(session_id)) => BackendEvent::Compacted { session_id },
            _ => BackendEvent::Other(raw.kind),
        })
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            BackendEvent::Idle { session_id } | BackendEvent::Compacted { session_id } => {
                Some(session_id)
            }
            BackendEvent::Other(_) => None,
        }
    }
}

/// SSE 增量解码器：喂入任意切分的字节块，产出完整的 `data` 载荷
///
/// 按字节缓冲到换行再解码，避免多字节字符被切断在两个块之间。
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一块字节，返回本块中完成的所有事件载荷（多行 data 以 `\n` 拼接）
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                if !self.data.is_empty() {
                    out.push(self.data.join("\n"));
                    self.data.clear();
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }
            if let Some(value) = line.strip_prefix("data:") {
                self.data.push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
        }
        out
    }
}
