//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HANDOFF__*` 覆盖（双下划线表示嵌套，如 `HANDOFF__BACKEND__BASE_URL=http://...`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::DEFAULT_SETTLE_DELAY_MS;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendSection,
    pub orchestrator: OrchestratorSection,
    pub reporting: ReportingSection,
    pub agents: AgentsSection,
    pub log: LogSection,
}

/// [backend] 段：会话宿主地址、工作目录、超时与重连
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 默认工作目录，未设置时用进程当前目录
    pub directory: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 事件流断开后的重连间隔（毫秒）
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            directory: None,
            request_timeout_secs: default_request_timeout_secs(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl BackendSection {
    /// 配置目录 > 当前目录
    pub fn resolve_directory(&self) -> String {
        self.directory.clone().unwrap_or_else(|| {
            std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| ".".to_string())
        })
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:4096".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

/// [orchestrator] 段：settle 延迟、错误通知、工具超时
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSection {
    /// compacted 事件后发送续接前的等待（毫秒）
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_true")]
    pub notify_errors: bool,
    /// 单次工具调用超时（秒）；同步 new / fork 需等待整轮回复
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            notify_errors: true,
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_settle_delay_ms() -> u64 {
    DEFAULT_SETTLE_DELAY_MS
}

fn default_true() -> bool {
    true
}

fn default_tool_timeout_secs() -> u64 {
    300
}

/// [reporting] 段：列表条数与消息预览
#[derive(Debug, Clone, Deserialize)]
pub struct ReportingSection {
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_last_messages")]
    pub last_messages: usize,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for ReportingSection {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            last_messages: default_last_messages(),
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_max_sessions() -> usize {
    20
}

fn default_last_messages() -> usize {
    3
}

fn default_preview_chars() -> usize {
    200
}

/// [agents] 段：额外的 agent 目录、是否包含内置 agent
#[derive(Debug, Clone, Deserialize)]
pub struct AgentsSection {
    #[serde(default)]
    pub search_dirs: Vec<PathBuf>,
    #[serde(default = "default_true")]
    pub include_builtin: bool,
}

impl Default for AgentsSection {
    fn default() -> Self {
        Self {
            search_dirs: Vec::new(),
            include_builtin: true,
        }
    }
}

/// [log] 段：默认日志级别（RUST_LOG 优先）
#[derive(Debug, Clone, Deserialize)]
pub struct LogSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 从 config 目录加载配置，环境变量 HANDOFF__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HANDOFF__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HANDOFF")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.backend.base_url, "http://127.0.0.1:4096");
        assert_eq!(cfg.orchestrator.settle_delay_ms, DEFAULT_SETTLE_DELAY_MS);
        assert!(cfg.orchestrator.notify_errors);
        assert_eq!(cfg.reporting.last_messages, 3);
        assert!(cfg.agents.include_builtin);
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handoff.toml");
        std::fs::write(
            &path,
            "[backend]\nbase_url = \"http://10.0.0.2:4096\"\n\n[orchestrator]\nsettle_delay_ms = 250\n",
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.backend.base_url, "http://10.0.0.2:4096");
        assert_eq!(cfg.orchestrator.settle_delay_ms, 250);
        assert_eq!(cfg.backend.request_timeout_secs, 30);
    }
}
