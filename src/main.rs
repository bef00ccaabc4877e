//! Handoff - 会话接力编排器
//!
//! 入口：加载配置、初始化日志、装配编排器，并发运行事件循环与 stdin 工具协议。

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use handoff::{config::load_config, core::run_event_loop, observability, server, HandoffBuilder};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

/// 会话接力编排器：stdin / stdout 工具协议 + 后端事件循环
#[derive(Parser, Debug)]
#[command(name = "handoff", about = "Deferred cross-session relay, compaction and fork")]
struct Cli {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(long, env = "HANDOFF_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (cfg, config_error) = match load_config(Cli::parse().config) {
        Ok(cfg) => (cfg, None),
        Err(e) => (Default::default(), Some(e)),
    };
    observability::init(&cfg.log.level);
    if let Some(e) = config_error {
        tracing::warn!("Failed to load config, using defaults: {}", e);
    }

    let handoff = HandoffBuilder::new(cfg)
        .build()
        .context("Failed to create backend client")?;
    tracing::info!(directory = %handoff.directory, "Handoff starting");

    let cancel = CancellationToken::new();
    let events = tokio::spawn(run_event_loop(
        handoff.orchestrator.clone(),
        handoff.directory.clone(),
        cancel.clone(),
    ));

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl+C, shutting down");
                shutdown.cancel();
            }
            Err(e) => tracing::warn!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    let stdin = BufReader::new(tokio::io::stdin());
    let result = server::serve(
        handoff.executor.clone(),
        stdin,
        tokio::io::stdout(),
        cancel.clone(),
    )
    .await
    .context("Tool protocol failed");

    cancel.cancel();
    events.await.context("Event loop task panicked")?;
    tracing::info!("Handoff stopped");
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_config_flag() {
        let cli = Cli::parse_from(["handoff", "--config", "/etc/handoff.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/handoff.toml")));

        let cli = Cli::parse_from(["handoff", "--config=local.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("local.toml")));
    }

    #[test]
    fn test_cli_without_config() {
        std::env::remove_var("HANDOFF_CONFIG");
        let cli = Cli::parse_from(["handoff"]);
        assert!(cli.config.is_none());
    }
}
