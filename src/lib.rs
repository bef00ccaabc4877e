//! Handoff - 会话接力编排器
//!
//! 模块划分：
//! - **agents**: agent 发现（名称与描述，用于工具说明）
//! - **backend**: 会话宿主远程操作抽象（HTTP / Mock）、事件流解码
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 执行上下文、待执行状态、工作流引擎、事件反应器、进程装配
//! - **observability**: 日志初始化
//! - **reporting**: 会话 / 项目只读报告
//! - **server**: stdin / stdout 行协议
//! - **tools**: 工具注册表、执行器与四个工具

pub mod agents;
pub mod backend;
pub mod config;
pub mod core;
pub mod observability;
pub mod reporting;
pub mod server;
pub mod tools;

pub use crate::core::{Handoff, HandoffBuilder, Orchestrator};
