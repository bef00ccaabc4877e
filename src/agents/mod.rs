//! Agent 发现：读取名称与描述，用于工具说明

pub mod discovery;

pub use discovery::{describe_agents, AgentDiscovery, AgentMode, AgentProfile};
