//! Agent 发现
//!
//! 从内置列表、`opencode.json` 的 `agent` 段以及 agent 目录下带 YAML frontmatter 的
//! Markdown 文件收集 agent 名称与描述，仅用于生成工具说明。
//! 无法解析的文件与配置直接跳过，不影响启动。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::AgentsSection;

/// agent 可被选择的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    Primary,
    Subagent,
    All,
}

/// 一个可用的 agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentProfile {
    pub name: String,
    pub description: Option<String>,
    pub mode: AgentMode,
}

/// frontmatter / opencode.json 中 agent 条目的公共字段
#[derive(Debug, Default, Deserialize)]
struct AgentSpec {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    mode: Option<AgentMode>,
    #[serde(default)]
    disable: bool,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    agent: BTreeMap<String, AgentSpec>,
}

/// Agent 发现器
pub struct AgentDiscovery {
    agent_dirs: Vec<PathBuf>,
    config_files: Vec<PathBuf>,
    include_builtin: bool,
}

impl AgentDiscovery {
    pub fn new(agent_dirs: Vec<PathBuf>, config_files: Vec<PathBuf>, include_builtin: bool) -> Self {
        Self {
            agent_dirs,
            config_files,
            include_builtin,
        }
    }

    /// 全局配置目录 → 项目目录 → 配置中的额外目录，后者同名覆盖前者
    pub fn for_directory(directory: &Path, cfg: &AgentsSection) -> Self {
        let mut agent_dirs = Vec::new();
        let mut config_files = Vec::new();
        if let Some(home) = config_home() {
            let global = home.join("opencode");
            agent_dirs.push(global.join("agent"));
            agent_dirs.push(global.join("agents"));
            config_files.push(global.join("opencode.json"));
        }
        config_files.push(directory.join("opencode.json"));
        config_files.push(directory.join(".opencode").join("opencode.json"));
        agent_dirs.push(directory.join(".opencode").join("agent"));
        agent_dirs.push(directory.join(".opencode").join("agents"));
        agent_dirs.extend(cfg.search_dirs.iter().cloned());
        Self::new(agent_dirs, config_files, cfg.include_builtin)
    }

    /// 收集所有可作为主 agent 的条目（subagent 与 disable 的除外），按名称排序
    pub fn discover(&self) -> Vec<AgentProfile> {
        let mut found: BTreeMap<String, Option<AgentProfile>> = BTreeMap::new();

        if self.include_builtin {
            for profile in builtin_agents() {
                found.insert(profile.name.clone(), Some(profile));
            }
        }

        for path in &self.config_files {
            let Some(config) = read_config_file(path) else {
                continue;
            };
            for (name, spec) in config.agent {
                let entry = to_profile(&name, spec, found.get(&name).cloned().flatten());
                found.insert(name, entry);
            }
        }

        for dir in &self.agent_dirs {
            for (name, spec) in read_agent_dir(dir) {
                let entry = to_profile(&name, spec, found.get(&name).cloned().flatten());
                found.insert(name, entry);
            }
        }

        let agents: Vec<AgentProfile> = found
            .into_values()
            .flatten()
            .filter(|a| a.mode != AgentMode::Subagent)
            .collect();
        tracing::debug!("Discovered {} agents", agents.len());
        agents
    }
}

fn config_home() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
}

fn builtin_agents() -> Vec<AgentProfile> {
    vec![
        AgentProfile {
            name: "build".to_string(),
            description: Some("Default agent with full tool access for implementing changes.".to_string()),
            mode: AgentMode::Primary,
        },
        AgentProfile {
            name: "plan".to_string(),
            description: Some("Planning agent; analyzes and proposes without editing files.".to_string()),
            mode: AgentMode::Primary,
        },
    ]
}

/// 合并一条定义；disable 返回 None 以屏蔽同名的早先条目
fn to_profile(name: &str, spec: AgentSpec, previous: Option<AgentProfile>) -> Option<AgentProfile> {
    if spec.disable {
        return None;
    }
    Some(AgentProfile {
        name: name.to_string(),
        description: spec
            .description
            .or_else(|| previous.as_ref().and_then(|p| p.description.clone())),
        mode: spec
            .mode
            .or_else(|| previous.as_ref().map(|p| p.mode))
            .unwrap_or(AgentMode::All),
    })
}

fn read_config_file(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

/// 读取目录下的 `*.md`，文件名（不含扩展名）即 agent 名
fn read_agent_dir(dir: &Path) -> Vec<(String, AgentSpec)> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let pattern = dir.join("*.md");
    let Ok(paths) = glob::glob(&pattern.to_string_lossy()) else {
        return Vec::new();
    };
    let mut specs = Vec::new();
    for path in paths.flatten() {
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        if let Some(spec) = parse_frontmatter(&content) {
            specs.push((name.to_string(), spec));
        }
    }
    specs
}

/// 解析 `---` 包围的 YAML frontmatter；没有 frontmatter 视为空定义，格式错误返回 None
fn parse_frontmatter(content: &str) -> Option<AgentSpec> {
    let content = content.trim_start_matches('\u{FEFF}');
    let Some(rest) = content.strip_prefix("---") else {
        return Some(AgentSpec::default());
    };
    let end = rest.find("\n---")?;
    let yaml = &rest[..end];
    if yaml.trim().is_empty() {
        return Some(AgentSpec::default());
    }
    serde_yaml::from_str(yaml).ok()
}

/// 渲染为工具说明中的 agent 列表
pub fn describe_agents(agents: &[AgentProfile]) -> String {
    if agents.is_empty() {
        return "No agents discovered; pass any agent name configured on the backend.".to_string();
    }
    let lines: Vec<String> = agents
        .iter()
        .map(|a| match &a.description {
            Some(d) => format!("- {}: {}", a.name, d.trim()),
            None => format!("- {}", a.name),
        })
        .collect();
    format!("Available agents:\n{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_discovers_markdown_and_config_agents() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(
            &root.join(".opencode/agent/reviewer.md"),
            "---\ndescription: Reviews diffs\nmode: primary\n---\nYou review code.\n",
        );
        write(
            &root.join(".opencode/agent/helper.md"),
            "---\ndescription: Internal helper\nmode: subagent\n---\n",
        );
        write(&root.join(".opencode/agent/broken.md"), "---\ndescription: [unclosed\n---\n");
        write(
            &root.join("opencode.json"),
            r#"{"agent": {"docs": {"description": "Writes docs"}, "plan": {"disable": true}}}"#,
        );

        let discovery = AgentDiscovery::new(
            vec![root.join(".opencode/agent")],
            vec![root.join("opencode.json")],
            true,
        );
        let names: Vec<String> = discovery.discover().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["build", "docs", "reviewer"]);
    }

    #[test]
    fn test_file_without_frontmatter_keeps_builtin_description() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("build.md"), "Just a prompt body.");
        let discovery = AgentDiscovery::new(vec![dir.path().to_path_buf()], vec![], true);
        let agents = discovery.discover();
        let build = agents.iter().find(|a| a.name == "build").unwrap();
        assert!(build.description.as_deref().unwrap().contains("Default agent"));
    }

    #[test]
    fn test_malformed_config_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("opencode.json"), "{ not json");
        let discovery =
            AgentDiscovery::new(vec![], vec![dir.path().join("opencode.json")], false);
        assert!(discovery.discover().is_empty());
    }

    #[test]
    fn test_describe_agents() {
        let text = describe_agents(&builtin_agents());
        assert!(text.starts_with("Available agents:"));
        assert!(text.contains("- plan: Planning agent"));
    }
}
