//! 只读报告：会话列表、会话详情、项目列表
//!
//! 每次调用独立、无状态，把后端记录转为按行排列的文本。

use chrono::{DateTime, SecondsFormat};

use crate::backend::{Backend, BackendError, MessageRecord, Role, SessionStatus, StatusMap};
use crate::config::ReportingSection;

/// 列出目录下的会话，按更新时间倒序
pub async fn list_sessions(
    backend: &dyn Backend,
    directory: &str,
    opts: &ReportingSection,
) -> Result<String, BackendError> {
    let mut sessions = backend.list_sessions(directory).await?;
    if sessions.is_empty() {
        return Ok(format!("No sessions found in {directory}."));
    }
    let statuses = backend.session_status(directory).await?;
    sessions.sort_by(|a, b| b.time.updated.cmp(&a.time.updated));

    let total = sessions.len();
    let mut lines: Vec<String> = sessions
        .iter()
        .take(opts.max_sessions)
        .map(|s| {
            format!(
                "- {} | {} | {} | updated {}",
                s.id,
                display_title(&s.title),
                status_label(&statuses, &s.id),
                format_millis(s.time.updated)
            )
        })
        .collect();
    if total > opts.max_sessions {
        lines.push(format!("... and {} more", total - opts.max_sessions));
    }
    Ok(format!("Sessions in {directory} ({total}):\n{}", lines.join("\n")))
}

/// 会话标题、状态与最近几条消息
pub async fn session_info(
    backend: &dyn Backend,
    session_id: &str,
    directory: &str,
    opts: &ReportingSection,
) -> Result<String, BackendError> {
    let sessions = backend.list_sessions(directory).await?;
    let statuses = backend.session_status(directory).await?;
    let messages = backend.list_messages(session_id, directory).await?;

    let session = sessions.iter().find(|s| s.id == session_id);
    let mut out = vec![
        format!("Session: {session_id}"),
        format!(
            "Title: {}",
            session.map(|s| display_title(&s.title)).unwrap_or("(unknown)")
        ),
        format!(
            "Directory: {}",
            session.map(|s| s.directory.as_str()).unwrap_or(directory)
        ),
        format!("Status: {}", status_label(&statuses, session_id)),
        format!("Messages: {}", messages.len()),
    ];

    let start = messages.len().saturating_sub(opts.last_messages);
    if start < messages.len() {
        out.push(format!("Last {} messages:", messages.len() - start));
        for record in &messages[start..] {
            out.push(format!(
                "[{}] {}",
                role_label(record),
                preview(&record.text(), opts.preview_chars)
            ));
        }
    }
    Ok(out.join("\n"))
}

/// 列出后端已知的项目
pub async fn list_projects(backend: &dyn Backend, directory: &str) -> Result<String, BackendError> {
    let projects = backend.list_projects(directory).await?;
    if projects.is_empty() {
        return Ok("No projects found.".to_string());
    }
    let lines: Vec<String> = projects
        .iter()
        .map(|p| {
            format!(
                "- {} | {} | {}",
                p.id,
                p.worktree,
                p.vcs.as_deref().unwrap_or("no vcs")
            )
        })
        .collect();
    Ok(format!("Projects ({}):\n{}", projects.len(), lines.join("\n")))
}

fn display_title(title: &str) -> &str {
    if title.trim().is_empty() {
        "(untitled)"
    } else {
        title
    }
}

fn status_label(statuses: &StatusMap, session_id: &str) -> String {
    statuses
        .get(session_id)
        .map(SessionStatus::label)
        .unwrap_or_else(|| SessionStatus::idle().label())
}

fn role_label(record: &MessageRecord) -> String {
    match (record.info.role, &record.info.agent) {
        (Role::Assistant, Some(agent)) => format!("assistant:{agent}"),
        (Role::Assistant, None) => "assistant".to_string(),
        (Role::User, _) => "user".to_string(),
        (Role::Other, _) => "other".to_string(),
    }
}

fn format_millis(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| "unknown".to_string())
}

/// 单行预览，超出部分以 `...` 截断
fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.is_empty() {
        return "(no text)".to_string();
    }
    if flat.chars().count() > max_chars {
        format!("{}...", flat.chars().take(max_chars).collect::<String>())
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{assistant_record, user_record};
    use crate::backend::{MockBackend, ProjectInfo, SessionInfo, SessionTime};

    fn session(id: &str, title: &str, updated: i64) -> SessionInfo {
        SessionInfo {
            id: id.to_string(),
            title: title.to_string(),
            directory: "/w".to_string(),
            parent_id: None,
            time: SessionTime {
                created: 0,
                updated,
            },
        }
    }

    #[tokio::test]
    async fn test_list_sessions_sorted_with_status() {
        let backend = MockBackend::new();
        backend.set_sessions(vec![
            session("ses_a", "Old", 1_000),
            session("ses_b", "", 2_000),
        ]);
        let mut statuses = StatusMap::new();
        statuses.insert(
            "ses_b".into(),
            SessionStatus {
                kind: "busy".into(),
                attempt: None,
            },
        );
        backend.set_statuses(statuses);

        let out = list_sessions(&backend, "/w", &ReportingSection::default())
            .await
            .unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Sessions in /w (2):");
        assert!(lines[1].starts_with("- ses_b | (untitled) | busy | updated 1970-01-01T00:00:02Z"));
        assert!(lines[2].contains("ses_a | Old | idle"));
    }

    #[tokio::test]
    async fn test_list_sessions_truncates() {
        let backend = MockBackend::new();
        backend.set_sessions((0..5).map(|i| session(&format!("s{i}"), "t", i)).collect());
        let opts = ReportingSection {
            max_sessions: 2,
            ..Default::default()
        };
        let out = list_sessions(&backend, "/w", &opts).await.unwrap();
        assert!(out.ends_with("... and 3 more"));
    }

    #[tokio::test]
    async fn test_session_info_shows_last_messages() {
        let backend = MockBackend::new();
        backend.set_sessions(vec![session("ses_a", "Feature work", 1)]);
        backend.set_messages(
            "ses_a",
            vec![
                user_record("u1", "first"),
                assistant_record("a1", Some("build"), None, None),
                user_record("u2", "third   message\nwith newline"),
            ],
        );
        let opts = ReportingSection {
            last_messages: 2,
            ..Default::default()
        };
        let out = session_info(&backend, "ses_a", "/w", &opts).await.unwrap();
        assert!(out.contains("Title: Feature work"));
        assert!(out.contains("Messages: 3"));
        assert!(out.contains("[assistant:build] reply a1"));
        assert!(out.contains("[user] third message with newline"));
        assert!(!out.contains("first"));
    }

    #[tokio::test]
    async fn test_list_projects() {
        let backend = MockBackend::new();
        backend.set_projects(vec![ProjectInfo {
            id: "p1".into(),
            worktree: "/repo".into(),
            vcs: Some("git".into()),
        }]);
        let out = list_projects(&backend, "/w").await.unwrap();
        assert_eq!(out, "Projects (1):\n- p1 | /repo | git");
    }

    #[test]
    fn test_preview_truncates_on_chars() {
        assert_eq!(preview("你好世界", 2), "你好...");
        assert_eq!(preview("  ", 5), "(no text)");
    }
}
