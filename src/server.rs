//! 工具协议：stdin 逐行读取 JSON 请求，stdout 逐行写出 JSON 响应
//!
//! 请求：`{"id": 1, "method": "tools/list"}` 或
//! `{"id": 2, "method": "tools/call", "tool": "session", "args": {...}, "context": {"sessionID": "...", "directory": "..."}}`。
//! 每个 tools/call 在 JoinSet 中独立执行（同步 new / fork 可能等待整轮回复），响应按完成顺序写出。

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::tools::{with_context, ToolContext, ToolExecutor};

/// 一行请求
#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Value,
    #[serde(flatten)]
    pub method: Method,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "method")]
pub enum Method {
    #[serde(rename = "tools/list")]
    ListTools,
    #[serde(rename = "tools/call")]
    CallTool {
        tool: String,
        #[serde(default)]
        args: Value,
        #[serde(default)]
        context: Option<ToolContext>,
    },
}

/// 一行响应：`result` 与 `error` 二选一
#[derive(Debug, Serialize)]
pub struct Response {
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(message.into()),
        }
    }
}

/// 处理单个请求
pub async fn handle_request(executor: &ToolExecutor, request: Request) -> Response {
    match request.method {
        Method::ListTools => Response::ok(
            request.id,
            serde_json::json!({ "tools": executor.registry().tool_definitions() }),
        ),
        Method::CallTool {
            tool,
            args,
            context,
        } => {
            let result = match context {
                Some(context) => with_context(context, executor.execute(&tool, args)).await,
                None => executor.execute(&tool, args).await,
            };
            match result {
                Ok(content) => Response::ok(request.id, serde_json::json!({ "content": content })),
                Err(e) => Response::error(request.id, e.to_string()),
            }
        }
    }
}

/// 读取请求直到输入结束或取消；输入结束后等待所有进行中的调用写出响应
///
/// 调用任务 panic 时仍按请求 id 写出一条错误响应。
pub async fn serve<R, W>(
    executor: Arc<ToolExecutor>,
    reader: R,
    mut writer: W,
    cancel: CancellationToken,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut input_open = true;
    let mut calls: JoinSet<Response> = JoinSet::new();
    let mut request_ids: HashMap<task::Id, Value> = HashMap::new();

    while input_open || !calls.is_empty() {
        tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line(), if input_open => {
                let Some(line) = line? else {
                    tracing::debug!("Tool protocol input closed");
                    input_open = false;
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Request>(&line) {
                    Ok(request) => {
                        let id = request.id.clone();
                        let executor = Arc::clone(&executor);
                        let handle = calls.spawn(async move {
                            handle_request(&executor, request).await
                        });
                        request_ids.insert(handle.id(), id);
                    }
                    Err(e) => {
                        tracing::warn!("Invalid request: {}", e);
                        let response = Response::error(Value::Null, format!("Invalid request: {e}"));
                        write_response(&mut writer, &response).await?;
                    }
                }
            }
            Some(joined) = calls.join_next_with_id(), if !calls.is_empty() => {
                let response = match joined {
                    Ok((task_id, response)) => {
                        request_ids.remove(&task_id);
                        response
                    }
                    Err(e) => {
                        let id = request_ids.remove(&e.id()).unwrap_or(Value::Null);
                        tracing::error!("Tool call task failed: {}", e);
                        Response::error(id, format!("Tool call aborted: {e}"))
                    }
                };
                write_response(&mut writer, &response).await?;
            }
        }
    }
    Ok(())
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &Response,
) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(response)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::config::AppConfig;
    use crate::core::HandoffBuilder;
    use std::time::Duration;

    fn executor() -> (Arc<MockBackend>, Arc<ToolExecutor>) {
        let mock = Arc::new(MockBackend::new());
        let handoff = HandoffBuilder::new(AppConfig::default())
            .with_directory("/work")
            .with_backend(mock.clone(), mock.clone())
            .with_agents(Vec::new())
            .build()
            .unwrap();
        (mock, handoff.executor)
    }

    fn parse_lines(out: &[u8]) -> Vec<Value> {
        String::from_utf8_lossy(out)
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_list_and_call_over_lines() {
        let (mock, executor) = executor();
        let input = concat!(
            r#"{"id": 1, "method": "tools/list"}"#,
            "\n\n",
            r#"{"id": 2, "method": "tools/call", "tool": "session", "args": {"mode": "message", "text": "go on"}, "context": {"sessionID": "ses_a", "directory": "/work"}}"#,
            "\n",
        );
        let mut out = Vec::new();
        serve(executor, input.as_bytes(), &mut out, CancellationToken::new())
            .await
            .unwrap();

        let responses = parse_lines(&out);
        assert_eq!(responses.len(), 2);
        let list = responses.iter().find(|r| r["id"] == 1).unwrap();
        assert_eq!(list["result"]["tools"].as_array().unwrap().len(), 4);
        let call = responses.iter().find(|r| r["id"] == 2).unwrap();
        assert!(call["result"]["content"]
            .as_str()
            .unwrap()
            .starts_with("Message queued."));
        assert_eq!(mock.count("list_messages"), 1);
    }

    #[tokio::test]
    async fn test_call_without_context_reports_missing_session() {
        let (_, executor) = executor();
        let request: Request = serde_json::from_value(serde_json::json!({
            "id": "x",
            "method": "tools/call",
            "tool": "session",
            "args": {"mode": "message", "text": "hi"}
        }))
        .unwrap();
        let response = handle_request(&executor, request).await;
        assert_eq!(
            response.result.unwrap()["content"],
            "Error: No session context for this tool call"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_first_reply_becomes_error_text() {
        let (mock, executor) = executor();
        mock.delay_on("send_prompt", Duration::from_secs(600));
        let request: Request = serde_json::from_value(serde_json::json!({
            "id": 7,
            "method": "tools/call",
            "tool": "session",
            "args": {"mode": "new", "text": "hello"},
            "context": {"sessionID": "ses_a", "directory": "/work"}
        }))
        .unwrap();

        let response = handle_request(&executor, request).await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(response.error.is_none());
        let content = response.result.unwrap()["content"].as_str().unwrap().to_string();
        assert_eq!(
            content,
            "Error: Timed out after 300s waiting for session ses_new_1 to reply"
        );
        assert_eq!(mock.notifications().len(), 1);
    }

    struct PanickingTool;

    #[async_trait::async_trait]
    impl crate::tools::Tool for PanickingTool {
        fn name(&self) -> &str {
            "explode"
        }

        fn description(&self) -> &str {
            "panics"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            panic!("tool blew up");
        }
    }

    #[tokio::test]
    async fn test_panicking_call_still_answers_and_serve_returns() {
        let mut registry = crate::tools::ToolRegistry::new();
        registry.register(PanickingTool);
        let executor = Arc::new(ToolExecutor::new(registry, 5));
        let input = "{\"id\": 9, \"method\": \"tools/call\", \"tool\": \"explode\"}\n";
        let mut out = Vec::new();

        serve(executor, input.as_bytes(), &mut out, CancellationToken::new())
            .await
            .unwrap();

        let responses = parse_lines(&out);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], 9);
        assert!(responses[0]["error"]
            .as_str()
            .unwrap()
            .starts_with("Tool call aborted"));
    }

    #[tokio::test]
    async fn test_unknown_tool_and_bad_json() {
        let (_, executor) = executor();
        let input = "not json\n{\"id\": 3, \"method\": \"tools/call\", \"tool\": \"nope\"}\n";
        let mut out = Vec::new();
        serve(executor, input.as_bytes(), &mut out, CancellationToken::new())
            .await
            .unwrap();

        let responses = parse_lines(&out);
        assert_eq!(responses.len(), 2);
        assert!(responses[0]["error"].as_str().unwrap().starts_with("Invalid request"));
        assert_eq!(responses[1]["id"], 3);
        assert_eq!(
            responses[1]["error"],
            "Tool execution failed: Unknown tool: nope"
        );
    }
}
