//! HTTP 后端客户端
//!
//! 通过 reqwest 调用会话宿主的 REST 接口；每个请求都带 `?directory=`。
//! 事件订阅使用单独的无超时 Client（SSE 长连接），增量解码为 `BackendEvent`。

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::BackendError;
use super::events::{BackendEvent, SseDecoder};
use super::traits::{Backend, EventStream, Notifier};
use super::types::{
    MessageRecord, ProjectInfo, PromptRequest, SessionInfo, StatusMap, SummarizeRequest,
    ToastVariant,
};

/// 基于 HTTP 的后端实现
pub struct HttpBackend {
    client: Client,
    stream_client: Client,
    base_url: String,
    /// 通知所属目录（toast 不针对具体会话）
    directory: String,
}

#[derive(Serialize)]
struct CreateSessionBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
}

#[derive(Serialize)]
struct TitleBody<'a> {
    title: &'a str,
}

#[derive(Serialize)]
struct ToastBody<'a> {
    message: &'a str,
    variant: ToastVariant,
}

impl HttpBackend {
    pub fn new(
        base_url: &str,
        request_timeout_secs: u64,
        directory: &str,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .build()?;
        let stream_client = Client::builder().build()?;
        Ok(Self {
            client,
            stream_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            directory: directory.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str, directory: &str) -> RequestBuilder {
        self.client
            .get(self.url(path))
            .query(&[("directory", directory)])
    }

    fn post(&self, path: &str, directory: &str) -> RequestBuilder {
        self.client
            .post(self.url(path))
            .query(&[("directory", directory)])
    }

    /// 发送请求，非 2xx 转为 `BackendError::Status`
    async fn send(request: RequestBuilder) -> Result<Response, BackendError> {
        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, BackendError> {
        let resp = Self::send(request).await?;
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn create_session(
        &self,
        directory: &str,
        title: Option<&str>,
    ) -> Result<SessionInfo, BackendError> {
        Self::send_json(
            self.post("/session", directory)
                .json(&CreateSessionBody { title }),
        )
        .await
    }

    async fn fork_session(
        &self,
        session_id: &str,
        directory: &str,
    ) -> Result<SessionInfo, BackendError> {
        Self::send_json(
            self.post(&format!("/session/{session_id}/fork"), directory)
                .json(&serde_json::json!({})),
        )
        .await
    }

    async fn update_session_title(
        &self,
        session_id: &str,
        directory: &str,
        title: &str,
    ) -> Result<(), BackendError> {
        let request = self
            .client
            .patch(self.url(&format!("/session/{session_id}")))
            .query(&[("directory", directory)])
            .json(&TitleBody { title });
        Self::send(request).await.map(|_| ())
    }

    async fn send_prompt(
        &self,
        session_id: &str,
        directory: &str,
        request: PromptRequest,
    ) -> Result<(), BackendError> {
        // 等待整轮回复，不受普通请求超时限制
        let request = self
            .stream_client
            .post(self.url(&format!("/session/{session_id}/message")))
            .query(&[("directory", directory)])
            .json(&request);
        Self::send(request).await.map(|_| ())
    }

    async fn send_prompt_async(
        &self,
        session_id: &str,
        directory: &str,
        request: PromptRequest,
    ) -> Result<(), BackendError> {
        Self::send(
            self.post(&format!("/session/{session_id}/prompt_async"), directory)
                .json(&request),
        )
        .await
        .map(|_| ())
    }

    async fn summarize(
        &self,
        session_id: &str,
        directory: &str,
        request: SummarizeRequest,
    ) -> Result<(), BackendError> {
        let request = self
            .stream_client
            .post(self.url(&format!("/session/{session_id}/summarize")))
            .query(&[("directory", directory)])
            .json(&request);
        Self::send(request).await.map(|_| ())
    }

    async fn list_sessions(&self, directory: &str) -> Result<Vec<SessionInfo>, BackendError> {
        Self::send_json(self.get("/session", directory)).await
    }

    async fn session_status(&self, directory: &str) -> Result<StatusMap, BackendError> {
        Self::send_json(self.get("/session/status", directory)).await
    }

    async fn list_messages(
        &self,
        session_id: &str,
        directory: &str,
    ) -> Result<Vec<MessageRecord>, BackendError> {
        Self::send_json(self.get(&format!("/session/{session_id}/message"), directory)).await
    }

    async fn list_projects(&self, directory: &str) -> Result<Vec<ProjectInfo>, BackendError> {
        Self::send_json(self.get("/project", directory)).await
    }

    async fn subscribe_events(&self, directory: &str) -> Result<EventStream, BackendError> {
        let request = self
            .stream_client
            .get(self.url("/event"))
            .query(&[("directory", directory)])
            .header(reqwest::header::ACCEPT, "text/event-stream");
        let resp = Self::send(request).await?;
        tracing::info!("Subscribed to backend events at {}", self.base_url);

        let bytes = Box::pin(resp.bytes_stream());
        let state = (bytes, SseDecoder::new(), VecDeque::new());
        let events = futures_util::stream::unfold(
            state,
            |(mut bytes, mut decoder, mut queue)| async move {
                loop {
                    if let Some(event) = queue.pop_front() {
                        return Some((Ok(event), (bytes, decoder, queue)));
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => {
                            for data in decoder.push(&chunk) {
                                match BackendEvent::from_json(&data) {
                                    Ok(event) => queue.push_back(event),
                                    Err(e) => {
                                        tracing::debug!("Skipping undecodable event: {}", e)
                                    }
                                }
                            }
                        }
                        Some(Err(e)) => {
                            return Some((
                                Err(BackendError::Stream(e.to_string())),
                                (bytes, decoder, queue),
                            ));
                        }
                        None => return None,
                    }
                }
            },
        );
        Ok(Box::pin(events))
    }
}

#[async_trait]
impl Notifier for HttpBackend {
    async fn notify(&self, message: &str, variant: ToastVariant) -> Result<(), BackendError> {
        let request = self
            .post("/tui/show-toast", &self.directory)
            .json(&ToastBody { message, variant });
        Self::send(request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::ModelRef;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DIR: &str = "/work/project";

    fn session_json(id: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "title": "t",
            "directory": DIR,
            "time": {"created": 1, "updated": 2}
        })
    }

    async fn backend(server: &MockServer) -> HttpBackend {
        HttpBackend::new(&server.uri(), 5, DIR).unwrap()
    }

    #[test]
    fn test_base_url_is_normalized() {
        let backend = HttpBackend::new("http://127.0.0.1:4096/", 5, "/work").unwrap();
        assert_eq!(backend.url("/session"), "http://127.0.0.1:4096/session");
    }

    #[test]
    fn test_toast_body_shape() {
        let body = ToastBody {
            message: "boom",
            variant: ToastVariant::Error,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "message": "boom", "variant": "error" }));
    }

    #[tokio::test]
    async fn test_session_lifecycle_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .and(query_param("directory", DIR))
            .and(body_json(serde_json::json!({"title": "Branch A"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("ses_new")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/ses_1/fork"))
            .and(query_param("directory", DIR))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("ses_fork")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/session/ses_fork"))
            .and(query_param("directory", DIR))
            .and(body_json(serde_json::json!({"title": "Renamed"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("ses_fork")))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend(&server).await;
        let created = backend.create_session(DIR, Some("Branch A")).await.unwrap();
        assert_eq!(created.id, "ses_new");
        assert_eq!(created.time.updated, 2);
        let forked = backend.fork_session("ses_1", DIR).await.unwrap();
        assert_eq!(forked.id, "ses_fork");
        backend
            .update_session_title("ses_fork", DIR, "Renamed")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_prompt_endpoints_distinguish_sync_and_async() {
        let server = MockServer::start().await;
        let mut prompt = PromptRequest::text("hello");
        prompt.agent = Some("plan".to_string());
        prompt.model = Some(ModelRef {
            provider_id: "openai".to_string(),
            model_id: "gpt-4o".to_string(),
        });
        let expected = serde_json::json!({
            "agent": "plan",
            "model": {"providerID": "openai", "modelID": "gpt-4o"},
            "parts": [{"type": "text", "text": "hello"}]
        });
        Mock::given(method("POST"))
            .and(path("/session/ses_1/message"))
            .and(query_param("directory", DIR))
            .and(body_json(expected.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/ses_1/prompt_async"))
            .and(query_param("directory", DIR))
            .and(body_json(expected))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/ses_1/summarize"))
            .and(query_param("directory", DIR))
            .and(body_json(serde_json::json!({"providerID": "openai", "modelID": "gpt-4o"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(true))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend(&server).await;
        backend.send_prompt("ses_1", DIR, prompt.clone()).await.unwrap();
        backend.send_prompt_async("ses_1", DIR, prompt).await.unwrap();
        backend
            .summarize(
                "ses_1",
                DIR,
                SummarizeRequest {
                    provider_id: "openai".to_string(),
                    model_id: "gpt-4o".to_string(),
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_query_endpoints_decode_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/session"))
            .and(query_param("directory", DIR))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([session_json("a"), session_json("b")])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/status"))
            .and(query_param("directory", DIR))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "a": {"type": "busy"},
                "b": {"type": "retry", "attempt": 2}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/a/message"))
            .and(query_param("directory", DIR))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "info": {"id": "m1", "role": "assistant", "agent": "build",
                         "providerID": "openai", "modelID": "gpt-4o"},
                "parts": [{"type": "text", "text": "done"}, {"type": "step-finish"}]
            }])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/project"))
            .and(query_param("directory", DIR))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "p1", "worktree": "/work/project", "vcs": "git"}
            ])))
            .mount(&server)
            .await;

        let backend = backend(&server).await;
        assert_eq!(backend.list_sessions(DIR).await.unwrap().len(), 2);
        let statuses = backend.session_status(DIR).await.unwrap();
        assert_eq!(statuses["b"].label(), "retry (attempt 2)");
        let messages = backend.list_messages("a", DIR).await.unwrap();
        assert_eq!(messages[0].info.model_id.as_deref(), Some("gpt-4o"));
        assert_eq!(messages[0].text(), "done");
        let projects = backend.list_projects(DIR).await.unwrap();
        assert_eq!(projects[0].vcs.as_deref(), Some("git"));
    }

    #[tokio::test]
    async fn test_non_success_maps_to_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session/ses_1/prompt_async"))
            .respond_with(ResponseTemplate::new(409).set_body_string("session busy"))
            .mount(&server)
            .await;

        let backend = backend(&server).await;
        let err = backend
            .send_prompt_async("ses_1", DIR, PromptRequest::text("hi"))
            .await
            .unwrap_err();
        match err {
            BackendError::Status { status, body } => {
                assert_eq!(status, 409);
                assert_eq!(body, "session busy");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_toast_carries_directory() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tui/show-toast"))
            .and(query_param("directory", DIR))
            .and(body_json(serde_json::json!({"message": "boom", "variant": "error"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(true))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend(&server).await;
        backend.notify("boom", ToastVariant::Error).await.unwrap();
    }

    #[tokio::test]
    async fn test_event_stream_decodes_until_end() {
        let server = MockServer::start().await;
        let body = concat!(
            ": connected\n\n",
            "data: {\"type\":\"server.connected\",\"properties\":{}}\n\n",
            "data: {\"type\":\"session.idle\",\n",
            "data: \"properties\":{\"sessionID\":\"ses_1\"}}\n\n",
            "data: not json\n\n",
            "data: {\"type\":\"session.compacted\",\"properties\":{\"sessionID\":\"ses_1\"}}\n\n",
        );
        Mock::given(method("GET"))
            .and(path("/event"))
            .and(query_param("directory", DIR))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let backend = backend(&server).await;
        let events: Vec<BackendEvent> = backend
            .subscribe_events(DIR)
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;

        assert_eq!(
            events,
            vec![
                BackendEvent::Other("server.connected".to_string()),
                BackendEvent::Idle {
                    session_id: "ses_1".to_string()
                },
                BackendEvent::Compacted {
                    session_id: "ses_1".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_subscribe_rejected_by_backend() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/event"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let backend = backend(&server).await;
        let result = backend.subscribe_events(DIR).await;
        assert!(matches!(result, Err(BackendError::Status { status: 503, .. })));
    }
}
