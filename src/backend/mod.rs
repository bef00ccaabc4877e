//! 后端层：会话宿主的远程操作抽象与实现（HTTP / Mock）

pub mod error;
pub mod events;
pub mod http;
pub mod mock;
pub mod traits;
pub mod types;

pub use error::BackendError;
pub use events::{BackendEvent, SseDecoder};
pub use http::HttpBackend;
pub use mock::{BackendCall, MockBackend};
pub use traits::{Backend, EventStream, Notifier};
pub use types::{
    MessageInfo, MessagePart, MessageRecord, ModelRef, ProjectInfo, PromptPart, PromptRequest,
    Role, SessionId, SessionInfo, SessionStatus, SessionTime, StatusMap, SummarizeRequest, ToastVariant,
    ToolPermissions,
};
