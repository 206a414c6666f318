//! 消息域：数据模型、消息看板、HTTP API、事件监听与会话服务

pub mod api;
pub mod listener;
pub mod models;
pub mod service;
pub mod store;

pub use api::{MessageApi, ProgressFn};
pub use listener::{ChatListener, EmptyChatListener};
pub use models::{
    ChatMessage, DayGroup, DeliveryState, FileRecord, MessageRecord, OptimisticFile,
    OptimisticMessage, SEND_FAILED_NOTICE,
};
pub use service::ChatSession;
pub use store::MessageBoard;
