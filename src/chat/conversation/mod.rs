//! 会话模块
//!
//! 实现用户与管理员 1:1 会话的获取或创建

pub mod api;
pub mod service;
pub mod types;

// 重新导出主要类型和函数
pub use api::ConversationApi;
pub use service::ConversationResolver;
pub use types::{ChatUser, Conversation};
