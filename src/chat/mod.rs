//! Thrift Haven 聊天核心
//!
//! 按领域分层：conversation（会话解析）、message（消息同步与发送）、
//! attachment（附件校验）、badge（管理员通知聚合）、client（组合门面）

pub mod attachment;
pub mod auth;
pub mod badge;
pub mod client;
pub mod conversation;
pub mod message;
pub mod types;

pub use attachment::{
    format_file_size, AttachmentKind, AttachmentTray, BatchReview, PendingAttachment,
    MAX_ATTACHMENT_BYTES,
};
pub use auth::{login_async, Session};
pub use badge::{BadgeAggregator, BadgeListener, EmptyBadgeListener, NotificationCounts};
pub use client::{ClientConfig, HavenChatClient};
pub use conversation::{ChatUser, Conversation, ConversationResolver};
pub use message::{
    ChatListener, ChatMessage, ChatSession, DayGroup, DeliveryState, EmptyChatListener,
    MessageRecord, OptimisticMessage,
};
pub use types::UserRole;
