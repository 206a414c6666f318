pub mod chat;

// 重新导出常用类型和函数，方便外部使用
pub use chat::{
    client::{ClientConfig, HavenChatClient},
    login_async, AttachmentTray, BadgeListener, ChatListener, ChatMessage, NotificationCounts,
    PendingAttachment, Session, UserRole,
};
