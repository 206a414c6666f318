//! 消息本地模型定义
//!
//! 消息要么是服务器已落库的记录，要么是本地乐观插入的占位，
//! 两种形态用标签联合（`ChatMessage`）显式区分，不共享字段集合

use serde::{Deserialize, Serialize};

/// 发送失败时写入消息条目的提示文案（界面点击后触发重试）
pub const SEND_FAILED_NOTICE: &str = "Failed to send. Click to retry.";

/// 服务器存储的消息附件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    #[serde(default)]
    pub file_id: String,
    /// 服务器存储名（下载时使用）
    pub filename: String,
    /// 用户上传时的原始文件名
    pub originalname: String,
    pub mimetype: String,
    #[serde(default)]
    pub size: u64,
}

/// 服务器已落库的消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub message_id: String,
    pub conversation_id: String,
    /// 发送方（"admin" 或 "user"）
    pub sender_type: String,
    #[serde(default)]
    pub sender_name: String,
    /// 正文（只发附件时可以为空）
    #[serde(default)]
    pub message_text: String,
    /// ISO 8601 时间戳
    pub created_at: String,
    #[serde(default)]
    pub files: Vec<FileRecord>,
    #[serde(default)]
    pub is_read: bool,
}

/// 未读数响应
#[derive(Debug, Deserialize)]
pub struct UnreadCountResp {
    pub count: i64,
}

/// 乐观消息携带的附件快照（尚未上传成功，仅有本地元信息）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimisticFile {
    pub local_id: i64,
    pub originalname: String,
    pub mimetype: String,
    /// 图片的 data URL 预览
    pub preview: Option<String>,
}

/// 乐观消息的投递状态
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum DeliveryState {
    /// 上传中，或无会话时的本地排队
    Pending,
    /// 发送失败，可点击重试
    #[serde(rename_all = "camelCase")]
    Failed { error_message: String },
}

/// 本地乐观插入的消息占位
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimisticMessage {
    /// 客户端分配的本地 ID（毫秒时间戳，冲突时递增）
    pub local_id: i64,
    pub sender_type: String,
    pub sender_name: String,
    pub message_text: String,
    pub created_at: String,
    pub files: Vec<OptimisticFile>,
    pub delivery: DeliveryState,
}

impl OptimisticMessage {
    pub fn new(
        local_id: i64,
        sender_type: &str,
        sender_name: &str,
        message_text: String,
        attachments: &[crate::chat::attachment::PendingAttachment],
    ) -> Self {
        let files = attachments
            .iter()
            .enumerate()
            .map(|(idx, f)| OptimisticFile {
                local_id: local_id + 1 + idx as i64,
                originalname: f.originalname.clone(),
                mimetype: f.mimetype.clone(),
                preview: f.preview.clone(),
            })
            .collect();
        Self {
            local_id,
            sender_type: sender_type.to_string(),
            sender_name: sender_name.to_string(),
            message_text,
            created_at: chrono::Local::now().to_rfc3339(),
            files,
            delivery: DeliveryState::Pending,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.delivery, DeliveryState::Failed { .. })
    }
}

/// 消息的统一视图：服务器记录或本地乐观占位
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChatMessage {
    Persisted(MessageRecord),
    Optimistic(OptimisticMessage),
}

impl ChatMessage {
    pub fn created_at(&self) -> &str {
        match self {
            ChatMessage::Persisted(m) => &m.created_at,
            ChatMessage::Optimistic(m) => &m.created_at,
        }
    }

    /// 乐观消息的本地 ID（服务器记录返回 None）
    pub fn local_id(&self) -> Option<i64> {
        match self {
            ChatMessage::Persisted(_) => None,
            ChatMessage::Optimistic(m) => Some(m.local_id),
        }
    }

    pub fn message_text(&self) -> &str {
        match self {
            ChatMessage::Persisted(m) => &m.message_text,
            ChatMessage::Optimistic(m) => &m.message_text,
        }
    }
}

/// 按自然日分组后的消息（本地时区，用于界面渲染日期分隔符）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayGroup {
    /// 本地日期（YYYY-MM-DD）
    pub date: String,
    pub messages: Vec<ChatMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_record_parses_backend_shape() {
        let json = r#"{
            "messageId": "m-301",
            "conversationId": "c-9",
            "senderType": "user",
            "senderName": "Jamie",
            "messageText": "Is the lamp still available?",
            "createdAt": "2025-06-02T14:05:11.000Z",
            "files": [{
                "fileId": "f-1",
                "filename": "1717337111-lamp.jpg",
                "originalname": "lamp.jpg",
                "mimetype": "image/jpeg",
                "size": 52341
            }]
        }"#;
        let record: MessageRecord = serde_json::from_str(json).expect("解析失败");
        assert_eq!(record.files.len(), 1);
        assert_eq!(record.files[0].originalname, "lamp.jpg");
        assert!(!record.is_read);
    }

    #[test]
    fn chat_message_serializes_with_kind_tag() {
        let msg = ChatMessage::Optimistic(OptimisticMessage::new(
            1_717_000_000_000,
            "user",
            "Jamie",
            "hello".to_string(),
            &[],
        ));
        let json = serde_json::to_value(&msg).expect("序列化失败");
        assert_eq!(json["kind"], "optimistic");
        assert_eq!(json["localId"], 1_717_000_000_000i64);
        assert_eq!(json["delivery"]["state"], "pending");
    }

    #[test]
    fn failed_delivery_carries_error_message() {
        let mut msg = OptimisticMessage::new(7, "user", "Kai", "ping".to_string(), &[]);
        msg.delivery = DeliveryState::Failed {
            error_message: SEND_FAILED_NOTICE.to_string(),
        };
        assert!(msg.is_failed());

        let json = serde_json::to_value(&msg).expect("序列化失败");
        assert_eq!(json["delivery"]["state"], "failed");
        assert_eq!(json["delivery"]["errorMessage"], SEND_FAILED_NOTICE);
    }

    #[test]
    fn optimistic_files_get_sequential_local_ids() {
        use crate::chat::attachment::PendingAttachment;

        let files = vec![
            PendingAttachment::from_bytes("a.png", "image/png", vec![1, 2, 3]),
            PendingAttachment::from_bytes("b.pdf", "application/pdf", vec![4, 5]),
        ];
        let msg = OptimisticMessage::new(100, "user", "Jamie", String::new(), &files);
        assert_eq!(msg.files[0].local_id, 101);
        assert_eq!(msg.files[1].local_id, 102);
        assert!(msg.files[0].preview.is_some());
        assert!(msg.files[1].preview.is_none());
    }
}
