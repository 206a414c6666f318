use serde::{Deserialize, Serialize};

/// 用户与管理员之间的 1:1 会话
/// 由服务器在首次联系时懒创建，ID 稳定不变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub conversation_id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    /// 参与方角色（"buyer" / "seller"）
    #[serde(default)]
    pub user_type: String,
    #[serde(default)]
    pub created_at: String,
}

/// 管理员用户列表条目（带会话元信息，用于左侧用户面板）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUser {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub user_type: String,
    /// 最近一条消息时间（无消息时缺失）
    #[serde(default)]
    pub last_message_at: Option<String>,
    #[serde(default)]
    pub unread_count: i64,
}
