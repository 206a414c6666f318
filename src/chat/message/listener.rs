//! 聊天事件监听器定义
//!
//! 上层（CLI、桌面壳、测试桩）通过实现该 trait 接收聊天状态变化，
//! 列表类负载统一为 JSON 字符串

use async_trait::async_trait;

/// 聊天会话事件监听器
///
/// 所有方法都有默认空实现，调用方只需覆盖关心的回调
#[async_trait]
pub trait ChatListener: Send + Sync {
    /// 会话解析完成（负载为会话对象 JSON）
    async fn on_conversation_ready(&self, conversation: String) {
        let _ = conversation;
    }

    /// 消息列表发生变化（负载为 ChatMessage 数组 JSON，含乐观条目）
    async fn on_message_list_changed(&self, message_list: String) {
        let _ = message_list;
    }

    /// 附件上传进度（local_id 标识本次发送，progress 为 0-100）
    async fn on_send_progress(&self, local_id: i64, progress: i32) {
        let _ = (local_id, progress);
    }

    /// 发送失败（失败条目保留在列表中，可重试）
    async fn on_send_failed(&self, local_id: i64, reason: String) {
        let _ = (local_id, reason);
    }

    /// 选择的附件中有不符合要求的文件（负载为汇总提示文案）
    async fn on_attachments_rejected(&self, warning: String) {
        let _ = warning;
    }

    /// 未读消息数变化
    async fn on_unread_count_changed(&self, count: i64) {
        let _ = count;
    }

    /// 聊天用户目录变化（管理员侧，负载为 ChatUser 数组 JSON）
    async fn on_chat_users_changed(&self, user_list: String) {
        let _ = user_list;
    }

    /// 凭证失效（401/403），轮询已停止，需要重新登录
    async fn on_auth_expired(&self) {}
}

/// 空监听器，用于不关心事件的场合
pub struct EmptyChatListener;

#[async_trait]
impl ChatListener for EmptyChatListener {}
