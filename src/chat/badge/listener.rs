//! 通知徽标事件监听器定义

use async_trait::async_trait;

/// 通知徽标监听器，计数变化时收到回调
#[async_trait]
pub trait BadgeListener: Send + Sync {
    /// 计数或预览发生变化（负载为 BadgeSnapshot JSON）
    async fn on_counts_changed(&self, snapshot: String) {
        let _ = snapshot;
    }

    /// 徽标显示值变化（待审总数 + 未读消息数）
    async fn on_badge_total_changed(&self, total: i64) {
        let _ = total;
    }
}

/// 空监听器
pub struct EmptyBadgeListener;

#[async_trait]
impl BadgeListener for EmptyBadgeListener {}
