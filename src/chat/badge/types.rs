//! 管理员通知徽标的数据模型

use serde::{Deserialize, Serialize};

/// 待审捐赠的预览条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationPreview {
    pub donation_id: String,
    #[serde(default)]
    pub donor_name: String,
    #[serde(default)]
    pub item_name: String,
    #[serde(default)]
    pub created_at: String,
}

/// GET /api/admin/donations/pending 的响应
#[derive(Debug, Clone, Deserialize)]
pub struct PendingDonationsResp {
    pub count: i64,
    #[serde(default)]
    pub donations: Vec<DonationPreview>,
}

/// 待审商品的预览条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPreview {
    pub product_id: String,
    #[serde(default)]
    pub seller_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_at: String,
}

/// GET /api/admin/products/pending 的响应
#[derive(Debug, Clone, Deserialize)]
pub struct PendingProductsResp {
    pub count: i64,
    #[serde(default)]
    pub products: Vec<ProductPreview>,
}

/// 聚合后的通知计数，每个刷新周期整体重算
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationCounts {
    pub pending_donations: i64,
    pub pending_products: i64,
    /// 恒等于 pending_donations + pending_products
    pub total_pending: i64,
    pub unread_messages: i64,
}

impl NotificationCounts {
    /// 徽标显示值：待审总数加未读消息数
    pub fn badge_total(&self) -> i64 {
        self.total_pending + self.unread_messages
    }
}

/// 广播给监听器的完整徽标快照
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeSnapshot {
    pub counts: NotificationCounts,
    pub recent_donations: Vec<DonationPreview>,
    pub recent_products: Vec<ProductPreview>,
}
