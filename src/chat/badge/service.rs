//! 通知徽标聚合服务
//!
//! 每个周期并发拉取三路计数（待审捐赠、待审商品、未读消息），
//! 任何一路失败只让该切片沿用上次值，不阻塞其余两路，也不清零

use crate::chat::badge::api::BadgeApi;
use crate::chat::badge::listener::BadgeListener;
use crate::chat::badge::types::{BadgeSnapshot, NotificationCounts};
use crate::chat::types::is_auth_failure;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// 把一轮拉取结果并入上次计数，缺失的切片沿用旧值
///
/// total_pending 每轮重算，徽标值由 NotificationCounts::badge_total 给出
fn merge_counts(
    previous: &NotificationCounts,
    donations: Option<i64>,
    products: Option<i64>,
    unread: Option<i64>,
) -> NotificationCounts {
    let pending_donations = donations.unwrap_or(previous.pending_donations);
    let pending_products = products.unwrap_or(previous.pending_products);
    NotificationCounts {
        pending_donations,
        pending_products,
        total_pending: pending_donations + pending_products,
        unread_messages: unread.unwrap_or(previous.unread_messages),
    }
}

/// 管理员通知徽标聚合器
pub struct BadgeAggregator {
    api: BadgeApi,
    listener: Arc<dyn BadgeListener>,
    snapshot: Mutex<BadgeSnapshot>,
}

impl BadgeAggregator {
    pub fn new(api: BadgeApi, listener: Arc<dyn BadgeListener>) -> Self {
        Self {
            api,
            listener,
            snapshot: Mutex::new(BadgeSnapshot::default()),
        }
    }

    /// 并发刷新三路计数并广播变化
    ///
    /// 普通失败不算错误（切片保留上次值），只有凭证失效才返回 Err，
    /// 调用方据此停掉轮询
    pub async fn refresh(&self) -> Result<NotificationCounts> {
        let (donations, products, unread) = tokio::join!(
            self.api.pending_donations(),
            self.api.pending_products(),
            self.api.unread_messages(),
        );

        let donations = match donations {
            Ok(resp) => Some(resp),
            Err(e) if is_auth_failure(&e) => {
                error!("[Badge] ❌ 凭证失效，停止聚合: {}", e);
                return Err(e);
            }
            Err(e) => {
                warn!("[Badge] ⚠️ 拉取待审捐赠失败，保留上次值: {}", e);
                None
            }
        };
        let products = match products {
            Ok(resp) => Some(resp),
            Err(e) if is_auth_failure(&e) => {
                error!("[Badge] ❌ 凭证失效，停止聚合: {}", e);
                return Err(e);
            }
            Err(e) => {
                warn!("[Badge] ⚠️ 拉取待审商品失败，保留上次值: {}", e);
                None
            }
        };
        let unread = match unread {
            Ok(count) => Some(count),
            Err(e) if is_auth_failure(&e) => {
                error!("[Badge] ❌ 凭证失效，停止聚合: {}", e);
                return Err(e);
            }
            Err(e) => {
                warn!("[Badge] ⚠️ 拉取未读数失败，保留上次值: {}", e);
                None
            }
        };

        let (donation_count, donation_list) = match donations {
            Some(resp) => (Some(resp.count), Some(resp.donations)),
            None => (None, None),
        };
        let (product_count, product_list) = match products {
            Some(resp) => (Some(resp.count), Some(resp.products)),
            None => (None, None),
        };

        let (merged, changed) = {
            let mut guard = self.snapshot.lock().await;
            let next = BadgeSnapshot {
                counts: merge_counts(&guard.counts, donation_count, product_count, unread),
                recent_donations: donation_list
                    .unwrap_or_else(|| guard.recent_donations.clone()),
                recent_products: product_list.unwrap_or_else(|| guard.recent_products.clone()),
            };
            let changed = *guard != next;
            *guard = next.clone();
            (next, changed)
        };

        if changed {
            info!(
                "[Badge] 📊 通知计数更新: 待审 {} + 未读 {} = 徽标 {}",
                merged.counts.total_pending,
                merged.counts.unread_messages,
                merged.counts.badge_total()
            );
            let payload = serde_json::to_string(&merged).unwrap_or_else(|_| "{}".to_string());
            self.listener.on_counts_changed(payload).await;
            self.listener
                .on_badge_total_changed(merged.counts.badge_total())
                .await;
        }

        Ok(merged.counts)
    }

    /// 最近一次聚合出的计数
    pub async fn counts(&self) -> NotificationCounts {
        self.snapshot.lock().await.counts.clone()
    }

    /// 最近一次聚合出的完整快照（含预览列表）
    pub async fn badge_snapshot(&self) -> BadgeSnapshot {
        self.snapshot.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::badge::listener::EmptyBadgeListener;

    #[test]
    fn merge_sums_pending_slices_into_badge_total() {
        let merged = merge_counts(&NotificationCounts::default(), Some(3), Some(2), Some(4));
        assert_eq!(merged.pending_donations, 3);
        assert_eq!(merged.pending_products, 2);
        assert_eq!(merged.total_pending, 5);
        assert_eq!(merged.unread_messages, 4);
        assert_eq!(merged.badge_total(), 9);
    }

    #[test]
    fn merge_keeps_last_known_value_for_failed_slice() {
        let previous = NotificationCounts {
            pending_donations: 3,
            pending_products: 2,
            total_pending: 5,
            unread_messages: 4,
        };
        // 未读数这一路失败：沿用 4，徽标仍是 9，不清零
        let merged = merge_counts(&previous, Some(3), Some(2), None);
        assert_eq!(merged.unread_messages, 4);
        assert_eq!(merged.badge_total(), 9);

        // 待审商品这一路失败，其余两路有新值
        let merged = merge_counts(&previous, Some(6), None, Some(1));
        assert_eq!(merged.pending_products, 2);
        assert_eq!(merged.total_pending, 8);
        assert_eq!(merged.badge_total(), 9);
    }

    #[tokio::test]
    async fn refresh_survives_total_fetch_failure() {
        let api = BadgeApi::new(reqwest::Client::new(), "http://127.0.0.1:1".to_string());
        let aggregator = BadgeAggregator::new(api, Arc::new(EmptyBadgeListener));

        // 三路全部连接失败：不是凭证问题，依旧返回 Ok 且计数保持初始值
        let counts = aggregator.refresh().await.unwrap();
        assert_eq!(counts, NotificationCounts::default());
        assert_eq!(aggregator.counts().await.badge_total(), 0);
    }
}
