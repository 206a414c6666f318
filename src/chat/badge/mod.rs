//! 管理员通知徽标域：聚合待审计数与未读消息数

pub mod api;
pub mod listener;
pub mod service;
pub mod types;

pub use api::BadgeApi;
pub use listener::{BadgeListener, EmptyBadgeListener};
pub use service::BadgeAggregator;
pub use types::{
    BadgeSnapshot, DonationPreview, NotificationCounts, PendingDonationsResp,
    PendingProductsResp, ProductPreview,
};
