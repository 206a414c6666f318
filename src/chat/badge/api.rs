//! 管理员通知相关的 HTTP API 客户端
//!
//! 三个计数来源相互独立，任何一路失败都不影响其余两路

use crate::chat::badge::types::{PendingDonationsResp, PendingProductsResp};
use crate::chat::message::models::UnreadCountResp;
use crate::chat::types::handle_http_response;
use anyhow::{Context, Result};
use tracing::debug;
use uuid::Uuid;

/// 通知徽标的 HTTP API 客户端
pub struct BadgeApi {
    client: reqwest::Client,
    api_base_url: String,
}

impl BadgeApi {
    pub fn new(client: reqwest::Client, api_base_url: String) -> Self {
        Self {
            client,
            api_base_url,
        }
    }

    /// 拉取待审核捐赠的数量与预览
    pub async fn pending_donations(&self) -> Result<PendingDonationsResp> {
        let request_id = Uuid::new_v4().to_string();
        let url = format!("{}/api/admin/donations/pending", self.api_base_url);

        debug!("[BadgeAPI] 📡 请求待审捐赠: {}, 请求ID: {}", url, request_id);

        let response = self
            .client
            .get(&url)
            .header("x-request-id", &request_id)
            .send()
            .await
            .context("请求失败")?;

        handle_http_response::<PendingDonationsResp>(response, "待审捐赠").await
    }

    /// 拉取待审核商品的数量与预览
    pub async fn pending_products(&self) -> Result<PendingProductsResp> {
        let request_id = Uuid::new_v4().to_string();
        let url = format!("{}/api/admin/products/pending", self.api_base_url);

        debug!("[BadgeAPI] 📡 请求待审商品: {}, 请求ID: {}", url, request_id);

        let response = self
            .client
            .get(&url)
            .header("x-request-id", &request_id)
            .send()
            .await
            .context("请求失败")?;

        handle_http_response::<PendingProductsResp>(response, "待审商品").await
    }

    /// 拉取管理员侧未读消息总数
    pub async fn unread_messages(&self) -> Result<i64> {
        let request_id = Uuid::new_v4().to_string();
        let url = format!("{}/api/messages/unread-count", self.api_base_url);

        debug!("[BadgeAPI] 📡 请求未读数: {}, 请求ID: {}", url, request_id);

        let response = self
            .client
            .get(&url)
            .header("x-request-id", &request_id)
            .send()
            .await
            .context("请求失败")?;

        let resp = handle_http_response::<UnreadCountResp>(response, "未读数").await?;
        Ok(resp.count)
    }
}
