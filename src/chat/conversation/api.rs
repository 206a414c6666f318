//! 会话 HTTP API 客户端
//!
//! 负责所有会话相关的 HTTP 请求

use crate::chat::conversation::types::{ChatUser, Conversation};
use crate::chat::types::handle_http_response;
use anyhow::{Context, Result};
use tracing::{debug, info};
use uuid::Uuid;

/// 会话相关的 HTTP API 客户端
pub struct ConversationApi {
    client: reqwest::Client,
    api_base_url: String,
}

impl ConversationApi {
    /// 创建新的会话 API 客户端
    ///
    /// `client` 应该已经在外部配置好 Authorization 头
    pub fn new(client: reqwest::Client, api_base_url: String) -> Self {
        Self {
            client,
            api_base_url,
        }
    }

    /// 获取当前用户自己的会话（不存在时服务器返回 404）
    pub async fn get_own_conversation(&self) -> Result<Conversation> {
        let request_id = Uuid::new_v4().to_string();
        let url = format!("{}/api/messages/conversation", self.api_base_url);

        info!("[ConvAPI] 📡 请求本人会话");
        debug!("[ConvAPI]   请求URL: {}, 请求ID: {}", url, request_id);

        let response = self
            .client
            .get(&url)
            .header("x-request-id", &request_id)
            .send()
            .await
            .context("请求失败")?;

        let conv = handle_http_response::<Conversation>(response, "获取会话").await?;
        info!("[ConvAPI] ✅ 会话已获取: {}", conv.conversation_id);
        Ok(conv)
    }

    /// 获取与指定用户的会话（管理员视角，不存在时服务器返回 404）
    pub async fn get_conversation_with(
        &self,
        user_id: &str,
        user_type: &str,
    ) -> Result<Conversation> {
        let request_id = Uuid::new_v4().to_string();
        let url = format!("{}/api/messages/conversation", self.api_base_url);

        info!("[ConvAPI] 📡 请求与用户 {} 的会话", user_id);
        debug!("[ConvAPI]   请求URL: {}, 请求ID: {}", url, request_id);

        let response = self
            .client
            .get(&url)
            .query(&[("userId", user_id), ("userType", user_type)])
            .header("x-request-id", &request_id)
            .send()
            .await
            .context("请求失败")?;

        let conv = handle_http_response::<Conversation>(response, "获取会话").await?;
        info!("[ConvAPI] ✅ 会话已获取: {}", conv.conversation_id);
        Ok(conv)
    }

    /// 创建会话
    ///
    /// 本人发起时 `with_user` 为 None，管理员替用户创建时传 (userId, userType)
    pub async fn create_conversation(
        &self,
        with_user: Option<(&str, &str)>,
    ) -> Result<Conversation> {
        let request_id = Uuid::new_v4().to_string();
        let url = format!("{}/api/messages/conversation", self.api_base_url);

        let body = match with_user {
            Some((user_id, user_type)) => serde_json::json!({
                "userId": user_id,
                "userType": user_type,
            }),
            None => serde_json::json!({}),
        };

        info!("[ConvAPI] 📡 创建会话");
        debug!("[ConvAPI]   请求URL: {}, 请求ID: {}", url, request_id);

        let response = self
            .client
            .post(&url)
            .header("x-request-id", &request_id)
            .json(&body)
            .send()
            .await
            .context("请求失败")?;

        let conv = handle_http_response::<Conversation>(response, "创建会话").await?;
        info!("[ConvAPI] ✅ 会话已创建: {}", conv.conversation_id);
        Ok(conv)
    }

    /// 获取带会话元信息的用户列表（管理员专用）
    pub async fn list_chat_users(&self) -> Result<Vec<ChatUser>> {
        let request_id = Uuid::new_v4().to_string();
        let url = format!("{}/api/messages/users", self.api_base_url);

        info!("[ConvAPI] 📡 请求用户列表");
        debug!("[ConvAPI]   请求URL: {}, 请求ID: {}", url, request_id);

        let response = self
            .client
            .get(&url)
            .header("x-request-id", &request_id)
            .send()
            .await
            .context("请求失败")?;

        let users = handle_http_response::<Vec<ChatUser>>(response, "用户列表").await?;
        info!("[ConvAPI] ✅ 用户列表响应，用户数: {}", users.len());
        Ok(users)
    }
}
