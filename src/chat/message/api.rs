//! 消息 HTTP API 客户端
//!
//! 负责消息列表拉取、带附件的 multipart 发送、未读数、已读标记和附件下载

use crate::chat::attachment::{format_file_size, PendingAttachment};
use crate::chat::message::models::{MessageRecord, UnreadCountResp};
use crate::chat::types::{handle_http_response, HttpFailure};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// 上传进度回调（百分比 0-100）
pub type ProgressFn = Arc<dyn Fn(i32) + Send + Sync>;

/// 上传流的分片大小
const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

/// 消息相关的 HTTP API 客户端
pub struct MessageApi {
    client: reqwest::Client,
    api_base_url: String,
}

impl MessageApi {
    /// 创建新的消息 API 客户端
    ///
    /// `client` 应该已经在外部配置好 Authorization 头
    pub fn new(client: reqwest::Client, api_base_url: String) -> Self {
        Self {
            client,
            api_base_url,
        }
    }

    /// 拉取会话的完整消息列表（服务器按时间升序返回）
    pub async fn list_messages(&self, conversation_id: &str) -> Result<Vec<MessageRecord>> {
        let request_id = Uuid::new_v4().to_string();
        let url = format!(
            "{}/api/messages/conversation/{}",
            self.api_base_url, conversation_id
        );

        debug!("[MsgAPI] 📡 拉取消息列表: {}, 请求ID: {}", url, request_id);

        let response = self
            .client
            .get(&url)
            .header("x-request-id", &request_id)
            .send()
            .await
            .context("请求失败")?;

        let messages = handle_http_response::<Vec<MessageRecord>>(response, "消息列表").await?;
        debug!("[MsgAPI] ✅ 消息列表响应，消息数: {}", messages.len());
        Ok(messages)
    }

    /// 发送消息（multipart：conversationId + messageText + 若干 files 字段）
    ///
    /// 附件以分片流的形式写入请求体，`on_progress` 在每个分片被消费时
    /// 收到整体上传百分比
    pub async fn send_message(
        &self,
        conversation_id: &str,
        message_text: &str,
        attachments: &[PendingAttachment],
        on_progress: Option<ProgressFn>,
    ) -> Result<MessageRecord> {
        let request_id = Uuid::new_v4().to_string();
        let url = format!("{}/api/messages/send", self.api_base_url);

        info!(
            "[MsgAPI] 📤 发送消息: conversationID={}, 正文 {} 字, 附件 {} 个",
            conversation_id,
            message_text.chars().count(),
            attachments.len()
        );
        debug!("[MsgAPI]   请求URL: {}, 请求ID: {}", url, request_id);

        let mut form = reqwest::multipart::Form::new()
            .text("conversationId", conversation_id.to_string())
            .text("messageText", message_text.to_string());

        // 进度以全部附件的总字节数为分母
        let total_bytes: u64 = attachments.iter().map(|f| f.bytes.len() as u64).sum();
        let total_bytes = total_bytes.max(1);
        let sent_bytes = Arc::new(AtomicU64::new(0));

        for file in attachments {
            let chunks: Vec<Vec<u8>> = file
                .bytes
                .chunks(UPLOAD_CHUNK_BYTES)
                .map(|c| c.to_vec())
                .collect();
            let counter = sent_bytes.clone();
            let progress = on_progress.clone();
            // 分片在 reqwest 写请求体时才被拉取，进度随真实上传推进
            let stream = futures_util::stream::iter(chunks.into_iter().map(move |chunk| {
                let done = counter.fetch_add(chunk.len() as u64, Ordering::SeqCst)
                    + chunk.len() as u64;
                if let Some(cb) = &progress {
                    cb(((done * 100) / total_bytes) as i32);
                }
                Ok::<Vec<u8>, std::io::Error>(chunk)
            }));

            let part = reqwest::multipart::Part::stream_with_length(
                reqwest::Body::wrap_stream(stream),
                file.bytes.len() as u64,
            )
            .file_name(file.originalname.clone())
            .mime_str(&file.mimetype)
            .context("无效的 MIME 类型")?;
            form = form.part("files", part);
        }

        let response = self
            .client
            .post(&url)
            .header("x-request-id", &request_id)
            .multipart(form)
            .send()
            .await
            .context("请求失败")?;

        let record = handle_http_response::<MessageRecord>(response, "发送消息").await?;
        info!("[MsgAPI] ✅ 消息已发送: messageId={}", record.message_id);
        Ok(record)
    }

    /// 获取当前用户的未读消息数
    pub async fn unread_count(&self) -> Result<i64> {
        let request_id = Uuid::new_v4().to_string();
        let url = format!("{}/api/messages/unread-count", self.api_base_url);

        debug!("[MsgAPI] 📡 请求未读数: {}, 请求ID: {}", url, request_id);

        let response = self
            .client
            .get(&url)
            .header("x-request-id", &request_id)
            .send()
            .await
            .context("请求失败")?;

        let resp = handle_http_response::<UnreadCountResp>(response, "未读数").await?;
        debug!("[MsgAPI] 📬 未读数: {}", resp.count);
        Ok(resp.count)
    }

    /// 标记会话内对方消息为已读
    pub async fn mark_conversation_read(&self, conversation_id: &str) -> Result<()> {
        let request_id = Uuid::new_v4().to_string();
        let url = format!(
            "{}/api/messages/conversation/{}/read",
            self.api_base_url, conversation_id
        );

        debug!("[MsgAPI] 📡 标记已读: {}, 请求ID: {}", url, request_id);

        let response = self
            .client
            .post(&url)
            .header("x-request-id", &request_id)
            .send()
            .await
            .context("请求失败")?;

        // 响应体只有确认字段，校验状态码即可
        handle_http_response::<serde_json::Value>(response, "标记已读").await?;
        info!("[MsgAPI] ✅ 会话 {} 已标记已读", conversation_id);
        Ok(())
    }

    /// 按服务器存储名下载附件
    pub async fn download_file(&self, filename: &str) -> Result<Vec<u8>> {
        let request_id = Uuid::new_v4().to_string();
        let url = format!("{}/api/messages/file/{}", self.api_base_url, filename);

        info!("[MsgAPI] 📥 下载附件: {}", filename);
        debug!("[MsgAPI]   请求URL: {}, 请求ID: {}", url, request_id);

        let response = self
            .client
            .get(&url)
            .header("x-request-id", &request_id)
            .send()
            .await
            .context("请求失败")?;

        // 附件是原始字节流，不走 JSON 响应处理
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(anyhow::Error::new(HttpFailure {
                status: status.as_u16(),
                message,
            }));
        }

        let bytes = response.bytes().await.context("读取附件内容失败")?;
        info!(
            "[MsgAPI] ✅ 附件下载完成: {} ({})",
            filename,
            format_file_size(bytes.len() as u64)
        );
        Ok(bytes.to_vec())
    }
}
