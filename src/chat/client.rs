//! Thrift Haven 聊天客户端核心实现模块
//!
//! 组合会话解析、消息同步、发送流水线与通知聚合，
//! 并持有全部轮询任务的句柄，关停或析构时统一取消。

use crate::chat::attachment::PendingAttachment;
use crate::chat::auth::Session;
use crate::chat::badge::{
    BadgeAggregator, BadgeApi, BadgeListener, EmptyBadgeListener, NotificationCounts,
};
use crate::chat::conversation::{ChatUser, Conversation, ConversationApi, ConversationResolver};
use crate::chat::message::{
    ChatListener, ChatMessage, ChatSession, DayGroup, EmptyChatListener, MessageApi,
};
use crate::chat::types::is_auth_failure;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info, warn};

/// 客户端配置
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// HTTP API 基础地址，所有端点都在其下构造
    pub api_base_url: String,
    /// 消息列表轮询周期（秒）
    pub message_poll_secs: u64,
    /// 通知计数与用户目录轮询周期（秒）
    pub notify_poll_secs: u64,
}

impl ClientConfig {
    /// 创建默认配置
    pub fn new(api_base_url: String) -> Self {
        Self {
            api_base_url,
            message_poll_secs: 10,
            notify_poll_secs: 30,
        }
    }
}

/// Thrift Haven 聊天客户端
///
/// 每个登录身份各持有一个实例；start 后内部任务按配置周期轮询，
/// 全部状态随实例销毁，不做任何跨实例共享
pub struct HavenChatClient {
    config: ClientConfig,
    session: Session,
    // 聊天监听器（可由调用方注册）
    chat_listener: Arc<dyn ChatListener>,
    // 徽标监听器（可由调用方注册，仅管理员会收到回调）
    badge_listener: Arc<dyn BadgeListener>,
    conversation_api: Option<Arc<ConversationApi>>,
    resolver: Option<Arc<ConversationResolver>>,
    chat: Option<Arc<ChatSession>>,
    badge: Option<Arc<BadgeAggregator>>,
    // 轮询任务句柄，shutdown 时统一 abort
    tasks: Vec<JoinHandle<()>>,
}

impl HavenChatClient {
    /// 创建新的客户端
    /// - `config`: 客户端配置
    /// - `session`: 登录得到的会话凭证
    pub fn new(config: ClientConfig, session: Session) -> Self {
        Self {
            config,
            session,
            chat_listener: Arc::new(EmptyChatListener),
            badge_listener: Arc::new(EmptyBadgeListener),
            conversation_api: None,
            resolver: None,
            chat: None,
            badge: None,
            tasks: Vec::new(),
        }
    }

    /// 注册聊天监听器（须在 start 之前调用）
    pub fn set_chat_listener(&mut self, listener: Arc<dyn ChatListener>) {
        self.chat_listener = listener;
    }

    /// 注册徽标监听器（须在 start 之前调用）
    pub fn set_badge_listener(&mut self, listener: Arc<dyn BadgeListener>) {
        self.badge_listener = listener;
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// 启动客户端：构建 HTTP 客户端、解析会话并拉起轮询任务
    ///
    /// 非管理员会先尝试解析自己与管理员的会话；解析失败不阻止启动，
    /// 发送的消息会走本地排队分支直到会话可用
    pub async fn start(&mut self) -> Result<()> {
        info!(
            "[Client] 🔗 启动聊天客户端 (user={}, role={})",
            self.session.user_id, self.session.role
        );

        // 1. 构造带 Bearer 头的 HTTP 客户端，全部 API 共用
        let mut headers = reqwest::header::HeaderMap::new();
        let bearer = format!("Bearer {}", self.session.token);
        let auth_value =
            reqwest::header::HeaderValue::from_str(&bearer).context("token 含非法字符")?;
        headers.insert(reqwest::header::AUTHORIZATION, auth_value);
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("构建 HTTP 客户端失败")?;
        let base = self.config.api_base_url.clone();

        let conversation_api = Arc::new(ConversationApi::new(http.clone(), base.clone()));
        self.conversation_api = Some(conversation_api.clone());
        self.resolver = Some(Arc::new(ConversationResolver::new(ConversationApi::new(
            http.clone(),
            base.clone(),
        ))));

        let chat = Arc::new(ChatSession::new(
            MessageApi::new(http.clone(), base.clone()),
            self.session.clone(),
            self.chat_listener.clone(),
        ));
        self.chat = Some(chat.clone());

        // 2. 非管理员在启动时解析（或创建）自己与管理员的会话
        if !self.session.role.is_admin() {
            if let Some(resolver) = &self.resolver {
                match resolver.resolve_own().await {
                    Ok(conversation) => chat.bind_conversation(conversation).await,
                    Err(e) => {
                        warn!("[Client] ⚠️ 会话解析失败，消息将本地排队: {}", e);
                    }
                }
            }
        }

        // 凭证失效只向监听器广播一次，各轮询任务竞争这面旗
        let auth_expired = Arc::new(AtomicBool::new(false));

        // 3. 消息列表轮询（首个 tick 立即触发，承担挂载时的首次拉取）
        let chat_for_poll = chat.clone();
        let listener_for_poll = self.chat_listener.clone();
        let auth_flag = auth_expired.clone();
        let message_poll_secs = self.config.message_poll_secs;
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(message_poll_secs));
            loop {
                ticker.tick().await;
                if let Err(e) = chat_for_poll.refresh().await {
                    if is_auth_failure(&e) {
                        error!("[Client] ❌ 凭证失效，消息轮询停止");
                        if auth_flag
                            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                            .is_ok()
                        {
                            listener_for_poll.on_auth_expired().await;
                        }
                        break;
                    }
                }
            }
        }));

        let notify_poll_secs = self.config.notify_poll_secs;
        if self.session.role.is_admin() {
            // 4a. 管理员：通知徽标聚合轮询
            let badge = Arc::new(BadgeAggregator::new(
                BadgeApi::new(http.clone(), base.clone()),
                self.badge_listener.clone(),
            ));
            self.badge = Some(badge.clone());

            let badge_for_poll = badge.clone();
            let listener_for_badge = self.chat_listener.clone();
            let auth_flag = auth_expired.clone();
            self.tasks.push(tokio::spawn(async move {
                let mut ticker = interval(Duration::from_secs(notify_poll_secs));
                loop {
                    ticker.tick().await;
                    // 普通失败在聚合器内部消化，Err 一定是凭证失效
                    if badge_for_poll.refresh().await.is_err() {
                        error!("[Client] ❌ 凭证失效，通知聚合停止");
                        if auth_flag
                            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                            .is_ok()
                        {
                            listener_for_badge.on_auth_expired().await;
                        }
                        break;
                    }
                }
            }));

            // 4b. 管理员：聊天用户目录轮询，变化时才广播
            let directory_api = conversation_api.clone();
            let directory_listener = self.chat_listener.clone();
            let auth_flag = auth_expired.clone();
            self.tasks.push(tokio::spawn(async move {
                let mut ticker = interval(Duration::from_secs(notify_poll_secs));
                let mut last_payload = String::new();
                loop {
                    ticker.tick().await;
                    match directory_api.list_chat_users().await {
                        Ok(users) => {
                            let payload = serde_json::to_string(&users)
                                .unwrap_or_else(|_| "[]".to_string());
                            if payload != last_payload {
                                last_payload = payload.clone();
                                directory_listener.on_chat_users_changed(payload).await;
                            }
                        }
                        Err(e) => {
                            if is_auth_failure(&e) {
                                error!("[Client] ❌ 凭证失效，用户目录轮询停止");
                                if auth_flag
                                    .compare_exchange(
                                        false,
                                        true,
                                        Ordering::SeqCst,
                                        Ordering::SeqCst,
                                    )
                                    .is_ok()
                                {
                                    directory_listener.on_auth_expired().await;
                                }
                                break;
                            }
                            warn!("[Client] ⚠️ 拉取聊天用户目录失败: {}", e);
                        }
                    }
                }
            }));
        } else {
            // 4c. 非管理员：未读数轮询
            let chat_for_unread = chat.clone();
            let listener_for_unread = self.chat_listener.clone();
            let auth_flag = auth_expired.clone();
            self.tasks.push(tokio::spawn(async move {
                let mut ticker = interval(Duration::from_secs(notify_poll_secs));
                loop {
                    ticker.tick().await;
                    if let Err(e) = chat_for_unread.refresh_unread().await {
                        if is_auth_failure(&e) {
                            error!("[Client] ❌ 凭证失效，未读数轮询停止");
                            if auth_flag
                                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                                .is_ok()
                            {
                                listener_for_unread.on_auth_expired().await;
                            }
                            break;
                        }
                    }
                }
            }));
        }

        info!("[Client] ✅ 客户端已启动，轮询任务数: {}", self.tasks.len());
        Ok(())
    }

    /// 手动触发一次消息列表刷新
    pub async fn refresh_now(&self) -> Result<()> {
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("聊天会话未初始化"))?;
        chat.refresh().await
    }

    /// 发送当前草稿与附件
    pub async fn send_message(&self) -> Result<()> {
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("聊天会话未初始化"))?;
        chat.send().await
    }

    /// 重试一条失败消息，返回是否找到了可重试的条目
    pub async fn retry_message(&self, local_id: i64) -> Result<bool> {
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("聊天会话未初始化"))?;
        Ok(chat.retry(local_id).await)
    }

    pub async fn set_draft(&self, text: &str) -> Result<()> {
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("聊天会话未初始化"))?;
        chat.set_draft(text).await;
        Ok(())
    }

    pub async fn draft(&self) -> Result<String> {
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("聊天会话未初始化"))?;
        Ok(chat.draft().await)
    }

    /// 追加附件，返回当前附件总数；不符合要求的文件会触发一次警告回调
    pub async fn add_attachments(&self, files: Vec<PendingAttachment>) -> Result<usize> {
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("聊天会话未初始化"))?;
        Ok(chat.add_attachments(files).await)
    }

    pub async fn remove_attachment(&self, index: usize) -> Result<bool> {
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("聊天会话未初始化"))?;
        Ok(chat.remove_attachment(index).await)
    }

    pub async fn attachment_names(&self) -> Result<Vec<String>> {
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("聊天会话未初始化"))?;
        Ok(chat.attachment_names().await)
    }

    /// 当前消息列表快照（服务器记录在前，乐观条目在后）
    pub async fn messages(&self) -> Result<Vec<ChatMessage>> {
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("聊天会话未初始化"))?;
        Ok(chat.messages().await)
    }

    /// 按本地时区日期分组的消息列表
    pub async fn day_groups(&self) -> Result<Vec<DayGroup>> {
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("聊天会话未初始化"))?;
        Ok(chat.day_groups().await)
    }

    pub async fn current_conversation(&self) -> Result<Option<Conversation>> {
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("聊天会话未初始化"))?;
        Ok(chat.conversation().await)
    }

    /// 管理员与指定用户开启（或找回）会话并切换过去
    ///
    /// 绑定后立即拉取一次消息并把对方消息标记已读；
    /// 这两步失败不影响会话本身，留给下一个轮询周期补
    pub async fn open_conversation_with(
        &self,
        user_id: &str,
        user_type: &str,
    ) -> Result<Conversation> {
        let resolver = self
            .resolver
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("会话解析器未初始化"))?;
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("聊天会话未初始化"))?;

        let conversation = resolver.open_with(user_id, user_type).await?;
        chat.bind_conversation(conversation.clone()).await;
        if let Err(e) = chat.refresh().await {
            warn!("[Client] ⚠️ 切换会话后的首次拉取失败: {}", e);
        }
        if let Err(e) = chat.mark_read().await {
            warn!("[Client] ⚠️ 标记已读失败: {}", e);
        }
        Ok(conversation)
    }

    /// 非管理员重新解析自己与管理员的会话并切换过去
    ///
    /// 切换会清空本地排队的消息（与会话变更时的全量替换一致）
    pub async fn resolve_conversation(&self) -> Result<Conversation> {
        let resolver = self
            .resolver
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("会话解析器未初始化"))?;
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("聊天会话未初始化"))?;

        let conversation = resolver.resolve_own().await?;
        chat.bind_conversation(conversation.clone()).await;
        Ok(conversation)
    }

    /// 把当前会话标记为已读
    pub async fn mark_conversation_read(&self) -> Result<()> {
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("聊天会话未初始化"))?;
        chat.mark_read().await
    }

    /// 手动拉取一次聊天用户目录（管理员的会话列表面板）
    pub async fn refresh_chat_users(&self) -> Result<Vec<ChatUser>> {
        let api = self
            .conversation_api
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("会话 API 未初始化"))?;
        api.list_chat_users().await
    }

    /// 最近一次聚合出的通知计数（仅管理员）
    pub async fn notification_counts(&self) -> Result<NotificationCounts> {
        let badge = self
            .badge
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("通知聚合器未初始化（仅管理员可用）"))?;
        Ok(badge.counts().await)
    }

    /// 手动触发一次通知计数刷新（仅管理员）
    pub async fn refresh_badge_now(&self) -> Result<NotificationCounts> {
        let badge = self
            .badge
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("通知聚合器未初始化（仅管理员可用）"))?;
        badge.refresh().await
    }

    /// 最近一次轮询得到的未读数（尚未拉取过时为 None）
    pub async fn unread_count(&self) -> Result<Option<i64>> {
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("聊天会话未初始化"))?;
        Ok(chat.unread_count().await)
    }

    /// 按服务器存储名下载附件内容
    pub async fn download_file(&self, filename: &str) -> Result<Vec<u8>> {
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("聊天会话未初始化"))?;
        chat.download_file(filename).await
    }

    /// 关停客户端：取消全部轮询任务并释放内部状态
    ///
    /// 任务取消同时会掐断其中的在途请求
    pub fn shutdown(&mut self) {
        info!("[Client] 👋 关停聊天客户端，取消 {} 个任务", self.tasks.len());
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.chat = None;
        self.badge = None;
        self.resolver = None;
        self.conversation_api = None;
    }
}

impl Drop for HavenChatClient {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}
