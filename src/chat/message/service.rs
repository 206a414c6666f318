//! 聊天会话服务层
//!
//! 持有消息看板、草稿与附件盘，驱动两条流水线：
//! - 同步：带票据拉取全量消息列表，过期响应直接丢弃，失败不触碰现有状态
//! - 发送：乐观插入 → multipart 提交 → 按 localId 结算成功或失败，失败条目可重试

use crate::chat::attachment::{AttachmentTray, PendingAttachment};
use crate::chat::auth::Session;
use crate::chat::conversation::Conversation;
use crate::chat::message::api::{MessageApi, ProgressFn};
use crate::chat::message::listener::ChatListener;
use crate::chat::message::models::{ChatMessage, DayGroup, OptimisticMessage, SEND_FAILED_NOTICE};
use crate::chat::message::store::MessageBoard;
use crate::chat::types::is_auth_failure;
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// 单个会话的聊天状态机
///
/// 消息列表、草稿和附件盘都归本实例所有，跨任务访问通过内部锁串行化。
/// 同一时刻最多一个发送在途（`sending` 原子位），轮询与发送互不阻塞。
pub struct ChatSession {
    api: MessageApi,
    session: Session,
    listener: Arc<dyn ChatListener>,
    conversation: Mutex<Option<Conversation>>,
    board: Mutex<MessageBoard>,
    draft: Mutex<String>,
    tray: Mutex<AttachmentTray>,
    unread: Mutex<Option<i64>>,
    sending: AtomicBool,
}

impl ChatSession {
    pub fn new(api: MessageApi, session: Session, listener: Arc<dyn ChatListener>) -> Self {
        Self {
            api,
            session,
            listener,
            conversation: Mutex::new(None),
            board: Mutex::new(MessageBoard::new()),
            draft: Mutex::new(String::new()),
            tray: Mutex::new(AttachmentTray::new()),
            unread: Mutex::new(None),
            sending: AtomicBool::new(false),
        }
    }

    /// 切换当前会话：清空看板、作废在途拉取，并向监听器广播
    pub async fn bind_conversation(&self, conversation: Conversation) {
        info!("[ChatSync] 🔗 绑定会话: {}", conversation.conversation_id);
        let payload =
            serde_json::to_string(&conversation).unwrap_or_else(|_| "{}".to_string());
        {
            let mut guard = self.conversation.lock().await;
            *guard = Some(conversation);
        }
        self.board.lock().await.reset();
        self.listener.on_conversation_ready(payload).await;
        self.notify_list_changed().await;
    }

    pub async fn conversation(&self) -> Option<Conversation> {
        self.conversation.lock().await.clone()
    }

    pub async fn has_conversation(&self) -> bool {
        self.conversation.lock().await.is_some()
    }

    /// 从服务器拉取全量消息列表并替换已同步部分
    ///
    /// 没有绑定会话时直接跳过；拉取失败保留旧列表，等下一个周期。
    /// 票据机制保证慢响应不会覆盖更新的列表。
    pub async fn refresh(&self) -> Result<()> {
        let conversation_id = {
            let guard = self.conversation.lock().await;
            match guard.as_ref() {
                Some(c) => c.conversation_id.clone(),
                None => {
                    debug!("[ChatSync] 尚未绑定会话，跳过本次拉取");
                    return Ok(());
                }
            }
        };

        let ticket = self.board.lock().await.begin_fetch();
        match self.api.list_messages(&conversation_id).await {
            Ok(messages) => {
                let applied = self.board.lock().await.apply_fetch(ticket, messages);
                if applied == Some(true) {
                    self.notify_list_changed().await;
                }
                Ok(())
            }
            Err(e) => {
                warn!("[ChatSync] ⚠️ 拉取消息失败（票据 {}）: {}", ticket, e);
                Err(e)
            }
        }
    }

    /// 发送当前草稿与附件
    ///
    /// 空白草稿且无附件、或已有发送在途时为空操作。
    /// 发送失败不算错误，条目留在列表里等待重试；只有凭证失效才返回 Err。
    pub async fn send(&self) -> Result<()> {
        // 1. 空白草稿且无附件时不做任何事
        let text = self.draft.lock().await.clone();
        if text.trim().is_empty() && self.tray.lock().await.is_empty() {
            debug!("[ChatSync] 草稿为空且无附件，忽略发送");
            return Ok(());
        }

        // 2. 同一时刻只允许一个发送在途
        if self
            .sending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("[ChatSync] 已有发送在途，忽略本次发送");
            return Ok(());
        }

        let result = self.send_composed(text).await;
        self.sending.store(false, Ordering::SeqCst);
        result
    }

    async fn send_composed(&self, text: String) -> Result<()> {
        // 3. 取走附件并清空草稿；失败时不会自动回填，正文要靠重试找回
        let attachments = self.tray.lock().await.take_all();
        self.draft.lock().await.clear();
        let conversation_id = self
            .conversation
            .lock()
            .await
            .as_ref()
            .map(|c| c.conversation_id.clone());

        // 4. 无会话分支：不触网，本地排队一条不会自动解析的 Pending 消息
        let Some(conversation_id) = conversation_id else {
            let local_id = {
                let mut board = self.board.lock().await;
                let local_id = board.next_local_id();
                board.push_optimistic(OptimisticMessage::new(
                    local_id,
                    self.sender_type(),
                    &self.session.display_name,
                    text,
                    &attachments,
                ));
                local_id
            };
            info!(
                "[ChatSync] 💬 尚无会话，消息已本地排队: localId={}",
                local_id
            );
            self.notify_list_changed().await;
            return Ok(());
        };

        // 5. 乐观插入
        let local_id = {
            let mut board = self.board.lock().await;
            let local_id = board.next_local_id();
            board.push_optimistic(OptimisticMessage::new(
                local_id,
                self.sender_type(),
                &self.session.display_name,
                text.clone(),
                &attachments,
            ));
            local_id
        };
        self.notify_list_changed().await;

        // 6. 提交 multipart；进度从流式请求体经通道转发给监听器，百分比去重
        let (progress_tx, mut progress_rx) = tokio::sync::mpsc::unbounded_channel::<i32>();
        let progress_listener = self.listener.clone();
        let forwarder = tokio::spawn(async move {
            let mut last = -1;
            while let Some(percent) = progress_rx.recv().await {
                if percent != last {
                    last = percent;
                    progress_listener.on_send_progress(local_id, percent).await;
                }
            }
        });
        let on_progress: ProgressFn = Arc::new(move |percent| {
            let _ = progress_tx.send(percent);
        });

        let outcome = self
            .api
            .send_message(&conversation_id, &text, &attachments, Some(on_progress))
            .await;
        // 请求体释放后发送端全部关闭，等转发任务清空剩余进度事件
        let _ = forwarder.await;

        // 7. 结算；发送期间会话可能已切换，此时结果直接丢弃
        if !self.is_bound_to(&conversation_id).await {
            debug!(
                "[ChatSync] 会话已切换，丢弃 localId={} 的发送结果",
                local_id
            );
            return Ok(());
        }

        match outcome {
            Ok(record) => {
                info!(
                    "[ChatSync] ✅ 发送成功: localId={} -> messageId={}",
                    local_id, record.message_id
                );
                self.board.lock().await.resolve_success(local_id, record);
                self.notify_list_changed().await;
                Ok(())
            }
            Err(e) => {
                warn!("[ChatSync] ❌ 发送失败: localId={}, 错误: {}", local_id, e);
                self.board
                    .lock()
                    .await
                    .resolve_failure(local_id, SEND_FAILED_NOTICE);
                self.listener.on_send_failed(local_id, e.to_string()).await;
                self.notify_list_changed().await;
                if is_auth_failure(&e) {
                    Err(e)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// 重试一条失败消息：移出列表并把原文回填草稿
    ///
    /// 附件不恢复，需要用户重新选择。目标不存在或仍在 Pending 时返回 false。
    pub async fn retry(&self, local_id: i64) -> bool {
        let recovered = self.board.lock().await.take_failed(local_id);
        match recovered {
            Some(failed) => {
                *self.draft.lock().await = failed.message_text;
                info!(
                    "[ChatSync] 🔄 重试: localId={} 已移除，正文已回填草稿",
                    local_id
                );
                self.notify_list_changed().await;
                true
            }
            None => {
                debug!("[ChatSync] 重试目标不存在或不可重试: localId={}", local_id);
                false
            }
        }
    }

    pub async fn set_draft(&self, text: &str) {
        *self.draft.lock().await = text.to_string();
    }

    pub async fn draft(&self) -> String {
        self.draft.lock().await.clone()
    }

    /// 追加一批附件（与已有附件取并集），返回当前附件总数
    ///
    /// 超限或类型不符的文件会被剔除，并通过监听器给出一次汇总警告
    pub async fn add_attachments(&self, files: Vec<PendingAttachment>) -> usize {
        let (review, total) = {
            let mut tray = self.tray.lock().await;
            let review = tray.add_batch(files);
            (review, tray.len())
        };
        if let Some(warning) = review.warning() {
            warn!("[ChatSync] ⚠️ 附件校验: {}", warning);
            self.listener.on_attachments_rejected(warning).await;
        }
        total
    }

    /// 按下标移除一个待发附件，其余附件相对顺序不变
    pub async fn remove_attachment(&self, index: usize) -> bool {
        match self.tray.lock().await.remove(index) {
            Some(f) => {
                debug!("[ChatSync] 🗑️ 移除附件: {}", f.originalname);
                true
            }
            None => false,
        }
    }

    pub async fn attachment_names(&self) -> Vec<String> {
        self.tray
            .lock()
            .await
            .items()
            .iter()
            .map(|f| f.originalname.clone())
            .collect()
    }

    /// 当前列表快照：服务器记录在前，乐观条目在后
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.board.lock().await.snapshot()
    }

    /// 按本地时区日期分组的列表快照，供渲染层使用
    pub async fn day_groups(&self) -> Vec<DayGroup> {
        self.board.lock().await.group_by_day()
    }

    /// 拉取未读数，变化时通知监听器；失败保留上次值
    pub async fn refresh_unread(&self) -> Result<i64> {
        match self.api.unread_count().await {
            Ok(count) => {
                let changed = {
                    let mut guard = self.unread.lock().await;
                    let changed = *guard != Some(count);
                    *guard = Some(count);
                    changed
                };
                if changed {
                    self.listener.on_unread_count_changed(count).await;
                }
                Ok(count)
            }
            Err(e) => {
                warn!("[ChatSync] ⚠️ 拉取未读数失败，保留上次值: {}", e);
                Err(e)
            }
        }
    }

    pub async fn unread_count(&self) -> Option<i64> {
        *self.unread.lock().await
    }

    /// 把当前会话中对方的消息标记为已读
    pub async fn mark_read(&self) -> Result<()> {
        let conversation_id = self
            .conversation
            .lock()
            .await
            .as_ref()
            .map(|c| c.conversation_id.clone());
        match conversation_id {
            Some(id) => self.api.mark_conversation_read(&id).await,
            None => Ok(()),
        }
    }

    pub async fn download_file(&self, filename: &str) -> Result<Vec<u8>> {
        self.api.download_file(filename).await
    }

    async fn notify_list_changed(&self) {
        let snapshot = self.board.lock().await.snapshot();
        let payload = serde_json::to_string(&snapshot).unwrap_or_else(|_| "[]".to_string());
        self.listener.on_message_list_changed(payload).await;
    }

    async fn is_bound_to(&self, conversation_id: &str) -> bool {
        self.conversation
            .lock()
            .await
            .as_ref()
            .map(|c| c.conversation_id == conversation_id)
            .unwrap_or(false)
    }

    fn sender_type(&self) -> &'static str {
        if self.session.role.is_admin() {
            "admin"
        } else {
            "user"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::attachment::MAX_ATTACHMENT_BYTES;
    use crate::chat::message::listener::EmptyChatListener;
    use crate::chat::message::models::DeliveryState;
    use crate::chat::types::UserRole;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct RecordingListener {
        failures: StdMutex<Vec<(i64, String)>>,
        rejections: StdMutex<Vec<String>>,
        conversations: StdMutex<Vec<String>>,
        list_updates: StdMutex<usize>,
    }

    impl RecordingListener {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                failures: StdMutex::new(Vec::new()),
                rejections: StdMutex::new(Vec::new()),
                conversations: StdMutex::new(Vec::new()),
                list_updates: StdMutex::new(0),
            })
        }
    }

    #[async_trait]
    impl ChatListener for RecordingListener {
        async fn on_conversation_ready(&self, conversation: String) {
            self.conversations.lock().unwrap().push(conversation);
        }
        async fn on_message_list_changed(&self, _message_list: String) {
            *self.list_updates.lock().unwrap() += 1;
        }
        async fn on_send_failed(&self, local_id: i64, reason: String) {
            self.failures.lock().unwrap().push((local_id, reason));
        }
        async fn on_attachments_rejected(&self, warning: String) {
            self.rejections.lock().unwrap().push(warning);
        }
    }

    fn test_session(role: UserRole) -> Session {
        Session {
            user_id: "u-1".to_string(),
            display_name: "Sam Seller".to_string(),
            role,
            token: "test-token".to_string(),
        }
    }

    fn test_conversation() -> Conversation {
        Conversation {
            conversation_id: "conv-1".to_string(),
            user_id: "u-1".to_string(),
            user_name: "Sam Seller".to_string(),
            user_type: "seller".to_string(),
            created_at: "2025-06-01T10:00:00+00:00".to_string(),
        }
    }

    /// 指向打不开的端口，任何触网调用都会立刻失败
    fn offline_chat(listener: Arc<dyn ChatListener>) -> ChatSession {
        let api = MessageApi::new(reqwest::Client::new(), "http://127.0.0.1:1".to_string());
        ChatSession::new(api, test_session(UserRole::Seller), listener)
    }

    #[tokio::test]
    async fn blank_draft_without_attachments_is_a_no_op() {
        let chat = offline_chat(Arc::new(EmptyChatListener));
        chat.set_draft("   \n\t").await;
        chat.send().await.unwrap();
        assert!(chat.messages().await.is_empty());
    }

    #[tokio::test]
    async fn no_conversation_send_queues_locally_without_dialing() {
        let listener = RecordingListener::new();
        let chat = offline_chat(listener.clone());
        chat.set_draft("are my donations in?").await;
        chat.send().await.unwrap();

        let messages = chat.messages().await;
        assert_eq!(messages.len(), 1);
        // 对 127.0.0.1:1 的拨号会立刻失败并把条目标成 Failed；
        // 仍为 Pending 说明无会话分支没有触网
        match &messages[0] {
            ChatMessage::Optimistic(m) => assert_eq!(m.delivery, DeliveryState::Pending),
            other => panic!("预期乐观条目: {:?}", other),
        }
        assert_eq!(chat.draft().await, "");
        assert!(listener.failures.lock().unwrap().is_empty());

        // 刷新不会解析这条本地消息
        chat.refresh().await.unwrap();
        let messages = chat.messages().await;
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            ChatMessage::Optimistic(m) => assert_eq!(m.delivery, DeliveryState::Pending),
            other => panic!("预期乐观条目: {:?}", other),
        }
    }

    #[tokio::test]
    async fn queued_send_consumes_attachments_into_metadata() {
        let chat = offline_chat(Arc::new(EmptyChatListener));
        chat.add_attachments(vec![PendingAttachment::from_bytes(
            "receipt.pdf",
            "application/pdf",
            vec![1u8; 256],
        )])
        .await;
        // 正文为空但有附件，发送应当继续走排队分支
        chat.send().await.unwrap();

        let messages = chat.messages().await;
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            ChatMessage::Optimistic(m) => {
                assert_eq!(m.files.len(), 1);
                assert_eq!(m.files[0].originalname, "receipt.pdf");
            }
            other => panic!("预期乐观条目: {:?}", other),
        }
        assert!(chat.attachment_names().await.is_empty());
    }

    #[tokio::test]
    async fn failed_send_is_retryable_and_retry_restores_draft() {
        let listener = RecordingListener::new();
        let chat = offline_chat(listener.clone());
        chat.bind_conversation(test_conversation()).await;
        chat.set_draft("hello").await;
        chat.add_attachments(vec![PendingAttachment::from_bytes(
            "photo.jpg",
            "image/jpeg",
            vec![0u8; 64],
        )])
        .await;
        chat.send().await.unwrap();

        let messages = chat.messages().await;
        assert_eq!(messages.len(), 1);
        let local_id = match &messages[0] {
            ChatMessage::Optimistic(m) => {
                match &m.delivery {
                    DeliveryState::Failed { error_message } => {
                        assert_eq!(error_message, SEND_FAILED_NOTICE);
                    }
                    other => panic!("预期失败状态: {:?}", other),
                }
                m.local_id
            }
            other => panic!("预期乐观条目: {:?}", other),
        };
        // 失败不回填草稿，附件也已被本次发送消耗
        assert_eq!(chat.draft().await, "");
        assert!(chat.attachment_names().await.is_empty());
        assert_eq!(listener.failures.lock().unwrap().len(), 1);
        assert_eq!(listener.failures.lock().unwrap()[0].0, local_id);

        // 重试移除条目并回填原文；附件不恢复
        assert!(chat.retry(local_id).await);
        assert!(chat.messages().await.is_empty());
        assert_eq!(chat.draft().await, "hello");
        assert!(chat.attachment_names().await.is_empty());

        // 同一条目不能重试两次
        assert!(!chat.retry(local_id).await);
    }

    #[tokio::test]
    async fn send_is_ignored_while_another_is_in_flight() {
        let chat = offline_chat(Arc::new(EmptyChatListener));
        chat.bind_conversation(test_conversation()).await;
        chat.sending.store(true, Ordering::SeqCst);
        chat.set_draft("hello").await;
        chat.send().await.unwrap();

        // 被忽略的发送不消费草稿，也不插入条目
        assert!(chat.messages().await.is_empty());
        assert_eq!(chat.draft().await, "hello");
    }

    #[tokio::test]
    async fn oversized_attachment_triggers_single_rejection_warning() {
        let listener = RecordingListener::new();
        let chat = offline_chat(listener.clone());
        let kept = chat
            .add_attachments(vec![
                PendingAttachment::from_bytes("fair.jpg", "image/jpeg", vec![0u8; 64]),
                PendingAttachment::from_bytes(
                    "huge.zip",
                    "application/zip",
                    vec![0u8; MAX_ATTACHMENT_BYTES as usize + 1],
                ),
            ])
            .await;

        assert_eq!(kept, 1);
        assert_eq!(chat.attachment_names().await, vec!["fair.jpg".to_string()]);
        let rejections = listener.rejections.lock().unwrap();
        assert_eq!(rejections.len(), 1);
        assert!(rejections[0].contains("huge.zip"));
    }

    #[tokio::test]
    async fn binding_a_conversation_resets_the_board() {
        let listener = RecordingListener::new();
        let chat = offline_chat(listener.clone());
        chat.set_draft("queued before conversation").await;
        chat.send().await.unwrap();
        assert_eq!(chat.messages().await.len(), 1);

        chat.bind_conversation(test_conversation()).await;
        assert!(chat.messages().await.is_empty());
        assert!(chat.has_conversation().await);
        let announced = listener.conversations.lock().unwrap();
        assert_eq!(announced.len(), 1);
        assert!(announced[0].contains("conv-1"));
        // 绑定后至少广播过一次列表变化
        assert!(*listener.list_updates.lock().unwrap() >= 1);
    }
}
