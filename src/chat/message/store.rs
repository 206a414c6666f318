//! 消息列表的内存状态
//!
//! 服务器返回的列表整体替换已同步部分，本地乐观消息追加在尾部，
//! 只能由发送流水线按 local_id 精确摘除。每次拉取领取一个单调递增的
//! 票号，过期响应直接丢弃，避免轮询结果覆盖更新的状态

use crate::chat::message::models::{
    ChatMessage, DayGroup, DeliveryState, MessageRecord, OptimisticMessage,
};
use tracing::debug;

/// 把 ISO 时间戳换算成本地自然日（YYYY-MM-DD）
fn local_day(created_at: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(created_at) {
        return dt
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d")
            .to_string();
    }
    // 解析失败时取前 10 位兜底（服务器时间都是 ISO 格式）
    created_at.chars().take(10).collect()
}

/// 消息看板
#[derive(Debug, Default)]
pub struct MessageBoard {
    /// 服务器已确认的消息，顺序以服务器为准
    persisted: Vec<MessageRecord>,
    /// 本地乐观消息（上传中 / 失败 / 无会话排队），按插入顺序排列
    optimistic: Vec<OptimisticMessage>,
    /// 上一个分配出去的本地 ID
    last_local_id: i64,
    /// 已领取的拉取票号
    fetch_issued: u64,
    /// 已应用的最新拉取票号
    fetch_applied: u64,
}

impl MessageBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 领取一次拉取的票号（发请求前调用）
    pub fn begin_fetch(&mut self) -> u64 {
        self.fetch_issued += 1;
        self.fetch_issued
    }

    /// 应用拉取结果
    ///
    /// 票号不是最新时说明已有更晚的拉取落地（或会话已切换），结果作废。
    /// 返回 None 表示已丢弃，Some(changed) 表示是否引起了列表变化
    pub fn apply_fetch(&mut self, ticket: u64, messages: Vec<MessageRecord>) -> Option<bool> {
        if ticket <= self.fetch_applied {
            debug!(
                "[Board] 丢弃过期拉取结果，票号: {}, 最新: {}",
                ticket, self.fetch_applied
            );
            return None;
        }
        self.fetch_applied = ticket;
        let changed = self.persisted != messages;
        self.persisted = messages;
        Some(changed)
    }

    /// 清空看板（切换会话时调用），同时作废所有在途拉取
    pub fn reset(&mut self) {
        self.persisted.clear();
        self.optimistic.clear();
        self.fetch_applied = self.fetch_issued;
    }

    /// 分配本地消息 ID：当前毫秒时间戳，和上一个冲突时递增
    pub fn next_local_id(&mut self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        self.last_local_id = now.max(self.last_local_id + 1);
        self.last_local_id
    }

    pub fn push_optimistic(&mut self, msg: OptimisticMessage) {
        self.optimistic.push(msg);
    }

    /// 发送成功：按 local_id 摘除乐观占位，追加服务器记录
    ///
    /// 若轮询已经先一步带回了这条记录，则只摘除占位不重复追加
    pub fn resolve_success(&mut self, local_id: i64, record: MessageRecord) -> bool {
        let before = self.optimistic.len();
        self.optimistic.retain(|m| m.local_id != local_id);
        let removed = self.optimistic.len() < before;

        let already_synced = self
            .persisted
            .iter()
            .any(|m| m.message_id == record.message_id);
        if !already_synced {
            self.persisted.push(record);
        }
        removed
    }

    /// 发送失败：原地把占位标记为失败态，列表位置不变
    pub fn resolve_failure(&mut self, local_id: i64, error_message: &str) -> bool {
        if let Some(entry) = self.optimistic.iter_mut().find(|m| m.local_id == local_id) {
            entry.delivery = DeliveryState::Failed {
                error_message: error_message.to_string(),
            };
            true
        } else {
            false
        }
    }

    /// 取走一条失败消息用于重试（非失败态的条目不允许取走）
    pub fn take_failed(&mut self, local_id: i64) -> Option<OptimisticMessage> {
        let idx = self
            .optimistic
            .iter()
            .position(|m| m.local_id == local_id && m.is_failed())?;
        Some(self.optimistic.remove(idx))
    }

    /// 当前完整列表：服务器消息在前，乐观消息按插入顺序附在尾部
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        let mut list: Vec<ChatMessage> = self
            .persisted
            .iter()
            .cloned()
            .map(ChatMessage::Persisted)
            .collect();
        list.extend(self.optimistic.iter().cloned().map(ChatMessage::Optimistic));
        list
    }

    /// 按本地自然日分组（组内保持原顺序）
    pub fn group_by_day(&self) -> Vec<DayGroup> {
        let mut groups: Vec<DayGroup> = Vec::new();
        for msg in self.snapshot() {
            let date = local_day(msg.created_at());
            match groups.iter_mut().find(|g| g.date == date) {
                Some(group) => group.messages.push(msg),
                None => groups.push(DayGroup {
                    date,
                    messages: vec![msg],
                }),
            }
        }
        groups
    }

    pub fn len(&self) -> usize {
        self.persisted.len() + self.optimistic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persisted.is_empty() && self.optimistic.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::models::SEND_FAILED_NOTICE;
    use chrono::TimeZone;

    fn record(id: &str, text: &str, created_at: &str) -> MessageRecord {
        MessageRecord {
            message_id: id.to_string(),
            conversation_id: "c-1".to_string(),
            sender_type: "user".to_string(),
            sender_name: "Jamie".to_string(),
            message_text: text.to_string(),
            created_at: created_at.to_string(),
            files: vec![],
            is_read: false,
        }
    }

    fn optimistic(board: &mut MessageBoard, text: &str) -> i64 {
        let local_id = board.next_local_id();
        board.push_optimistic(OptimisticMessage::new(
            local_id,
            "user",
            "Jamie",
            text.to_string(),
            &[],
        ));
        local_id
    }

    #[test]
    fn fetch_replaces_persisted_and_keeps_optimistic() {
        let mut board = MessageBoard::new();
        let local_id = optimistic(&mut board, "pending one");

        let ticket = board.begin_fetch();
        let changed = board.apply_fetch(
            ticket,
            vec![
                record("m-1", "hi", "2025-06-01T10:00:00Z"),
                record("m-2", "hello", "2025-06-01T10:01:00Z"),
            ],
        );
        assert_eq!(changed, Some(true));

        let snapshot = board.snapshot();
        assert_eq!(snapshot.len(), 3);
        // 乐观消息保持在尾部
        assert_eq!(snapshot[2].local_id(), Some(local_id));
    }

    #[test]
    fn identical_fetch_reports_no_change() {
        let mut board = MessageBoard::new();
        let list = vec![record("m-1", "hi", "2025-06-01T10:00:00Z")];

        let t1 = board.begin_fetch();
        assert_eq!(board.apply_fetch(t1, list.clone()), Some(true));
        let t2 = board.begin_fetch();
        assert_eq!(board.apply_fetch(t2, list), Some(false));
    }

    #[test]
    fn stale_fetch_response_is_discarded() {
        let mut board = MessageBoard::new();
        let t1 = board.begin_fetch();
        let t2 = board.begin_fetch();

        // 后发的请求先回来
        assert_eq!(
            board.apply_fetch(t2, vec![record("m-2", "newer", "2025-06-01T10:01:00Z")]),
            Some(true)
        );
        // 先发的请求迟到，必须丢弃
        assert_eq!(
            board.apply_fetch(t1, vec![record("m-1", "older", "2025-06-01T10:00:00Z")]),
            None
        );

        let snapshot = board.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].message_text(), "newer");
    }

    #[test]
    fn reset_invalidates_inflight_fetch() {
        let mut board = MessageBoard::new();
        let ticket = board.begin_fetch();

        // 切换会话后，旧会话的在途响应不能落地
        board.reset();
        assert_eq!(
            board.apply_fetch(ticket, vec![record("m-1", "old conv", "2025-06-01T10:00:00Z")]),
            None
        );
        assert!(board.is_empty());

        // 新领的票号正常工作
        let ticket = board.begin_fetch();
        assert_eq!(
            board.apply_fetch(ticket, vec![record("m-9", "new conv", "2025-06-01T11:00:00Z")]),
            Some(true)
        );
    }

    #[test]
    fn success_leaves_exactly_one_copy() {
        let mut board = MessageBoard::new();
        let local_id = optimistic(&mut board, "buying this!");
        assert_eq!(board.len(), 1);

        let server_copy = record("m-50", "buying this!", "2025-06-01T12:00:00Z");
        assert!(board.resolve_success(local_id, server_copy));

        let snapshot = board.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(matches!(&snapshot[0], ChatMessage::Persisted(m) if m.message_id == "m-50"));
    }

    #[test]
    fn success_after_poll_already_synced_does_not_duplicate() {
        let mut board = MessageBoard::new();
        let local_id = optimistic(&mut board, "double?");

        // 发送期间的一次轮询已经带回了这条消息
        let ticket = board.begin_fetch();
        board.apply_fetch(
            ticket,
            vec![record("m-77", "double?", "2025-06-01T12:00:00Z")],
        );

        board.resolve_success(local_id, record("m-77", "double?", "2025-06-01T12:00:00Z"));

        let snapshot = board.snapshot();
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn failure_marks_entry_in_place() {
        let mut board = MessageBoard::new();
        optimistic(&mut board, "first");
        let failed_id = optimistic(&mut board, "hello");

        assert!(board.resolve_failure(failed_id, SEND_FAILED_NOTICE));

        let snapshot = board.snapshot();
        assert_eq!(snapshot.len(), 2);
        // 失败条目保持原位置，错误文案可供界面展示
        match &snapshot[1] {
            ChatMessage::Optimistic(m) => {
                assert!(m.is_failed());
                assert_eq!(
                    m.delivery,
                    DeliveryState::Failed {
                        error_message: SEND_FAILED_NOTICE.to_string()
                    }
                );
            }
            other => panic!("期望乐观消息，实际: {:?}", other),
        }
    }

    #[test]
    fn take_failed_recovers_text_and_removes_entry() {
        let mut board = MessageBoard::new();
        let local_id = optimistic(&mut board, "hello");
        board.resolve_failure(local_id, SEND_FAILED_NOTICE);

        let taken = board.take_failed(local_id).expect("应取到失败消息");
        assert_eq!(taken.message_text, "hello");
        assert!(board.is_empty());

        // 再取一次应为空
        assert!(board.take_failed(local_id).is_none());
    }

    #[test]
    fn take_failed_refuses_pending_entry() {
        let mut board = MessageBoard::new();
        let local_id = optimistic(&mut board, "still uploading");
        assert!(board.take_failed(local_id).is_none());
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn local_ids_strictly_increase() {
        let mut board = MessageBoard::new();
        let a = board.next_local_id();
        let b = board.next_local_id();
        let c = board.next_local_id();
        assert!(a < b && b < c);
    }

    #[test]
    fn day_grouping_preserves_order_across_two_days() {
        // 用本地时区构造时间，保证分组结果与运行环境无关
        let day1_morning = chrono::Local
            .with_ymd_and_hms(2025, 3, 1, 10, 0, 0)
            .single()
            .expect("有效时间")
            .to_rfc3339();
        let day1_noon = chrono::Local
            .with_ymd_and_hms(2025, 3, 1, 12, 30, 0)
            .single()
            .expect("有效时间")
            .to_rfc3339();
        let day2 = chrono::Local
            .with_ymd_and_hms(2025, 3, 2, 9, 0, 0)
            .single()
            .expect("有效时间")
            .to_rfc3339();

        let mut board = MessageBoard::new();
        let ticket = board.begin_fetch();
        board.apply_fetch(
            ticket,
            vec![
                record("m-1", "morning", &day1_morning),
                record("m-2", "noon", &day1_noon),
                record("m-3", "next day", &day2),
            ],
        );

        let groups = board.group_by_day();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].date, "2025-03-01");
        assert_eq!(groups[1].date, "2025-03-02");
        assert_eq!(groups[0].messages.len(), 2);
        assert_eq!(groups[0].messages[0].message_text(), "morning");
        assert_eq!(groups[0].messages[1].message_text(), "noon");
        assert_eq!(groups[1].messages[0].message_text(), "next day");
    }

    #[test]
    fn day_grouping_falls_back_on_unparseable_timestamp() {
        let mut board = MessageBoard::new();
        let ticket = board.begin_fetch();
        board.apply_fetch(ticket, vec![record("m-1", "odd", "2025-06-01 not-iso")]);

        let groups = board.group_by_day();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].date, "2025-06-01");
    }
}
