use super::models::{Notification, NotificationPriority, NotificationSeverity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 台帳に保持する通知の最大件数
pub const MAX_NOTIFICATIONS: usize = 20;

/// 通知台帳
///
/// 新しいものが先頭。IDの重複は登録せず、上限を超えた分は古いものから削除する。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationLedger {
    entries: Vec<Notification>,
}

impl NotificationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 保存済みの通知から台帳を復元する
    ///
    /// 重複IDは最初のもののみ残し、上限を超える分は切り捨てる。
    pub fn from_entries(entries: Vec<Notification>) -> Self {
        let mut seen = HashSet::new();
        let mut entries: Vec<Notification> = entries
            .into_iter()
            .filter(|n| seen.insert(n.id.clone()))
            .collect();
        entries.truncate(MAX_NOTIFICATIONS);
        Self { entries }
    }

    /// 候補を台帳にマージする
    ///
    /// # 戻り値
    /// 新しく追加された通知（通知音の判定に使う）
    pub fn merge(&mut self, candidates: Vec<Notification>) -> Vec<Notification> {
        let mut known: HashSet<String> = self.entries.iter().map(|n| n.id.clone()).collect();
        let fresh: Vec<Notification> = candidates
            .into_iter()
            .filter(|n| known.insert(n.id.clone()))
            .collect();

        if fresh.is_empty() {
            return fresh;
        }

        let mut merged = fresh.clone();
        merged.append(&mut self.entries);
        merged.truncate(MAX_NOTIFICATIONS);
        self.entries = merged;

        fresh
    }

    /// リマインダー以外のアラートを追加する
    pub fn push_alert(
        &mut self,
        title: impl Into<String>,
        message: impl Into<String>,
        severity: NotificationSeverity,
        now: DateTime<Utc>,
    ) -> Notification {
        let priority = match severity {
            NotificationSeverity::Info => NotificationPriority::Low,
            NotificationSeverity::Warning => NotificationPriority::Medium,
            NotificationSeverity::Critical => NotificationPriority::High,
        };
        let alert = Notification {
            id: format!("alert-{}", uuid::Uuid::new_v4()),
            subscription_id: None,
            title: title.into(),
            message: message.into(),
            timestamp: now,
            read: false,
            severity,
            priority,
        };
        self.merge(vec![alert.clone()]);
        alert
    }

    /// 既読にする（未知のIDは何もしない）
    ///
    /// # 戻り値
    /// 状態が変化した場合はtrue
    pub fn mark_as_read(&mut self, id: &str) -> bool {
        match self.entries.iter_mut().find(|n| n.id == id) {
            Some(entry) if !entry.read => {
                entry.read = true;
                true
            }
            _ => false,
        }
    }

    /// すべて既読にする
    pub fn mark_all_as_read(&mut self) -> bool {
        let mut changed = false;
        for entry in self.entries.iter_mut().filter(|n| !n.read) {
            entry.read = true;
            changed = true;
        }
        changed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 未読件数
    pub fn unread_count(&self) -> usize {
        self.entries.iter().filter(|n| !n.read).count()
    }

    pub fn entries(&self) -> &[Notification] {
        &self.entries
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|n| n.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
