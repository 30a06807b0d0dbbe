use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 通知の重要度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSeverity {
    Info,
    Warning,
    Critical,
}

/// 通知の優先度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// 通知（更新リマインダー・アラート）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    pub severity: NotificationSeverity,
    pub priority: NotificationPriority,
}

/// リマインダーIDを生成する
///
/// `(サブスクリプションID, 残り日数, 日付)`から決定的に作るため、
/// 同じ日に再計算しても同じIDになる。
pub fn reminder_id(subscription_id: &str, days_left: i64, today: NaiveDate) -> String {
    format!(
        "reminder-{subscription_id}-{days_left}-{}",
        today.format("%Y-%m-%d")
    )
}
