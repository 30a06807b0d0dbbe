use super::models::{reminder_id, Notification, NotificationPriority, NotificationSeverity};
use crate::features::subscriptions::Subscription;
use chrono::{DateTime, NaiveDate, Utc};

/// 本日通知すべき更新リマインダーを計算する
///
/// # 引数
/// * `subscriptions` - サブスクリプション一覧
/// * `today` - 今日の日付（時刻は切り捨て済み）
/// * `now` - 通知のタイムスタンプ
///
/// # 戻り値
/// 候補となる通知。IDは決定的なので、台帳側で重複が除かれる。
pub fn compute_due_reminders(
    subscriptions: &[Subscription],
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Vec<Notification> {
    subscriptions
        .iter()
        .filter_map(|sub| {
            let days_left = sub.days_until_renewal(today);
            if !sub.effective_reminder_days().contains(&days_left) {
                return None;
            }
            Some(build_reminder(sub, days_left, today, now))
        })
        .collect()
}

fn build_reminder(
    sub: &Subscription,
    days_left: i64,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Notification {
    let (severity, priority) = if days_left <= 1 {
        (NotificationSeverity::Critical, NotificationPriority::Critical)
    } else {
        (NotificationSeverity::Warning, NotificationPriority::High)
    };

    let when = match days_left {
        0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        n => format!("in {n} days"),
    };

    Notification {
        id: reminder_id(&sub.id, days_left, today),
        subscription_id: Some(sub.id.clone()),
        title: format!("{} renews {when}", sub.name),
        message: format!(
            "{} will charge {}{} on {}",
            sub.name,
            sub.currency,
            sub.amount,
            sub.renewal_date.format("%Y-%m-%d")
        ),
        timestamp: now,
        read: false,
        severity,
        priority,
    }
}
