//! 更新リマインダー機能モジュール
//!
//! - 本日通知すべきリマインダーの計算（純粋関数）
//! - 重複排除・件数上限付きの通知台帳

pub mod ledger;
pub mod models;
pub mod scheduler;

pub use ledger::{NotificationLedger, MAX_NOTIFICATIONS};
pub use models::{reminder_id, Notification, NotificationPriority, NotificationSeverity};
pub use scheduler::compute_due_reminders;
