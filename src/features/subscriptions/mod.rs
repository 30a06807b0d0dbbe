/// サブスクリプション機能モジュール
///
/// このモジュールは、サブスクリプション管理に関連するすべての機能を提供します：
/// - サブスクリプションの作成、更新、削除、複製
/// - ローカル・リモートのバックエンド切り替えと状態の配信
/// - 通貨を正規化した月額・年額合計の計算
/// - CSVエクスポート
pub mod engine;
pub mod export;
pub mod models;
pub mod service;
pub mod totals;
pub mod validation;

#[cfg(test)]
mod integration_tests;

// 公開インターフェース
pub use engine::{EngineSnapshot, SubscriptionEngine};

pub use export::export_csv;

pub use models::{
    BillingCycle, Category, Credentials, Subscription, SubscriptionDraft, SubscriptionPatch,
    SubscriptionStatus,
};

pub use service::{build_engine, EngineCommand, EngineHandle, DEFAULT_REMINDER_INTERVAL};

pub use totals::{
    calculate_monthly_total, calculate_yearly_total, category_breakdown, summarize,
    unused_subscriptions, upcoming_renewals, CategorySpend, SpendSummary,
};

pub use validation::{validate_draft, validate_patch};
