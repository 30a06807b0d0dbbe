/// 機能別モジュール
///
/// このモジュールは、アプリケーションの機能を機能別に整理したモジュール群を提供します。
/// 各機能モジュールは、その機能に関連するモデルと処理を含む自己完結型のユニットです。
pub mod assistant;
pub mod auth;
pub mod currency;
pub mod reminders;
pub mod security;
pub mod settings;
pub mod storage;
pub mod subscriptions;
