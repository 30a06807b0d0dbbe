/// 認証セッション機能モジュール
///
/// 認証済みセッションの有無によって、エンジンが使うバックエンドを決定します。
pub mod models;

pub use models::{AuthSession, BackendMode};
