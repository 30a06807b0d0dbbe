use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 認証済みセッション
///
/// 認証UI・トークン発行は外部で行われ、エンジンはユーザーIDと有効期限のみを参照する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    /// ユーザーID（リモートストアのパスに使用）
    pub user_id: String,
    /// メールアドレス
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// 有効期限（なしの場合は無期限）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            expires_at: None,
        }
    }

    /// セッションが有効かどうか
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.user_id.trim().is_empty() && self.expires_at.map_or(true, |exp| exp > now)
    }

    /// ユーザーのサブスクリプションコレクションのパス
    pub fn subscriptions_path(&self) -> String {
        format!("users/{}/subscriptions", self.user_id)
    }

    /// サブスクリプションドキュメントのパス
    pub fn subscription_path(&self, subscription_id: &str) -> String {
        format!("{}/{subscription_id}", self.subscriptions_path())
    }

    /// ユーザー設定コレクションのパス
    pub fn settings_collection_path(&self) -> String {
        format!("users/{}/settings", self.user_id)
    }

    /// ユーザー設定ドキュメントのパス
    pub fn settings_path(&self) -> String {
        format!("{}/preferences", self.settings_collection_path())
    }
}

/// 現在どちらのバックエンドを使っているか
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum BackendMode {
    /// 未ログイン: ローカルストアのみ
    Local,
    /// ログイン済み: リモートストアを購読
    Remote { user_id: String },
}

impl BackendMode {
    pub fn is_remote(&self) -> bool {
        matches!(self, BackendMode::Remote { .. })
    }
}
