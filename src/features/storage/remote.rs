use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::mpsc;

/// リモートストアのドキュメント
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    /// ドキュメントID（パスの最後の要素）
    pub id: String,
    /// ドキュメントのフルパス
    pub path: String,
    pub data: serde_json::Value,
}

/// コレクションの購読
///
/// 変更のたびにコレクション全体のスナップショットが届く。
/// 受信側をドロップすると購読は解除される。
pub struct RemoteListener {
    pub snapshots: mpsc::UnboundedReceiver<Vec<RemoteDocument>>,
}

impl RemoteListener {
    pub async fn next_snapshot(&mut self) -> Option<Vec<RemoteDocument>> {
        self.snapshots.recv().await
    }
}

/// リモートストアのエラー
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemoteStoreError {
    #[error("権限がありません: {0}")]
    PermissionDenied(String),

    #[error("ドキュメントが見つかりません: {0}")]
    NotFound(String),

    #[error("リモートストアに接続できません: {0}")]
    Unavailable(String),
}

/// 書き込み操作の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOperation {
    Put,
    Patch,
    Merge,
    Delete,
}

impl std::fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WriteOperation::Put => "put",
            WriteOperation::Patch => "patch",
            WriteOperation::Merge => "merge",
            WriteOperation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// 非同期に報告される書き込み失敗イベント
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendError {
    pub path: String,
    pub operation: WriteOperation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub message: String,
    pub permission_denied: bool,
}

impl BackendError {
    pub fn new(
        path: impl Into<String>,
        operation: WriteOperation,
        payload: Option<serde_json::Value>,
        error: &RemoteStoreError,
    ) -> Self {
        Self {
            path: path.into(),
            operation,
            payload,
            message: error.to_string(),
            permission_denied: matches!(error, RemoteStoreError::PermissionDenied(_)),
        }
    }
}

pub type RemoteResult = Result<(), RemoteStoreError>;

/// プッシュ型のリモートレコードストア
///
/// 書き込みは非同期で、失敗は戻り値のFutureで報告される。
pub trait RemoteRecordStore: Send + Sync {
    /// コレクション（またはドキュメントの親パス）を購読する
    fn subscribe(&self, collection_path: &str) -> RemoteListener;

    /// ドキュメントを作成・置換する
    fn put(&self, path: &str, record: serde_json::Value) -> BoxFuture<'static, RemoteResult>;

    /// 既存ドキュメントのフィールドを更新する（存在しない場合は失敗）
    fn patch(&self, path: &str, fields: serde_json::Value) -> BoxFuture<'static, RemoteResult>;

    /// フィールドをマージする（存在しない場合は作成）
    fn merge(&self, path: &str, fields: serde_json::Value) -> BoxFuture<'static, RemoteResult>;

    /// ドキュメントを削除する（存在しなくても成功）
    fn delete(&self, path: &str) -> BoxFuture<'static, RemoteResult>;
}
