pub mod features;
pub mod shared;

use features::storage::RemoteRecordStore;
use features::subscriptions::{build_engine, EngineHandle, SubscriptionEngine, DEFAULT_REMINDER_INTERVAL};
use log::{error, info};
use shared::config::{initialize_logging_system, load_environment_variables, EnvironmentConfig};
use shared::errors::AppResult;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use features::auth::{AuthSession, BackendMode};
pub use features::currency::{convert_amount, ExchangeTable};
pub use features::reminders::{Notification, NotificationLedger};
pub use features::settings::{SettingsPatch, UserSettings};
pub use features::storage::{BackendError, InMemoryRemoteStore, LocalFallback};
pub use features::subscriptions::{
    EngineSnapshot, Subscription, SubscriptionDraft, SubscriptionPatch,
};
pub use shared::errors::AppError;

/// 起動済みのエンジン
pub struct RunningEngine {
    pub handle: EngineHandle,
    pub task: JoinHandle<SubscriptionEngine>,
    pub shutdown: CancellationToken,
}

/// 環境設定を読み込み、エンジンをイベントループで起動する
///
/// tokioランタイム上で呼び出すこと。
///
/// # 引数
/// * `remote` - リモートレコードストア（なしの場合は常にローカルモード）
///
/// # 処理内容
/// 1. .envファイルの読み込み
/// 2. ログシステムの初期化
/// 3. ローカルストア・クロック・暗号化の構築
/// 4. イベントループの起動
pub fn start(remote: Option<Arc<dyn RemoteRecordStore>>) -> AppResult<RunningEngine> {
    load_environment_variables();
    initialize_logging_system();

    info!("アプリケーション初期化を開始します...");

    let config = EnvironmentConfig::from_env();
    let engine = build_engine(&config, remote).map_err(|e| {
        error!("エンジンの初期化に失敗しました: {e}");
        e
    })?;

    let shutdown = CancellationToken::new();
    let (handle, task) = EngineHandle::spawn(engine, DEFAULT_REMINDER_INTERVAL, shutdown.clone());

    info!("アプリケーション初期化が完了しました");

    Ok(RunningEngine {
        handle,
        task,
        shutdown,
    })
}
