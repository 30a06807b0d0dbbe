use super::engine::{EngineSnapshot, SubscriptionEngine, EVENT_CHANNEL_CAPACITY};
use super::models::{SubscriptionDraft, SubscriptionPatch};
use crate::features::assistant::{
    ExtractedSubscription, InvoiceExtractor, Recommendation, RecommendationProvider,
    RecommendationRequest, VoiceExtractor, VoiceInput,
};
use crate::features::auth::AuthSession;
use crate::features::reminders::{Notification, NotificationSeverity};
use crate::features::security::CredentialCipher;
use crate::features::settings::SettingsPatch;
use crate::features::storage::{BackendError, LocalFallback, RemoteRecordStore, SqliteLocalStore};
use crate::shared::clock::{Clock, SystemClock};
use crate::shared::config::EnvironmentConfig;
use crate::shared::database::get_database_path;
use crate::shared::errors::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// コマンドチャネルの容量
const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// リマインダー再計算の間隔（日付の変化を拾う）
pub const DEFAULT_REMINDER_INTERVAL: Duration = Duration::from_secs(60 * 15);

/// エンジンへの操作要求
#[derive(Debug)]
pub enum EngineCommand {
    SetSession(Option<AuthSession>),
    AddSubscription {
        draft: SubscriptionDraft,
        response_tx: oneshot::Sender<String>,
    },
    UpdateSubscription {
        id: String,
        patch: SubscriptionPatch,
    },
    DeleteSubscription {
        id: String,
    },
    DuplicateSubscription {
        id: String,
        response_tx: oneshot::Sender<Option<String>>,
    },
    MarkAsUsed {
        id: String,
    },
    UpdateSettings(SettingsPatch),
    MarkNotificationRead {
        id: String,
    },
    MarkAllNotificationsRead,
    ClearNotifications,
    CompleteWizard,
    ExportData {
        response_tx: oneshot::Sender<String>,
    },
    RefreshReminders,
    PushAlert {
        title: String,
        message: String,
        severity: NotificationSeverity,
        response_tx: oneshot::Sender<Notification>,
    },
    /// AIの抽出結果を検証して追加する
    AddExtracted {
        extracted: ExtractedSubscription,
        response_tx: oneshot::Sender<AppResult<String>>,
    },
    /// レコメンド生成の入力を組み立てる
    BuildRecommendationRequest {
        response_tx: oneshot::Sender<RecommendationRequest>,
    },
}

/// ループの1ステップで起きたこと
enum Step {
    Command(EngineCommand),
    RemoteApplied,
    Tick,
    Stop,
}

/// エンジンのイベントループ
///
/// コマンド・リモートのスナップショット・定期的なリマインダー再計算を
/// 単一のタスクで順番に処理する。シャットダウン時またはコマンドチャネルが
/// 閉じられた時点で終了し、エンジンを返す。
///
/// # 引数
/// * `engine` - サブスクリプションエンジン
/// * `commands` - コマンドの受信側
/// * `reminder_interval` - リマインダー再計算の間隔
/// * `shutdown` - シャットダウン用のキャンセレーショントークン
pub async fn run(
    mut engine: SubscriptionEngine,
    mut commands: mpsc::Receiver<EngineCommand>,
    reminder_interval: Duration,
    shutdown: CancellationToken,
) -> SubscriptionEngine {
    let mut ticker = tokio::time::interval(reminder_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // 最初のティックは即時に完了するため読み捨てる
    ticker.tick().await;

    log::info!("エンジンのイベントループを開始しました");

    loop {
        let step = tokio::select! {
            _ = shutdown.cancelled() => Step::Stop,
            command = commands.recv() => match command {
                Some(command) => Step::Command(command),
                None => Step::Stop,
            },
            _ = engine.pump() => Step::RemoteApplied,
            _ = ticker.tick() => Step::Tick,
        };

        match step {
            Step::Command(command) => handle_command(&mut engine, command),
            Step::RemoteApplied => {}
            Step::Tick => {
                engine.refresh_reminders();
            }
            Step::Stop => break,
        }
    }

    log::info!("エンジンのイベントループを終了しました");
    engine
}

fn handle_command(engine: &mut SubscriptionEngine, command: EngineCommand) {
    match command {
        EngineCommand::SetSession(session) => engine.set_session(session),
        EngineCommand::AddSubscription { draft, response_tx } => {
            let id = engine.add_subscription(draft);
            let _ = response_tx.send(id);
        }
        EngineCommand::UpdateSubscription { id, patch } => engine.update_subscription(&id, patch),
        EngineCommand::DeleteSubscription { id } => engine.delete_subscription(&id),
        EngineCommand::DuplicateSubscription { id, response_tx } => {
            let copy = engine.duplicate_subscription(&id);
            let _ = response_tx.send(copy);
        }
        EngineCommand::MarkAsUsed { id } => engine.mark_as_used(&id),
        EngineCommand::UpdateSettings(patch) => engine.update_settings(patch),
        EngineCommand::MarkNotificationRead { id } => {
            engine.mark_notification_read(&id);
        }
        EngineCommand::MarkAllNotificationsRead => engine.mark_all_notifications_read(),
        EngineCommand::ClearNotifications => engine.clear_notifications(),
        EngineCommand::CompleteWizard => engine.complete_wizard(),
        EngineCommand::ExportData { response_tx } => {
            let _ = response_tx.send(engine.export_data());
        }
        EngineCommand::RefreshReminders => {
            engine.refresh_reminders();
        }
        EngineCommand::PushAlert {
            title,
            message,
            severity,
            response_tx,
        } => {
            let _ = response_tx.send(engine.push_alert(title, message, severity));
        }
        EngineCommand::AddExtracted {
            extracted,
            response_tx,
        } => {
            let _ = response_tx.send(engine.add_extracted(extracted));
        }
        EngineCommand::BuildRecommendationRequest { response_tx } => {
            let _ = response_tx.send(engine.recommendation_request());
        }
    }
}

/// エンジンのブロードキャストをハンドル側のチャネルに中継する
fn spawn_relay<T>(
    mut source: broadcast::Receiver<T>,
    sink: broadcast::Sender<T>,
    shutdown: CancellationToken,
    label: &'static str,
) where
    T: Clone + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = source.recv() => match received {
                    Ok(event) => {
                        let _ = sink.send(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("{label}の通知を{skipped}件取りこぼしました");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });
}

/// イベントループで動くエンジンへのハンドル
///
/// クローンして複数のタスクから使える。
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    state: watch::Receiver<EngineSnapshot>,
    errors: broadcast::Sender<BackendError>,
    alerts: broadcast::Sender<Notification>,
}

impl EngineHandle {
    /// エンジンをイベントループで起動する
    ///
    /// # 戻り値
    /// ハンドルと、ループ終了時にエンジンを返すタスク
    pub fn spawn(
        engine: SubscriptionEngine,
        reminder_interval: Duration,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<SubscriptionEngine>) {
        let (commands, receiver) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let state = engine.watch();

        // エンジンの購読をこのハンドル用のチャネルに中継する
        let (errors, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (alerts, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        spawn_relay(
            engine.subscribe_errors(),
            errors.clone(),
            shutdown.clone(),
            "書き込みエラー",
        );
        spawn_relay(
            engine.subscribe_alerts(),
            alerts.clone(),
            shutdown.clone(),
            "アラート",
        );

        let task = tokio::spawn(run(engine, receiver, reminder_interval, shutdown));
        (
            Self {
                commands,
                state,
                errors,
                alerts,
            },
            task,
        )
    }

    async fn send(&self, command: EngineCommand) -> AppResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| AppError::configuration("エンジンは停止しています"))
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> AppResult<T> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(build(response_tx)).await?;
        response_rx
            .await
            .map_err(|_| AppError::configuration("エンジンから応答がありません"))
    }

    pub async fn set_session(&self, session: Option<AuthSession>) -> AppResult<()> {
        self.send(EngineCommand::SetSession(session)).await
    }

    pub async fn add_subscription(&self, draft: SubscriptionDraft) -> AppResult<String> {
        self.request(|response_tx| EngineCommand::AddSubscription { draft, response_tx })
            .await
    }

    pub async fn update_subscription(&self, id: &str, patch: SubscriptionPatch) -> AppResult<()> {
        self.send(EngineCommand::UpdateSubscription {
            id: id.to_string(),
            patch,
        })
        .await
    }

    pub async fn delete_subscription(&self, id: &str) -> AppResult<()> {
        self.send(EngineCommand::DeleteSubscription { id: id.to_string() })
            .await
    }

    pub async fn duplicate_subscription(&self, id: &str) -> AppResult<Option<String>> {
        let id = id.to_string();
        self.request(|response_tx| EngineCommand::DuplicateSubscription { id, response_tx })
            .await
    }

    pub async fn mark_as_used(&self, id: &str) -> AppResult<()> {
        self.send(EngineCommand::MarkAsUsed { id: id.to_string() })
            .await
    }

    pub async fn update_settings(&self, patch: SettingsPatch) -> AppResult<()> {
        self.send(EngineCommand::UpdateSettings(patch)).await
    }

    pub async fn mark_notification_read(&self, id: &str) -> AppResult<()> {
        self.send(EngineCommand::MarkNotificationRead { id: id.to_string() })
            .await
    }

    pub async fn mark_all_notifications_read(&self) -> AppResult<()> {
        self.send(EngineCommand::MarkAllNotificationsRead).await
    }

    pub async fn clear_notifications(&self) -> AppResult<()> {
        self.send(EngineCommand::ClearNotifications).await
    }

    pub async fn complete_wizard(&self) -> AppResult<()> {
        self.send(EngineCommand::CompleteWizard).await
    }

    pub async fn refresh_reminders(&self) -> AppResult<()> {
        self.send(EngineCommand::RefreshReminders).await
    }

    pub async fn export_data(&self) -> AppResult<String> {
        self.request(|response_tx| EngineCommand::ExportData { response_tx })
            .await
    }

    pub async fn push_alert(
        &self,
        title: impl Into<String>,
        message: impl Into<String>,
        severity: NotificationSeverity,
    ) -> AppResult<Notification> {
        let (title, message) = (title.into(), message.into());
        self.request(|response_tx| EngineCommand::PushAlert {
            title,
            message,
            severity,
            response_tx,
        })
        .await
    }

    /// 請求書テキストから抽出したサブスクリプションを追加する
    ///
    /// 抽出は呼び出し側のタスクで行い、イベントループを止めない。
    pub async fn add_from_invoice(
        &self,
        extractor: &dyn InvoiceExtractor,
        text: String,
    ) -> AppResult<String> {
        let extracted = extractor.extract(text).await.map_err(|e| {
            log::warn!("請求書からの抽出に失敗しました: {e}");
            e
        })?;
        self.add_extracted(extracted).await
    }

    /// 音声入力から抽出したサブスクリプションを追加する
    pub async fn add_from_voice(
        &self,
        extractor: &dyn VoiceExtractor,
        input: VoiceInput,
    ) -> AppResult<String> {
        let extracted = extractor.extract(input).await.map_err(|e| {
            log::warn!("音声入力からの抽出に失敗しました: {e}");
            e
        })?;
        self.add_extracted(extracted).await
    }

    async fn add_extracted(&self, extracted: ExtractedSubscription) -> AppResult<String> {
        self.request(|response_tx| EngineCommand::AddExtracted {
            extracted,
            response_tx,
        })
        .await?
    }

    /// 節約レコメンドを要求する
    pub async fn recommendations(
        &self,
        provider: &dyn RecommendationProvider,
    ) -> AppResult<Vec<Recommendation>> {
        let request = self
            .request(|response_tx| EngineCommand::BuildRecommendationRequest { response_tx })
            .await?;
        provider.recommend(request).await
    }

    /// 派生状態の購読
    pub fn watch(&self) -> watch::Receiver<EngineSnapshot> {
        self.state.clone()
    }

    /// 最新の派生状態
    pub fn current(&self) -> EngineSnapshot {
        self.state.borrow().clone()
    }

    /// リモート書き込み失敗の購読
    pub fn subscribe_errors(&self) -> broadcast::Receiver<BackendError> {
        self.errors.subscribe()
    }

    /// 新しく追加された通知の購読（通知音など）
    pub fn subscribe_alerts(&self) -> broadcast::Receiver<Notification> {
        self.alerts.subscribe()
    }
}

/// 環境設定からエンジンを組み立てる
///
/// # 処理内容
/// 1. アプリデータディレクトリのSQLiteローカルストアを開く
/// 2. 暗号化キーがあれば認証情報の暗号化を有効にする
/// 3. 設定されたタイムゾーンのクロックを使う
pub fn build_engine(
    config: &EnvironmentConfig,
    remote: Option<Arc<dyn RemoteRecordStore>>,
) -> AppResult<SubscriptionEngine> {
    let database_path = get_database_path()?;
    let mut local = LocalFallback::new(SqliteLocalStore::open(&database_path)?);
    if let Some(key) = &config.credential_key {
        local = local.with_cipher(CredentialCipher::new(key));
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.timezone));
    let engine = SubscriptionEngine::new(local, clock);

    log::info!(
        "エンジンを構築しました: environment={}, timezone={}",
        config.environment,
        config.timezone.name()
    );

    Ok(match remote {
        Some(remote) => engine.with_remote(remote),
        None => engine,
    })
}
