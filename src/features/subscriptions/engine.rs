use super::export::export_csv;
use super::models::{Subscription, SubscriptionDraft, SubscriptionPatch, COPY_SUFFIX};
use super::totals::{self, CategorySpend, SpendSummary};
use crate::features::assistant::{
    ExtractedSubscription, InvoiceExtractor, Recommendation, RecommendationProvider,
    RecommendationRequest, VoiceExtractor, VoiceInput,
};
use crate::features::auth::{AuthSession, BackendMode};
use crate::features::currency::ExchangeTable;
use crate::features::reminders::{
    compute_due_reminders, Notification, NotificationLedger, NotificationSeverity,
};
use crate::features::settings::{SettingsPatch, UserSettings};
use crate::features::storage::{
    decode_documents, BackendError, LocalFallback, RemoteDocument, RemoteListener,
    RemoteRecordStore, RemoteResult, WriteOperation,
};
use crate::shared::clock::Clock;
use crate::shared::errors::AppResult;
use futures::future::BoxFuture;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

/// リモート設定ドキュメントのID
const SETTINGS_DOCUMENT_ID: &str = "preferences";

/// エラー・アラート通知チャネルの容量
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 64;

/// 購読者に配信する派生状態
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub mode: BackendMode,
    pub subscriptions: Vec<Subscription>,
    pub settings: UserSettings,
    pub summary: SpendSummary,
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SnapshotKind {
    Subscriptions,
    Settings,
}

/// リモートリスナーから転送されたスナップショット
struct RemoteEvent {
    generation: u64,
    kind: SnapshotKind,
    documents: Vec<RemoteDocument>,
}

/// サブスクリプション状態エンジン
///
/// サブスクリプション一覧・ユーザー設定・通知台帳を所有し、
/// セッションの有無に応じてローカルストアとリモートストアを切り替える。
/// 状態の変更はすべて`&mut self`経由で行われ、リモートからの更新は
/// [`pump`](Self::pump) / [`process_pending`](Self::process_pending) で適用する。
pub struct SubscriptionEngine {
    /// ローカルフォールバックストア
    local: LocalFallback,
    /// リモートレコードストア（未設定の場合は常にローカルモード）
    remote: Option<Arc<dyn RemoteRecordStore>>,
    /// 今日の日付
    clock: Arc<dyn Clock>,
    /// 為替テーブル
    exchange: ExchangeTable,
    /// 認証済みセッション（リモートモード時のみ）
    session: Option<AuthSession>,
    subscriptions: Vec<Subscription>,
    settings: UserSettings,
    ledger: NotificationLedger,
    /// リスナーの世代（切り替えのたびに増える）
    generation: u64,
    /// 現在のリスナー転送タスクのキャンセレーショントークン
    listener_token: Option<CancellationToken>,
    events_tx: mpsc::UnboundedSender<RemoteEvent>,
    events_rx: mpsc::UnboundedReceiver<RemoteEvent>,
    errors_tx: broadcast::Sender<BackendError>,
    alerts_tx: broadcast::Sender<Notification>,
    state_tx: watch::Sender<EngineSnapshot>,
}

impl SubscriptionEngine {
    /// ローカルモードでエンジンを作成する
    ///
    /// ローカルストアから一覧・設定・通知台帳を読み込み、リマインダーを一度計算する。
    ///
    /// # 引数
    /// * `local` - ローカルフォールバックストア
    /// * `clock` - 今日の日付を提供するクロック
    pub fn new(local: LocalFallback, clock: Arc<dyn Clock>) -> Self {
        let subscriptions = local.load_subscriptions();
        let settings = local.load_settings();
        let ledger = local.load_notifications();
        let exchange = ExchangeTable::default();

        let initial = compose_snapshot(
            BackendMode::Local,
            &subscriptions,
            &settings,
            &ledger,
            &exchange,
        );
        let (state_tx, _) = watch::channel(initial);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (errors_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (alerts_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        log::info!(
            "サブスクリプションエンジンを初期化しました: {}件",
            subscriptions.len()
        );

        let mut engine = Self {
            local,
            remote: None,
            clock,
            exchange,
            session: None,
            subscriptions,
            settings,
            ledger,
            generation: 0,
            listener_token: None,
            events_tx,
            events_rx,
            errors_tx,
            alerts_tx,
            state_tx,
        };
        engine.refresh_reminders();
        engine
    }

    /// リモートストアを設定する
    pub fn with_remote(mut self, remote: Arc<dyn RemoteRecordStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// 為替テーブルを差し替える
    pub fn with_exchange_table(mut self, exchange: ExchangeTable) -> Self {
        self.exchange = exchange;
        self.publish();
        self
    }

    // ---- バックエンド選択 ----

    /// セッション状態を反映してバックエンドを選択する
    ///
    /// 有効なセッションとリモートストアが揃っている場合はリモートモード、
    /// それ以外はローカルモードになる。リモートモードへの切り替えは
    /// tokioランタイム上で呼び出す必要がある。
    pub fn set_session(&mut self, session: Option<AuthSession>) {
        let now = self.clock.now();
        let session = session.filter(|s| {
            let valid = s.is_valid(now);
            if !valid {
                log::warn!("セッションが無効なためローカルモードで動作します: user_id={}", s.user_id);
            }
            valid
        });

        match (session, self.remote.clone()) {
            (Some(session), Some(remote)) => self.enter_remote(session, remote),
            (Some(session), None) => {
                log::warn!(
                    "リモートストアが設定されていないためローカルモードで動作します: user_id={}",
                    session.user_id
                );
                self.enter_local();
            }
            (None, _) => self.enter_local(),
        }
    }

    fn enter_remote(&mut self, session: AuthSession, remote: Arc<dyn RemoteRecordStore>) {
        if let Some(current) = self.session.as_mut() {
            if current.user_id == session.user_id {
                *current = session;
                return;
            }
        }

        self.detach_remote();
        log::info!("リモートモードに切り替えます: user_id={}", session.user_id);

        let token = CancellationToken::new();
        spawn_forwarder(
            remote.subscribe(&session.subscriptions_path()),
            SnapshotKind::Subscriptions,
            self.generation,
            token.clone(),
            self.events_tx.clone(),
        );
        spawn_forwarder(
            remote.subscribe(&session.settings_collection_path()),
            SnapshotKind::Settings,
            self.generation,
            token.clone(),
            self.events_tx.clone(),
        );

        self.listener_token = Some(token);
        self.session = Some(session);

        // 最初のスナップショットが届くまで一覧は空にする（ローカルにはミラーしない）
        self.subscriptions.clear();
        self.publish();
    }

    fn enter_local(&mut self) {
        if self.session.is_none() {
            return;
        }

        self.detach_remote();
        log::info!("ローカルモードに切り替えます");

        self.subscriptions = self.local.load_subscriptions();
        self.settings = self.local.load_settings();
        self.refresh_reminders();
        self.publish();
    }

    /// リモートリスナーを解除し、以降に届く古いスナップショットを無効にする
    fn detach_remote(&mut self) {
        if let Some(token) = self.listener_token.take() {
            token.cancel();
            log::debug!("リモートリスナーを停止しました: generation={}", self.generation);
        }
        self.session = None;
        self.generation += 1;
    }

    fn remote_context(&self) -> Option<(Arc<dyn RemoteRecordStore>, AuthSession)> {
        match (&self.remote, &self.session) {
            (Some(remote), Some(session)) => Some((remote.clone(), session.clone())),
            _ => None,
        }
    }

    /// 現在のバックエンド
    pub fn mode(&self) -> BackendMode {
        match &self.session {
            Some(session) => BackendMode::Remote {
                user_id: session.user_id.clone(),
            },
            None => BackendMode::Local,
        }
    }

    pub fn session(&self) -> Option<&AuthSession> {
        self.session.as_ref()
    }

    // ---- リモートイベント ----

    /// 次のリモートイベントを待って適用する
    ///
    /// イベントが届くまで待機する。受信はキャンセルセーフ。
    pub async fn pump(&mut self) {
        if let Some(event) = self.events_rx.recv().await {
            self.apply_event(event);
        }
    }

    /// 届いているリモートイベントをすべて適用する
    ///
    /// # 戻り値
    /// 処理したイベント数（破棄した古いイベントを含む）
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply_event(event);
            handled += 1;
        }
        handled
    }

    fn apply_event(&mut self, event: RemoteEvent) {
        if event.generation != self.generation {
            log::debug!(
                "解除済みリスナーのスナップショットを破棄します: generation={}",
                event.generation
            );
            return;
        }

        match event.kind {
            SnapshotKind::Subscriptions => {
                log::debug!(
                    "サブスクリプションのスナップショットを受信しました: {}件",
                    event.documents.len()
                );
                self.subscriptions = decode_documents(event.documents);
                self.on_list_changed();
            }
            SnapshotKind::Settings => {
                self.settings = event
                    .documents
                    .into_iter()
                    .find(|document| document.id == SETTINGS_DOCUMENT_ID)
                    .map(|document| UserSettings::from_document(document.data))
                    .unwrap_or_default();
                self.publish();
            }
        }
    }

    // ---- サブスクリプション操作 ----

    /// サブスクリプションを追加する
    ///
    /// ドラフトは検証済みであることを前提とする。リモートモードでは書き込みのみ行い、
    /// 一覧への反映はスナップショットの到着時に行われる。
    ///
    /// # 戻り値
    /// 新しいサブスクリプションID
    pub fn add_subscription(&mut self, draft: SubscriptionDraft) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let subscription = Subscription::from_draft(id.clone(), draft);

        match self.remote_context() {
            Some((remote, session)) => {
                let path = session.subscription_path(&id);
                match serde_json::to_value(&subscription) {
                    Ok(record) => {
                        let write = remote.put(&path, record.clone());
                        self.spawn_write(path, WriteOperation::Put, Some(record), write);
                    }
                    Err(e) => log::error!("サブスクリプションのシリアライズに失敗しました: id={id}, {e}"),
                }
            }
            None => {
                self.subscriptions.insert(0, subscription);
                self.on_list_changed();
            }
        }

        log::info!("サブスクリプションを追加しました: id={id}");
        id
    }

    /// サブスクリプションを部分更新する
    ///
    /// ローカルモードで未知のIDは何もしない。リモートモードではストアが失敗を報告する。
    pub fn update_subscription(&mut self, id: &str, patch: SubscriptionPatch) {
        match self.remote_context() {
            Some((remote, session)) => {
                let path = session.subscription_path(id);
                match serde_json::to_value(&patch) {
                    Ok(fields) => {
                        let write = remote.patch(&path, fields.clone());
                        self.spawn_write(path, WriteOperation::Patch, Some(fields), write);
                    }
                    Err(e) => log::error!("更新内容のシリアライズに失敗しました: id={id}, {e}"),
                }
            }
            None => {
                let Some(subscription) = self.subscriptions.iter_mut().find(|s| s.id == id) else {
                    log::debug!("更新対象のサブスクリプションが見つかりません: id={id}");
                    return;
                };
                subscription.apply_patch(&patch);
                log::info!("サブスクリプションを更新しました: id={id}");
                self.on_list_changed();
            }
        }
    }

    /// サブスクリプションを削除する（存在しない場合は何もしない）
    pub fn delete_subscription(&mut self, id: &str) {
        match self.remote_context() {
            Some((remote, session)) => {
                let path = session.subscription_path(id);
                let write = remote.delete(&path);
                self.spawn_write(path, WriteOperation::Delete, None, write);
            }
            None => {
                let before = self.subscriptions.len();
                self.subscriptions.retain(|s| s.id != id);
                if self.subscriptions.len() == before {
                    log::debug!("削除対象のサブスクリプションが見つかりません: id={id}");
                    return;
                }
                log::info!("サブスクリプションを削除しました: id={id}");
                self.on_list_changed();
            }
        }
    }

    /// サブスクリプションを複製する
    ///
    /// # 戻り値
    /// 複製のID。元のサブスクリプションが見つからない場合はNone
    pub fn duplicate_subscription(&mut self, id: &str) -> Option<String> {
        let mut draft = self.subscription(id)?.to_draft();
        draft.name.push_str(COPY_SUFFIX);
        Some(self.add_subscription(draft))
    }

    /// 利用回数を1増やし、最終利用日を今日にする
    pub fn mark_as_used(&mut self, id: &str) {
        let usage_count = self
            .subscription(id)
            .and_then(|s| s.usage_count)
            .unwrap_or(0)
            .saturating_add(1);

        self.update_subscription(
            id,
            SubscriptionPatch {
                usage_count: Some(usage_count),
                last_used_date: Some(self.clock.today()),
                ..SubscriptionPatch::default()
            },
        );
    }

    /// 設定を更新する
    ///
    /// 既存の設定にマージし、リモートモードでは変更したフィールドのみを設定ドキュメントにマージ書き込みする。
    pub fn update_settings(&mut self, patch: SettingsPatch) {
        self.settings = self.settings.merged(&patch);

        match self.remote_context() {
            Some((remote, session)) => match serde_json::to_value(&patch) {
                Ok(fields) => {
                    let path = session.settings_path();
                    let write = remote.merge(&path, fields.clone());
                    self.spawn_write(path, WriteOperation::Merge, Some(fields), write);
                }
                Err(e) => log::error!("設定のシリアライズに失敗しました: {e}"),
            },
            None => self.local.save_settings(&self.settings),
        }

        self.publish();
    }

    fn spawn_write(
        &self,
        path: String,
        operation: WriteOperation,
        payload: Option<serde_json::Value>,
        write: BoxFuture<'static, RemoteResult>,
    ) {
        let errors = self.errors_tx.clone();
        tokio::spawn(async move {
            match write.await {
                Ok(()) => log::debug!("リモート書き込みが完了しました: {operation} {path}"),
                Err(e) => {
                    log::error!("リモート書き込みに失敗しました: {operation} {path}, {e}");
                    let _ = errors.send(BackendError::new(path, operation, payload, &e));
                }
            }
        });
    }

    /// 一覧が変わったときの共通処理
    fn on_list_changed(&mut self) {
        self.local.save_subscriptions(&self.subscriptions);
        self.run_reminders();
        self.publish();
    }

    // ---- リマインダー・通知 ----

    fn run_reminders(&mut self) -> usize {
        let candidates =
            compute_due_reminders(&self.subscriptions, self.clock.today(), self.clock.now());
        let fresh = self.ledger.merge(candidates);
        if fresh.is_empty() {
            return 0;
        }

        log::info!("新しいリマインダーがあります: {}件", fresh.len());
        self.local.save_notifications(&self.ledger);
        for notification in &fresh {
            let _ = self.alerts_tx.send(notification.clone());
        }
        fresh.len()
    }

    /// リマインダーを再計算する（日付が変わったときなど）
    ///
    /// # 戻り値
    /// 新しく追加された通知の数
    pub fn refresh_reminders(&mut self) -> usize {
        let added = self.run_reminders();
        if added > 0 {
            self.publish();
        }
        added
    }

    /// リマインダー以外のアラートを通知台帳に追加する
    pub fn push_alert(
        &mut self,
        title: impl Into<String>,
        message: impl Into<String>,
        severity: NotificationSeverity,
    ) -> Notification {
        let alert = self
            .ledger
            .push_alert(title, message, severity, self.clock.now());
        let _ = self.alerts_tx.send(alert.clone());
        self.persist_ledger();
        alert
    }

    /// 通知を既読にする（未知のIDは何もしない）
    pub fn mark_notification_read(&mut self, id: &str) -> bool {
        let changed = self.ledger.mark_as_read(id);
        if changed {
            self.persist_ledger();
        }
        changed
    }

    pub fn mark_all_notifications_read(&mut self) {
        if self.ledger.mark_all_as_read() {
            self.persist_ledger();
        }
    }

    pub fn clear_notifications(&mut self) {
        self.ledger.clear();
        self.persist_ledger();
    }

    pub fn notifications(&self) -> &[Notification] {
        self.ledger.entries()
    }

    pub fn unread_count(&self) -> usize {
        self.ledger.unread_count()
    }

    fn persist_ledger(&mut self) {
        self.local.save_notifications(&self.ledger);
        self.publish();
    }

    // ---- 参照・集計 ----

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub fn subscription(&self, id: &str) -> Option<&Subscription> {
        self.subscriptions.iter().find(|s| s.id == id)
    }

    pub fn settings(&self) -> &UserSettings {
        &self.settings
    }

    /// 金額を基準通貨に換算する
    pub fn convert_amount(&self, amount: f64, from_currency: &str) -> f64 {
        self.exchange.convert_amount(amount, from_currency)
    }

    /// 月額合計（設定のデフォルト通貨）
    pub fn monthly_total(&self) -> f64 {
        totals::calculate_monthly_total(
            &self.subscriptions,
            &self.exchange,
            &self.settings.default_currency,
        )
    }

    /// 年額合計（設定のデフォルト通貨）
    pub fn yearly_total(&self) -> f64 {
        totals::calculate_yearly_total(
            &self.subscriptions,
            &self.exchange,
            &self.settings.default_currency,
        )
    }

    pub fn summary(&self) -> SpendSummary {
        totals::summarize(
            &self.subscriptions,
            &self.exchange,
            &self.settings.default_currency,
        )
    }

    pub fn category_breakdown(&self) -> Vec<CategorySpend> {
        totals::category_breakdown(
            &self.subscriptions,
            &self.exchange,
            &self.settings.default_currency,
        )
    }

    pub fn upcoming_renewals(&self, within_days: i64) -> Vec<Subscription> {
        totals::upcoming_renewals(&self.subscriptions, self.clock.today(), within_days)
    }

    pub fn unused_subscriptions(&self, threshold_days: i64) -> Vec<Subscription> {
        totals::unused_subscriptions(&self.subscriptions, self.clock.today(), threshold_days)
    }

    /// 現在の一覧をCSVに書き出す
    pub fn export_data(&self) -> String {
        export_csv(&self.subscriptions)
    }

    // ---- 初期設定ウィザード ----

    pub fn complete_wizard(&mut self) {
        self.local.set_wizard_completed(true);
        log::info!("初期設定ウィザードを完了しました");
    }

    pub fn is_wizard_completed(&self) -> bool {
        self.local.is_wizard_completed()
    }

    // ---- AIアシスタント ----

    /// 請求書テキストから抽出したサブスクリプションを追加する
    ///
    /// 抽出・検証に失敗した場合は状態を変更せずにエラーを返す。
    pub async fn add_from_invoice(
        &mut self,
        extractor: &dyn InvoiceExtractor,
        text: String,
    ) -> AppResult<String> {
        let extracted = extractor.extract(text).await.map_err(|e| {
            log::warn!("請求書からの抽出に失敗しました: {e}");
            e
        })?;
        self.add_extracted(extracted)
    }

    /// 音声入力から抽出したサブスクリプションを追加する
    pub async fn add_from_voice(
        &mut self,
        extractor: &dyn VoiceExtractor,
        input: VoiceInput,
    ) -> AppResult<String> {
        let extracted = extractor.extract(input).await.map_err(|e| {
            log::warn!("音声入力からの抽出に失敗しました: {e}");
            e
        })?;
        self.add_extracted(extracted)
    }

    /// AIの抽出結果を検証して追加する
    ///
    /// 更新日が抽出できなかった場合は今日から1サイクル先を使う。
    pub fn add_extracted(&mut self, extracted: ExtractedSubscription) -> AppResult<String> {
        let draft = extracted.into_draft(self.clock.today()).map_err(|e| {
            log::warn!("抽出結果の検証に失敗しました: {e}");
            e
        })?;
        Ok(self.add_subscription(draft))
    }

    /// 支払い中のサブスクリプションに対する節約レコメンドを要求する
    ///
    /// ログイン情報は送信しない。
    pub fn recommendations(
        &self,
        provider: &dyn RecommendationProvider,
    ) -> BoxFuture<'static, AppResult<Vec<Recommendation>>> {
        provider.recommend(self.recommendation_request())
    }

    /// レコメンド生成の入力を組み立てる（ログイン情報は除く）
    pub fn recommendation_request(&self) -> RecommendationRequest {
        let subscriptions = self
            .subscriptions
            .iter()
            .filter(|s| s.status.is_billable())
            .cloned()
            .map(|mut s| {
                s.credentials = None;
                s
            })
            .collect();

        RecommendationRequest {
            subscriptions,
            monthly_total: self.monthly_total(),
            currency: self.settings.default_currency.clone(),
            language: self.settings.language.clone(),
        }
    }

    // ---- 購読 ----

    /// 派生状態の購読
    pub fn watch(&self) -> watch::Receiver<EngineSnapshot> {
        self.state_tx.subscribe()
    }

    /// リモート書き込み失敗の購読
    pub fn subscribe_errors(&self) -> broadcast::Receiver<BackendError> {
        self.errors_tx.subscribe()
    }

    /// 新しく追加された通知の購読（通知音など）
    pub fn subscribe_alerts(&self) -> broadcast::Receiver<Notification> {
        self.alerts_tx.subscribe()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        compose_snapshot(
            self.mode(),
            &self.subscriptions,
            &self.settings,
            &self.ledger,
            &self.exchange,
        )
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.snapshot());
    }
}

impl Drop for SubscriptionEngine {
    fn drop(&mut self) {
        if let Some(token) = self.listener_token.take() {
            token.cancel();
        }
    }
}

fn compose_snapshot(
    mode: BackendMode,
    subscriptions: &[Subscription],
    settings: &UserSettings,
    ledger: &NotificationLedger,
    exchange: &ExchangeTable,
) -> EngineSnapshot {
    EngineSnapshot {
        mode,
        subscriptions: subscriptions.to_vec(),
        settings: settings.clone(),
        summary: totals::summarize(subscriptions, exchange, &settings.default_currency),
        notifications: ledger.entries().to_vec(),
        unread_count: ledger.unread_count(),
    }
}

/// リスナーのスナップショットをエンジンのイベントチャネルへ転送する
///
/// トークンがキャンセルされるとリスナーをドロップして購読を解除する。
fn spawn_forwarder(
    mut listener: RemoteListener,
    kind: SnapshotKind,
    generation: u64,
    token: CancellationToken,
    events: mpsc::UnboundedSender<RemoteEvent>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                snapshot = listener.next_snapshot() => {
                    let Some(documents) = snapshot else { break };
                    let event = RemoteEvent { generation, kind, documents };
                    if events.send(event).is_err() {
                        break;
                    }
                }
            }
        }
        log::debug!("リモートリスナーを解除しました: {kind:?}, generation={generation}");
    });
}
