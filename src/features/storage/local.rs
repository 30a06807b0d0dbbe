use super::decode_subscriptions;
use crate::features::reminders::{Notification, NotificationLedger};
use crate::features::security::{strip_passwords, CredentialCipher};
use crate::features::settings::UserSettings;
use crate::features::subscriptions::Subscription;
use crate::shared::database::{create_tables, initialize_database};
use crate::shared::errors::{AppError, AppResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// サブスクリプション一覧のキー
pub const KEY_SUBSCRIPTIONS: &str = "subscriptions";
/// ローカル設定のキー
pub const KEY_SETTINGS: &str = "settings";
/// 通知台帳のキー
pub const KEY_NOTIFICATIONS: &str = "notifications";
/// 初期設定ウィザード完了フラグのキー
pub const KEY_WIZARD_COMPLETED: &str = "wizard_completed";

/// 同期的なキー・バリューストア
pub trait LocalStore: Send {
    fn read(&self, key: &str) -> AppResult<Option<String>>;
    fn write(&self, key: &str, value: &str) -> AppResult<()>;
    fn remove(&self, key: &str) -> AppResult<()>;
}

/// SQLiteを使ったローカルストア
pub struct SqliteLocalStore {
    conn: Connection,
}

impl SqliteLocalStore {
    /// ファイルを開いてローカルストアを作成する
    pub fn open(path: &Path) -> AppResult<Self> {
        Ok(Self {
            conn: initialize_database(path)?,
        })
    }

    /// メモリ上のローカルストアを作成する（テスト用）
    pub fn in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()?;
        create_tables(&conn)?;
        Ok(Self { conn })
    }
}

impl LocalStore for SqliteLocalStore {
    fn read(&self, key: &str) -> AppResult<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Database(e.to_string()))
    }

    fn write(&self, key: &str, value: &str) -> AppResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        self.conn
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }
}

/// メモリ上のローカルストア
///
/// クローンは同じデータを共有する。
#[derive(Debug, Clone, Default)]
pub struct MemoryLocalStore {
    data: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.data
            .lock()
            .map_err(|e| AppError::storage(format!("ストアのロックに失敗: {e}")))
    }
}

impl LocalStore for MemoryLocalStore {
    fn read(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> AppResult<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// オフライン用のローカルフォールバックストア
///
/// 読み書きはベストエフォートで、失敗はログに記録するだけで呼び出し元には返さない。
/// 読み込みに失敗した・壊れたデータは「データなし」として扱う。
pub struct LocalFallback {
    store: Box<dyn LocalStore>,
    cipher: Option<CredentialCipher>,
}

impl LocalFallback {
    pub fn new(store: impl LocalStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            cipher: None,
        }
    }

    /// パスワードを暗号化して保存する
    pub fn with_cipher(mut self, cipher: CredentialCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    fn read_json(&self, key: &str) -> Option<serde_json::Value> {
        let raw = match self.store.read(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("ローカルストアの読み込みに失敗しました: key={key}, {e}");
                return None;
            }
        };

        serde_json::from_str(&raw)
            .map_err(|e| log::warn!("ローカルデータが破損しているため無視します: key={key}, {e}"))
            .ok()
    }

    fn write_json<T: serde::Serialize + ?Sized>(&self, key: &str, value: &T) {
        let result = serde_json::to_string(value)
            .map_err(AppError::from)
            .and_then(|raw| self.store.write(key, &raw));

        if let Err(e) = result {
            log::warn!("ローカルストアへの書き込みに失敗しました: key={key}, {e}");
        }
    }

    /// サブスクリプション一覧を読み込む
    pub fn load_subscriptions(&self) -> Vec<Subscription> {
        let records = match self.read_json(KEY_SUBSCRIPTIONS) {
            Some(serde_json::Value::Array(values)) => decode_subscriptions(values),
            Some(_) => {
                log::warn!("ローカルのサブスクリプション一覧が配列ではないため無視します");
                Vec::new()
            }
            None => Vec::new(),
        };

        match &self.cipher {
            Some(cipher) => cipher.open_subscriptions(records),
            None => records,
        }
    }

    /// サブスクリプション一覧を書き込む
    ///
    /// 暗号化キーがない場合、パスワードは保存しない。
    pub fn save_subscriptions(&self, subscriptions: &[Subscription]) {
        let stored = match &self.cipher {
            Some(cipher) => cipher.seal_subscriptions(subscriptions),
            None => strip_passwords(subscriptions),
        };
        self.write_json(KEY_SUBSCRIPTIONS, &stored);
    }

    pub fn load_settings(&self) -> UserSettings {
        self.read_json(KEY_SETTINGS)
            .map(UserSettings::from_document)
            .unwrap_or_default()
    }

    pub fn save_settings(&self, settings: &UserSettings) {
        self.write_json(KEY_SETTINGS, settings);
    }

    pub fn load_notifications(&self) -> NotificationLedger {
        let entries = match self.read_json(KEY_NOTIFICATIONS) {
            Some(serde_json::Value::Array(values)) => values
                .into_iter()
                .filter_map(|value| serde_json::from_value::<Notification>(value).ok())
                .collect(),
            _ => Vec::new(),
        };
        NotificationLedger::from_entries(entries)
    }

    pub fn save_notifications(&self, ledger: &NotificationLedger) {
        self.write_json(KEY_NOTIFICATIONS, ledger.entries());
    }

    pub fn is_wizard_completed(&self) -> bool {
        matches!(
            self.read_json(KEY_WIZARD_COMPLETED),
            Some(serde_json::Value::Bool(true))
        )
    }

    pub fn set_wizard_completed(&self, completed: bool) {
        self.write_json(KEY_WIZARD_COMPLETED, &completed);
    }
}
