use serde::{Deserialize, Serialize};

/// 表示テーマ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_currency() -> String {
    "₪".to_string()
}

fn default_date_format() -> String {
    "DD/MM/YYYY".to_string()
}

fn default_visible_columns() -> Vec<String> {
    ["name", "category", "amount", "renewalDate", "status"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

fn default_true() -> bool {
    true
}

/// ユーザー設定
///
/// 部分的に保存されたドキュメントでも、欠けているフィールドはデフォルト値で補われる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default = "default_currency")]
    pub default_currency: String,
    #[serde(default = "default_visible_columns")]
    pub visible_columns: Vec<String>,
    #[serde(default = "default_true")]
    pub sound_enabled: bool,
    #[serde(default)]
    pub push_enabled: bool,
    #[serde(default)]
    pub bank_sync_enabled: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            language: default_language(),
            theme: Theme::default(),
            date_format: default_date_format(),
            default_currency: default_currency(),
            visible_columns: default_visible_columns(),
            sound_enabled: true,
            push_enabled: false,
            bank_sync_enabled: false,
        }
    }
}

impl UserSettings {
    /// パッチをマージした新しい設定を返す（元の設定は変更しない）
    pub fn merged(&self, patch: &SettingsPatch) -> Self {
        let mut next = self.clone();
        if let Some(language) = &patch.language {
            next.language = language.clone();
        }
        if let Some(theme) = patch.theme {
            next.theme = theme;
        }
        if let Some(date_format) = &patch.date_format {
            next.date_format = date_format.clone();
        }
        if let Some(currency) = &patch.default_currency {
            next.default_currency = currency.clone();
        }
        if let Some(columns) = &patch.visible_columns {
            next.visible_columns = columns.clone();
        }
        if let Some(sound) = patch.sound_enabled {
            next.sound_enabled = sound;
        }
        if let Some(push) = patch.push_enabled {
            next.push_enabled = push;
        }
        if let Some(bank_sync) = patch.bank_sync_enabled {
            next.bank_sync_enabled = bank_sync;
        }
        next
    }

    /// 保存済みドキュメントをデフォルト値の上に読み込む
    ///
    /// フィールド単位でマージし、nullや型の合わないフィールドはデフォルト値のまま残す。
    pub fn from_document(value: serde_json::Value) -> Self {
        let serde_json::Value::Object(document) = value else {
            log::warn!("設定ドキュメントがオブジェクトではないためデフォルト設定を使用します");
            return Self::default();
        };

        let mut settings = Self::default();
        for (key, field) in document {
            if field.is_null() {
                log::debug!("設定フィールドがnullのためデフォルト値を使用します: {key}");
                continue;
            }
            match settings.with_field(&key, field) {
                Ok(Some(next)) => settings = next,
                Ok(None) => log::debug!("未知の設定フィールドを無視します: {key}"),
                Err(e) => {
                    log::warn!("設定フィールドの解析に失敗したためデフォルト値を使用します: {key}, {e}")
                }
            }
        }
        settings
    }

    /// 1フィールドだけ差し替えた設定を作る（未知のキーはNone）
    fn with_field(
        &self,
        key: &str,
        field: serde_json::Value,
    ) -> Result<Option<Self>, serde_json::Error> {
        let mut current = serde_json::to_value(self)?;
        let Some(slot) = current.as_object_mut().and_then(|object| object.get_mut(key)) else {
            return Ok(None);
        };
        *slot = field;
        serde_json::from_value(current).map(Some)
    }
}

/// 設定の部分更新
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_sync_enabled: Option<bool>,
}
