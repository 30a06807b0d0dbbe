use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// 複製時に名前へ付与するサフィックス
pub const COPY_SUFFIX: &str = " (copy)";

/// リマインダー日数が未設定の場合のデフォルト（更新日の3日前）
pub const DEFAULT_REMINDER_DAYS: [i64; 1] = [3];

/// 列挙値のタグ文字列を取り出す（文字列以外は空文字として扱う）
fn enum_tag(value: &Value) -> &str {
    value.as_str().unwrap_or_default()
}

/// 「未指定」と「null（値の削除）」を区別して読み込む
fn deserialize_clearable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// サブスクリプションのカテゴリ
///
/// 未知の値は`Unknown`として読み込み、表示や集計を止めない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", from = "Value")]
pub enum Category {
    Entertainment,
    Productivity,
    Utilities,
    Health,
    Education,
    Finance,
    Shopping,
    Gaming,
    News,
    Cloud,
    #[default]
    Other,
    Unknown,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Category::Entertainment,
        Category::Productivity,
        Category::Utilities,
        Category::Health,
        Category::Education,
        Category::Finance,
        Category::Shopping,
        Category::Gaming,
        Category::News,
        Category::Cloud,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Entertainment => "entertainment",
            Category::Productivity => "productivity",
            Category::Utilities => "utilities",
            Category::Health => "health",
            Category::Education => "education",
            Category::Finance => "finance",
            Category::Shopping => "shopping",
            Category::Gaming => "gaming",
            Category::News => "news",
            Category::Cloud => "cloud",
            Category::Other => "other",
            Category::Unknown => "unknown",
        }
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        Category::from(value.as_str())
    }
}

impl From<Value> for Category {
    fn from(value: Value) -> Self {
        Category::from(enum_tag(&value))
    }
}

impl From<&str> for Category {
    fn from(value: &str) -> Self {
        let normalized = value.trim().to_lowercase();
        Category::ALL
            .iter()
            .copied()
            .find(|category| category.as_str() == normalized)
            .unwrap_or(Category::Unknown)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 支払いサイクル
///
/// `annual`は`yearly`の別名として扱い、未知の値は月額とみなす。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", from = "Value")]
pub enum BillingCycle {
    #[default]
    Monthly,
    Yearly,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Yearly => "yearly",
        }
    }

    /// 金額を月額に正規化する
    pub fn monthly_amount(&self, amount: f64) -> f64 {
        match self {
            BillingCycle::Monthly => amount,
            BillingCycle::Yearly => amount / 12.0,
        }
    }

    /// 金額を年額に正規化する
    pub fn yearly_amount(&self, amount: f64) -> f64 {
        match self {
            BillingCycle::Monthly => amount * 12.0,
            BillingCycle::Yearly => amount,
        }
    }
}

impl From<Value> for BillingCycle {
    fn from(value: Value) -> Self {
        BillingCycle::from(enum_tag(&value).to_string())
    }
}

impl From<String> for BillingCycle {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "yearly" | "annual" | "annually" => BillingCycle::Yearly,
            _ => BillingCycle::Monthly,
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// サブスクリプションの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", from = "Value")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Trial,
    Cancelled,
    Frozen,
    NotInUse,
    Unknown,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Frozen => "frozen",
            SubscriptionStatus::NotInUse => "not_in_use",
            SubscriptionStatus::Unknown => "unknown",
        }
    }

    /// 支払いが発生している状態か
    ///
    /// 未知の状態は有効なものとして集計する。
    pub fn is_billable(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::NotInUse | SubscriptionStatus::Unknown
        )
    }
}

impl From<Value> for SubscriptionStatus {
    fn from(value: Value) -> Self {
        SubscriptionStatus::from(enum_tag(&value).to_string())
    }
}

impl From<String> for SubscriptionStatus {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "active" => SubscriptionStatus::Active,
            "trial" => SubscriptionStatus::Trial,
            "cancelled" | "canceled" => SubscriptionStatus::Cancelled,
            "frozen" | "paused" => SubscriptionStatus::Frozen,
            "not_in_use" => SubscriptionStatus::NotInUse,
            _ => SubscriptionStatus::Unknown,
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// サービスのログイン情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// サブスクリプションデータモデル
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: Category,
    pub amount: f64,
    pub currency: String,
    pub renewal_date: NaiveDate,
    #[serde(default)]
    pub billing_cycle: BillingCycle,
    #[serde(default)]
    pub status: SubscriptionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_risky: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_days: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

impl Subscription {
    /// ドラフトにIDを割り当ててレコードを作成する
    pub fn from_draft(id: String, draft: SubscriptionDraft) -> Self {
        Self {
            id,
            name: draft.name,
            category: draft.category,
            amount: draft.amount,
            currency: draft.currency,
            renewal_date: draft.renewal_date,
            billing_cycle: draft.billing_cycle,
            status: draft.status,
            trial_end_date: draft.trial_end_date,
            usage_count: draft.usage_count,
            last_used_date: draft.last_used_date,
            is_risky: draft.is_risky,
            reminder_days: draft.reminder_days,
            notes: draft.notes,
            credentials: draft.credentials,
        }
    }

    /// ID以外のフィールドをドラフトとして取り出す
    pub fn to_draft(&self) -> SubscriptionDraft {
        SubscriptionDraft {
            name: self.name.clone(),
            category: self.category,
            amount: self.amount,
            currency: self.currency.clone(),
            renewal_date: self.renewal_date,
            billing_cycle: self.billing_cycle,
            status: self.status,
            trial_end_date: self.trial_end_date,
            usage_count: self.usage_count,
            last_used_date: self.last_used_date,
            is_risky: self.is_risky,
            reminder_days: self.reminder_days.clone(),
            notes: self.notes.clone(),
            credentials: self.credentials.clone(),
        }
    }

    /// 有効なリマインダー日数（未設定・空の場合は[3]）
    pub fn effective_reminder_days(&self) -> Vec<i64> {
        match &self.reminder_days {
            Some(days) if !days.is_empty() => days.clone(),
            _ => DEFAULT_REMINDER_DAYS.to_vec(),
        }
    }

    /// 更新日までの日数（過ぎている場合は負）
    pub fn days_until_renewal(&self, today: NaiveDate) -> i64 {
        (self.renewal_date - today).num_days()
    }

    /// 部分更新を適用する
    pub fn apply_patch(&mut self, patch: &SubscriptionPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(amount) = patch.amount {
            self.amount = amount;
        }
        if let Some(currency) = &patch.currency {
            self.currency = currency.clone();
        }
        if let Some(renewal_date) = patch.renewal_date {
            self.renewal_date = renewal_date;
        }
        if let Some(billing_cycle) = patch.billing_cycle {
            self.billing_cycle = billing_cycle;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(trial_end_date) = patch.trial_end_date {
            self.trial_end_date = trial_end_date;
        }
        if patch.usage_count.is_some() {
            self.usage_count = patch.usage_count;
        }
        if patch.last_used_date.is_some() {
            self.last_used_date = patch.last_used_date;
        }
        if patch.is_risky.is_some() {
            self.is_risky = patch.is_risky;
        }
        if let Some(days) = &patch.reminder_days {
            self.reminder_days = Some(days.clone());
        }
        if let Some(notes) = &patch.notes {
            self.notes = notes.clone();
        }
        if let Some(credentials) = &patch.credentials {
            self.credentials = credentials.clone();
        }
    }
}

/// サブスクリプション作成用ドラフト（IDなし）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDraft {
    pub name: String,
    #[serde(default)]
    pub category: Category,
    pub amount: f64,
    pub currency: String,
    pub renewal_date: NaiveDate,
    #[serde(default)]
    pub billing_cycle: BillingCycle,
    #[serde(default)]
    pub status: SubscriptionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_risky: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_days: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

impl SubscriptionDraft {
    /// 必須フィールドのみでドラフトを作成する
    pub fn new(
        name: impl Into<String>,
        amount: f64,
        currency: impl Into<String>,
        renewal_date: NaiveDate,
    ) -> Self {
        Self {
            name: name.into(),
            category: Category::default(),
            amount,
            currency: currency.into(),
            renewal_date,
            billing_cycle: BillingCycle::default(),
            status: SubscriptionStatus::default(),
            trial_end_date: None,
            usage_count: None,
            last_used_date: None,
            is_risky: None,
            reminder_days: None,
            notes: None,
            credentials: None,
        }
    }
}

/// サブスクリプション更新用パッチ（Noneのフィールドは変更しない）
///
/// 削除可能なフィールドは`Option<Option<T>>`で、`Some(None)`が削除を表す。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewal_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_cycle: Option<BillingCycle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SubscriptionStatus>,
    /// `Some(None)`でトライアル終了日を削除する
    #[serde(
        default,
        deserialize_with = "deserialize_clearable",
        skip_serializing_if = "Option::is_none"
    )]
    pub trial_end_date: Option<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_risky: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_days: Option<Vec<i64>>,
    #[serde(
        default,
        deserialize_with = "deserialize_clearable",
        skip_serializing_if = "Option::is_none"
    )]
    pub notes: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "deserialize_clearable",
        skip_serializing_if = "Option::is_none"
    )]
    pub credentials: Option<Option<Credentials>>,
}

impl SubscriptionPatch {
    /// 状態のみを変更するパッチ（ボード上のドラッグ操作）
    pub fn status(status: SubscriptionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// 変更内容が空かどうか
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
