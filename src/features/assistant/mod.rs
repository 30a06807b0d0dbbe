//! AIアシスタント連携モジュール
//!
//! 請求書テキストの抽出、音声入力の抽出、節約レコメンドの生成は外部サービスが担当する。
//! ここでは入出力の型と、エンジンが依存するトレイトのみを定義する。

use crate::features::subscriptions::{
    validate_draft, BillingCycle, Category, SubscriptionDraft,
};
use crate::shared::errors::AppResult;
use chrono::{Months, NaiveDate};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// AIが抽出したサブスクリプション情報
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedSubscription {
    pub name: String,
    pub amount: f64,
    pub currency: String,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub billing_cycle: Option<BillingCycle>,
    #[serde(default)]
    pub renewal_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ExtractedSubscription {
    /// 抽出結果を検証済みのドラフトに変換する
    ///
    /// 更新日が抽出できなかった場合は、支払いサイクル1回分先の日付を使う。
    ///
    /// # 引数
    /// * `today` - 今日の日付
    ///
    /// # 戻り値
    /// 検証済みのドラフト、または検証エラー
    pub fn into_draft(self, today: NaiveDate) -> AppResult<SubscriptionDraft> {
        let billing_cycle = self.billing_cycle.unwrap_or_default();
        let renewal_date = self.renewal_date.unwrap_or_else(|| {
            let months = match billing_cycle {
                BillingCycle::Monthly => Months::new(1),
                BillingCycle::Yearly => Months::new(12),
            };
            today.checked_add_months(months).unwrap_or(today)
        });

        let mut draft = SubscriptionDraft::new(self.name.trim(), self.amount, self.currency, renewal_date);
        draft.category = self.category.unwrap_or_default();
        draft.billing_cycle = billing_cycle;
        draft.notes = self.notes;

        validate_draft(&draft)?;
        Ok(draft)
    }
}

/// 音声入力
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInput {
    pub audio: Vec<u8>,
    pub mime_type: String,
}

/// レコメンド生成の入力
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRequest {
    pub subscriptions: Vec<crate::features::subscriptions::Subscription>,
    pub monthly_total: f64,
    pub currency: String,
    pub language: String,
}

/// 節約レコメンド
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub potential_savings: Option<f64>,
}

/// 請求書・領収書テキストからの抽出
pub trait InvoiceExtractor: Send + Sync {
    fn extract(&self, text: String) -> BoxFuture<'static, AppResult<ExtractedSubscription>>;
}

/// 音声入力からの抽出
pub trait VoiceExtractor: Send + Sync {
    fn extract(&self, input: VoiceInput) -> BoxFuture<'static, AppResult<ExtractedSubscription>>;
}

/// 節約レコメンドの生成
pub trait RecommendationProvider: Send + Sync {
    fn recommend(
        &self,
        request: RecommendationRequest,
    ) -> BoxFuture<'static, AppResult<Vec<Recommendation>>>;
}
