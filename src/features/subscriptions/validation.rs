use super::models::{SubscriptionDraft, SubscriptionPatch};
use crate::shared::errors::{AppError, AppResult};

/// サービス名の最大文字数
pub const MAX_NAME_LENGTH: usize = 100;

/// 金額の上限（10桁）
pub const MAX_AMOUNT: f64 = 9_999_999_999.0;

/// サブスクリプション作成ドラフトのバリデーション
///
/// エンジンは検証済みのドラフトを前提とするため、呼び出し側で使う。
///
/// # 引数
/// * `draft` - サブスクリプション作成用ドラフト
///
/// # 戻り値
/// バリデーション成功時はOk(())、失敗時はバリデーションエラー
pub fn validate_draft(draft: &SubscriptionDraft) -> AppResult<()> {
    validate_name(&draft.name)?;
    validate_amount(draft.amount)?;
    validate_currency(&draft.currency)?;
    validate_reminder_days(draft.reminder_days.as_deref())?;

    if let Some(trial_end) = draft.trial_end_date {
        if trial_end > draft.renewal_date {
            return Err(AppError::validation(
                "トライアル終了日は更新日以前である必要があります",
            ));
        }
    }

    Ok(())
}

/// サブスクリプション更新パッチのバリデーション
///
/// # 引数
/// * `patch` - サブスクリプション更新用パッチ
///
/// # 戻り値
/// バリデーション成功時はOk(())、失敗時はバリデーションエラー
pub fn validate_patch(patch: &SubscriptionPatch) -> AppResult<()> {
    if let Some(ref name) = patch.name {
        validate_name(name)?;
    }

    if let Some(amount) = patch.amount {
        validate_amount(amount)?;
    }

    if let Some(ref currency) = patch.currency {
        validate_currency(currency)?;
    }

    validate_reminder_days(patch.reminder_days.as_deref())
}

fn validate_name(name: &str) -> AppResult<()> {
    // バリデーション: サービス名は必須
    if name.trim().is_empty() {
        return Err(AppError::validation("サービス名を入力してください"));
    }

    // バリデーション: サービス名は100文字以内
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(AppError::validation(
            "サービス名は100文字以内で入力してください",
        ));
    }

    Ok(())
}

fn validate_amount(amount: f64) -> AppResult<()> {
    // バリデーション: 金額は正の数値
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::validation("金額は正の数値である必要があります"));
    }

    if amount > MAX_AMOUNT {
        return Err(AppError::validation("金額は10桁以内で入力してください"));
    }

    Ok(())
}

fn validate_currency(currency: &str) -> AppResult<()> {
    if currency.trim().is_empty() {
        return Err(AppError::validation("通貨を選択してください"));
    }
    Ok(())
}

fn validate_reminder_days(days: Option<&[i64]>) -> AppResult<()> {
    if days.is_some_and(|days| days.iter().any(|day| *day < 0)) {
        return Err(AppError::validation(
            "リマインダー日数は0以上である必要があります",
        ));
    }
    Ok(())
}
