use super::models::{Category, Subscription};
use crate::features::currency::ExchangeTable;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

/// 支出サマリー（指定通貨での正規化済み合計）
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SpendSummary {
    pub currency: String,
    pub monthly_total: f64,
    pub yearly_total: f64,
    pub billable_count: usize,
}

/// カテゴリ別の月額合計
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySpend {
    pub category: Category,
    pub monthly_total: f64,
    pub count: usize,
}

fn monthly_in(subscription: &Subscription, table: &ExchangeTable, currency: &str) -> f64 {
    let monthly = subscription
        .billing_cycle
        .monthly_amount(subscription.amount);
    table.convert_between(monthly, &subscription.currency, currency)
}

/// 支払い中のサブスクリプションの月額合計を計算する
///
/// 年額は12で割って月額に正規化し、`currency`に換算する。
pub fn calculate_monthly_total(
    subscriptions: &[Subscription],
    table: &ExchangeTable,
    currency: &str,
) -> f64 {
    subscriptions
        .iter()
        .filter(|sub| sub.status.is_billable())
        .fold(0.0, |acc, sub| acc + monthly_in(sub, table, currency))
}

/// 支払い中のサブスクリプションの年額合計を計算する
pub fn calculate_yearly_total(
    subscriptions: &[Subscription],
    table: &ExchangeTable,
    currency: &str,
) -> f64 {
    subscriptions
        .iter()
        .filter(|sub| sub.status.is_billable())
        .fold(0.0, |acc, sub| {
            let yearly = sub.billing_cycle.yearly_amount(sub.amount);
            acc + table.convert_between(yearly, &sub.currency, currency)
        })
}

/// 支出サマリーを作成する
pub fn summarize(subscriptions: &[Subscription], table: &ExchangeTable, currency: &str) -> SpendSummary {
    SpendSummary {
        currency: currency.to_string(),
        monthly_total: calculate_monthly_total(subscriptions, table, currency),
        yearly_total: calculate_yearly_total(subscriptions, table, currency),
        billable_count: subscriptions
            .iter()
            .filter(|sub| sub.status.is_billable())
            .count(),
    }
}

/// カテゴリ別の月額合計（金額の大きい順）
pub fn category_breakdown(
    subscriptions: &[Subscription],
    table: &ExchangeTable,
    currency: &str,
) -> Vec<CategorySpend> {
    let mut totals: HashMap<Category, CategorySpend> = HashMap::new();

    for sub in subscriptions.iter().filter(|sub| sub.status.is_billable()) {
        let entry = totals.entry(sub.category).or_insert(CategorySpend {
            category: sub.category,
            monthly_total: 0.0,
            count: 0,
        });
        entry.monthly_total += monthly_in(sub, table, currency);
        entry.count += 1;
    }

    let mut breakdown: Vec<CategorySpend> = totals.into_values().collect();
    breakdown.sort_by(|a, b| {
        b.monthly_total
            .total_cmp(&a.monthly_total)
            .then_with(|| a.category.as_str().cmp(b.category.as_str()))
    });
    breakdown
}

/// 指定日数以内に更新日を迎えるサブスクリプション（更新日の近い順）
pub fn upcoming_renewals(
    subscriptions: &[Subscription],
    today: NaiveDate,
    within_days: i64,
) -> Vec<Subscription> {
    let mut upcoming: Vec<Subscription> = subscriptions
        .iter()
        .filter(|sub| sub.status != super::models::SubscriptionStatus::Cancelled)
        .filter(|sub| (0..=within_days).contains(&sub.days_until_renewal(today)))
        .cloned()
        .collect();
    upcoming.sort_by_key(|sub| sub.renewal_date);
    upcoming
}

/// 支払い中だが長期間使われていないサブスクリプション
///
/// 最終利用日が`threshold_days`日より前のもの、または状態が未使用のものを返す。
pub fn unused_subscriptions(
    subscriptions: &[Subscription],
    today: NaiveDate,
    threshold_days: i64,
) -> Vec<Subscription> {
    subscriptions
        .iter()
        .filter(|sub| sub.status.is_billable())
        .filter(|sub| {
            sub.status == super::models::SubscriptionStatus::NotInUse
                || sub
                    .last_used_date
                    .is_some_and(|last| (today - last).num_days() > threshold_days)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::subscriptions::models::{
        BillingCycle, SubscriptionDraft, SubscriptionStatus,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sub(id: &str, amount: f64, currency: &str, cycle: BillingCycle) -> Subscription {
        let mut draft = SubscriptionDraft::new(id, amount, currency, date(2025, 3, 10));
        draft.billing_cycle = cycle;
        Subscription::from_draft(id.to_string(), draft)
    }

    fn table() -> ExchangeTable {
        ExchangeTable::new([("ILS", 1.0), ("USD", 4.0)])
    }

    #[test]
    fn test_monthly_total_normalizes_cycle_and_currency() {
        let subs = vec![
            sub("a", 50.0, "ILS", BillingCycle::Monthly),
            sub("b", 120.0, "ILS", BillingCycle::Yearly),
            sub("c", 10.0, "USD", BillingCycle::Monthly),
        ];

        let total = calculate_monthly_total(&subs, &table(), "ILS");
        assert!((total - (50.0 + 10.0 + 40.0)).abs() < 1e-9);

        let in_usd = calculate_monthly_total(&subs, &table(), "USD");
        assert!((in_usd - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_billable_statuses_are_excluded() {
        let mut cancelled = sub("a", 50.0, "ILS", BillingCycle::Monthly);
        cancelled.status = SubscriptionStatus::Cancelled;
        let mut trial = sub("b", 30.0, "ILS", BillingCycle::Monthly);
        trial.status = SubscriptionStatus::Trial;
        let active = sub("c", 20.0, "ILS", BillingCycle::Monthly);

        let summary = summarize(&[cancelled, trial, active], &table(), "ILS");
        assert_eq!(summary.billable_count, 1);
        assert!((summary.monthly_total - 20.0).abs() < 1e-9);
        assert!((summary.yearly_total - 240.0).abs() < 1e-9);
    }

    #[test]
    fn test_category_breakdown_sorted_desc() {
        let mut a = sub("a", 10.0, "ILS", BillingCycle::Monthly);
        a.category = Category::News;
        let mut b = sub("b", 30.0, "ILS", BillingCycle::Monthly);
        b.category = Category::Entertainment;
        let mut c = sub("c", 5.0, "ILS", BillingCycle::Monthly);
        c.category = Category::Entertainment;

        let breakdown = category_breakdown(&[a, b, c], &table(), "ILS");
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].category, Category::Entertainment);
        assert_eq!(breakdown[0].count, 2);
        assert!((breakdown[0].monthly_total - 35.0).abs() < 1e-9);
    }

    #[test]
    fn test_upcoming_and_unused() {
        let today = date(2025, 3, 1);
        let mut soon = sub("soon", 10.0, "ILS", BillingCycle::Monthly);
        soon.renewal_date = date(2025, 3, 4);
        soon.last_used_date = Some(date(2024, 12, 1));
        let mut later = sub("later", 10.0, "ILS", BillingCycle::Monthly);
        later.renewal_date = date(2025, 4, 20);
        later.last_used_date = Some(date(2025, 2, 27));

        let subs = vec![later.clone(), soon.clone()];
        let upcoming = upcoming_renewals(&subs, today, 7);
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].id, "soon");

        let unused = unused_subscriptions(&subs, today, 30);
        assert_eq!(unused.len(), 1);
        assert_eq!(unused[0].id, "soon");
    }
}
