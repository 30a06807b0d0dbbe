use once_cell::sync::Lazy;
use std::collections::HashMap;

/// 基準通貨（すべての倍率はこの通貨に対する値）
pub const BASE_CURRENCY: &str = "ILS";

/// 通貨コード・記号から基準通貨への倍率
///
/// 表示用の概算値であり、為替レートの取得は行わない。
static DEFAULT_TABLE: Lazy<ExchangeTable> = Lazy::new(|| {
    ExchangeTable::new([
        ("ILS", 1.0),
        ("₪", 1.0),
        ("USD", 3.72),
        ("$", 3.72),
        ("EUR", 4.05),
        ("€", 4.05),
        ("GBP", 4.75),
        ("£", 4.75),
        ("JPY", 0.025),
        ("¥", 0.025),
        ("CAD", 2.72),
        ("AUD", 2.45),
        ("CHF", 4.2),
    ])
});

/// 為替テーブル
///
/// 完全一致、大文字化したキー、の順で検索し、見つからない場合は倍率1.0を返す。
#[derive(Debug, Clone)]
pub struct ExchangeTable {
    rates: HashMap<String, f64>,
}

impl ExchangeTable {
    /// 任意の倍率でテーブルを作成する
    pub fn new<I, K>(rates: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self {
            rates: rates.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// 通貨の倍率を取得する（失敗時は1.0）
    pub fn multiplier(&self, currency: &str) -> f64 {
        let trimmed = currency.trim();
        self.rates
            .get(trimmed)
            .or_else(|| self.rates.get(&trimmed.to_uppercase()))
            .copied()
            .unwrap_or(1.0)
    }

    /// 通貨が登録されているか
    pub fn contains(&self, currency: &str) -> bool {
        let trimmed = currency.trim();
        self.rates.contains_key(trimmed) || self.rates.contains_key(&trimmed.to_uppercase())
    }

    /// 金額を基準通貨に換算する
    pub fn convert_amount(&self, amount: f64, from_currency: &str) -> f64 {
        amount * self.multiplier(from_currency)
    }

    /// 金額を任意の通貨間で換算する（基準通貨経由）
    pub fn convert_between(&self, amount: f64, from_currency: &str, to_currency: &str) -> f64 {
        let to = self.multiplier(to_currency);
        if to == 0.0 {
            return self.convert_amount(amount, from_currency);
        }
        self.convert_amount(amount, from_currency) / to
    }
}

impl Default for ExchangeTable {
    fn default() -> Self {
        DEFAULT_TABLE.clone()
    }
}

/// デフォルトテーブルで金額を基準通貨に換算する
pub fn convert_amount(amount: f64, from_currency: &str) -> f64 {
    DEFAULT_TABLE.convert_amount(amount, from_currency)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_convert_usd() {
        let table = ExchangeTable::new([("USD", 3.72)]);
        assert!((table.convert_amount(100.0, "USD") - 372.0).abs() < 1e-9);
    }

    #[test]
    fn test_case_insensitive_fallback() {
        let table = ExchangeTable::default();
        assert_eq!(table.multiplier("usd"), 3.72);
        assert_eq!(table.multiplier("eur"), 4.05);
        assert_eq!(table.multiplier("₪"), 1.0);
        assert!(table.contains("gbp"));
    }

    #[test]
    fn test_unknown_currency_is_identity() {
        let table = ExchangeTable::default();
        assert_eq!(table.convert_amount(42.5, "XYZ"), 42.5);
        assert_eq!(convert_amount(42.5, ""), 42.5);
        assert!(!table.contains("XYZ"));
    }

    #[test]
    fn test_convert_between() {
        let table = ExchangeTable::new([("USD", 4.0), ("EUR", 2.0)]);
        assert!((table.convert_between(10.0, "USD", "EUR") - 20.0).abs() < 1e-9);
        // 未登録の換算先は基準通貨として扱う
        assert!((table.convert_between(10.0, "USD", "ILS") - 40.0).abs() < 1e-9);
    }

    #[quickcheck]
    fn prop_unknown_currency_returns_input(amount: f64, suffix: u16) -> bool {
        let code = format!("ZZ{suffix}");
        let converted = ExchangeTable::default().convert_amount(amount, &code);
        converted == amount || (amount.is_nan() && converted.is_nan())
    }
}
