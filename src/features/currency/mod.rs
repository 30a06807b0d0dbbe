//! 通貨換算モジュール
//!
//! 通貨コード・記号から基準通貨（ILS）への静的な倍率テーブルを提供します。

pub mod exchange;

pub use exchange::{convert_amount, ExchangeTable, BASE_CURRENCY};
