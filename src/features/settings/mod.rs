//! ユーザー設定機能モジュール
//!
//! すべてのフィールドにデフォルト値を持ち、部分更新はコピーオンライトでマージします。

pub mod models;

pub use models::{SettingsPatch, Theme, UserSettings};
