// セキュリティ機能モジュール

pub mod encryption;

// 公開インターフェース
pub use encryption::{strip_passwords, CredentialCipher, EncryptionError};
