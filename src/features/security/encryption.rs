use crate::features::subscriptions::Subscription;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// 暗号化済みの値に付けるプレフィックス
const SEALED_PREFIX: &str = "aes256gcm:";

/// 暗号化エラー
#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("暗号化エラー: {0}")]
    EncryptionFailed(String),

    #[error("復号化エラー: {0}")]
    DecryptionFailed(String),

    #[error("Base64エンコードエラー: {0}")]
    Base64Error(String),

    #[error("データ形式エラー: {0}")]
    FormatError(String),
}

/// 認証情報の暗号化サービス
///
/// ローカルストアに保存するパスワードをAES-256-GCMで暗号化する。
/// 暗号化済みの値は`aes256gcm:<nonce>:<ciphertext>`形式の文字列になる。
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    /// 任意長のシークレットから新しいCredentialCipherを作成する
    ///
    /// # 引数
    /// * `secret` - 暗号化キーの元になる文字列（SHA-256で32バイトに導出）
    pub fn new(secret: &str) -> Self {
        let key = Sha256::digest(secret.as_bytes());
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    /// 値を暗号化する
    pub fn seal(&self, plaintext: &str) -> Result<String, EncryptionError> {
        // ランダムなナンス（12バイト）を生成
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| EncryptionError::EncryptionFailed(e.to_string()))?;

        Ok(format!(
            "{SEALED_PREFIX}{}:{}",
            general_purpose::STANDARD.encode(nonce_bytes),
            general_purpose::STANDARD.encode(ciphertext)
        ))
    }

    /// 暗号化された値を復号化する
    ///
    /// プレフィックスのない値は平文としてそのまま返す。
    pub fn open(&self, sealed: &str) -> Result<String, EncryptionError> {
        let Some(body) = sealed.strip_prefix(SEALED_PREFIX) else {
            return Ok(sealed.to_string());
        };

        let (nonce_b64, ciphertext_b64) = body
            .split_once(':')
            .ok_or_else(|| EncryptionError::FormatError("区切り文字がありません".to_string()))?;

        let nonce_bytes = general_purpose::STANDARD
            .decode(nonce_b64)
            .map_err(|e| EncryptionError::Base64Error(format!("ナンスデコードエラー: {e}")))?;

        if nonce_bytes.len() != 12 {
            return Err(EncryptionError::FormatError(
                "ナンスのサイズが正しくありません".to_string(),
            ));
        }

        let ciphertext = general_purpose::STANDARD
            .decode(ciphertext_b64)
            .map_err(|e| EncryptionError::Base64Error(format!("暗号文デコードエラー: {e}")))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|e| EncryptionError::DecryptionFailed(e.to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| EncryptionError::DecryptionFailed(format!("UTF-8変換エラー: {e}")))
    }

    /// 一覧内のパスワードをすべて暗号化したコピーを返す
    ///
    /// 暗号化に失敗したパスワードは保存しない。
    pub fn seal_subscriptions(&self, subscriptions: &[Subscription]) -> Vec<Subscription> {
        subscriptions
            .iter()
            .cloned()
            .map(|mut sub| {
                if let Some(credentials) = sub.credentials.as_mut() {
                    credentials.password = credentials.password.take().and_then(|password| {
                        self.seal(&password)
                            .map_err(|e| {
                                log::warn!("パスワードの暗号化に失敗しました: id={}, {e}", sub.id)
                            })
                            .ok()
                    });
                }
                sub
            })
            .collect()
    }

    /// 一覧内のパスワードを復号化する
    ///
    /// 復号化できないパスワードは破棄し、ユーザー名は残す。
    pub fn open_subscriptions(&self, subscriptions: Vec<Subscription>) -> Vec<Subscription> {
        subscriptions
            .into_iter()
            .map(|mut sub| {
                if let Some(credentials) = sub.credentials.as_mut() {
                    credentials.password = credentials.password.take().and_then(|sealed| {
                        self.open(&sealed)
                            .map_err(|e| {
                                log::warn!("パスワードの復号化に失敗しました: id={}, {e}", sub.id)
                            })
                            .ok()
                    });
                }
                sub
            })
            .collect()
    }
}

/// 暗号化キーがない場合にパスワードを取り除いたコピーを返す
pub fn strip_passwords(subscriptions: &[Subscription]) -> Vec<Subscription> {
    subscriptions
        .iter()
        .cloned()
        .map(|mut sub| {
            if let Some(credentials) = sub.credentials.as_mut() {
                credentials.password = None;
            }
            sub
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::subscriptions::{Credentials, SubscriptionDraft};
    use chrono::NaiveDate;

    fn setup_test_cipher() -> CredentialCipher {
        CredentialCipher::new("test_encryption_key")
    }

    fn with_password(password: &str) -> Subscription {
        let mut draft = SubscriptionDraft::new(
            "Netflix",
            54.9,
            "₪",
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
        );
        draft.credentials = Some(Credentials {
            username: Some("me@example.com".to_string()),
            password: Some(password.to_string()),
        });
        Subscription::from_draft("n1".to_string(), draft)
    }

    #[test]
    fn test_seal_open() {
        let cipher = setup_test_cipher();

        let sealed = cipher.seal("hunter2").unwrap();
        assert!(sealed.starts_with(SEALED_PREFIX));
        assert!(!sealed.contains("hunter2"));
        assert_eq!(cipher.open(&sealed).unwrap(), "hunter2");
    }

    #[test]
    fn test_open_plaintext_passthrough() {
        let cipher = setup_test_cipher();
        assert_eq!(cipher.open("legacy").unwrap(), "legacy");
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let sealed = setup_test_cipher().seal("hunter2").unwrap();
        let other = CredentialCipher::new("another_key");
        assert!(matches!(
            other.open(&sealed),
            Err(EncryptionError::DecryptionFailed(_))
        ));
        assert!(other.open("aes256gcm:broken").is_err());
    }

    #[test]
    fn test_subscription_roundtrip_and_fail_soft() {
        let cipher = setup_test_cipher();
        let sealed = cipher.seal_subscriptions(&[with_password("hunter2")]);

        let stored = sealed[0].credentials.as_ref().unwrap();
        assert_ne!(stored.password.as_deref(), Some("hunter2"));

        let opened = cipher.open_subscriptions(sealed.clone());
        assert_eq!(
            opened[0].credentials.as_ref().unwrap().password.as_deref(),
            Some("hunter2")
        );

        // 別のキーで開くとパスワードのみ失われる
        let lost = CredentialCipher::new("another_key").open_subscriptions(sealed);
        let credentials = lost[0].credentials.as_ref().unwrap();
        assert!(credentials.password.is_none());
        assert_eq!(credentials.username.as_deref(), Some("me@example.com"));
    }

    #[test]
    fn test_strip_passwords() {
        let stripped = strip_passwords(&[with_password("hunter2")]);
        assert!(stripped[0].credentials.as_ref().unwrap().password.is_none());
    }
}
