/// 永続化バックエンドモジュール
///
/// 未ログイン時に使うローカルフォールバックストアと、
/// ログイン時に購読するリモートレコードストアの抽象化を提供します。
pub mod local;
pub mod memory;
pub mod remote;

use crate::features::subscriptions::Subscription;

pub use local::{LocalFallback, LocalStore, MemoryLocalStore, SqliteLocalStore};
pub use memory::InMemoryRemoteStore;
pub use remote::{
    BackendError, RemoteDocument, RemoteListener, RemoteRecordStore, RemoteResult,
    RemoteStoreError, WriteOperation,
};

/// 保存済みのJSON値からサブスクリプション一覧を復元する
///
/// 壊れたレコードはスキップし、負の金額は0として読み込む。
pub fn decode_subscriptions(values: Vec<serde_json::Value>) -> Vec<Subscription> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<Subscription>(value) {
            Ok(subscription) => Some(sanitize(subscription)),
            Err(e) => {
                log::warn!("不正なサブスクリプションレコードをスキップします: {e}");
                None
            }
        })
        .collect()
}

/// リモートのスナップショットからサブスクリプション一覧を復元する
///
/// レコードに`id`がない場合はドキュメントIDを使う。
pub fn decode_documents(documents: Vec<RemoteDocument>) -> Vec<Subscription> {
    let values = documents
        .into_iter()
        .map(|document| {
            let mut data = document.data;
            if let Some(object) = data.as_object_mut() {
                object
                    .entry("id")
                    .or_insert_with(|| serde_json::Value::String(document.id));
            }
            data
        })
        .collect();
    decode_subscriptions(values)
}

fn sanitize(mut subscription: Subscription) -> Subscription {
    if !subscription.amount.is_finite() || subscription.amount < 0.0 {
        log::warn!(
            "金額が不正なため0として扱います: id={}, amount={}",
            subscription.id,
            subscription.amount
        );
        subscription.amount = 0.0;
    }
    subscription
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::subscriptions::{BillingCycle, Category, SubscriptionStatus};
    use serde_json::json;

    #[test]
    fn test_decode_clamps_negative_amounts() {
        let decoded = decode_subscriptions(vec![json!({
            "id": "a",
            "name": "A",
            "amount": -5.0,
            "currency": "$",
            "renewalDate": "2025-01-02"
        })]);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].amount, 0.0);
    }

    #[test]
    fn test_decode_documents_injects_document_id() {
        let decoded = decode_documents(vec![
            RemoteDocument {
                id: "doc-1".to_string(),
                path: "users/u1/subscriptions/doc-1".to_string(),
                data: json!({
                    "name": "Spotify",
                    "amount": 19.9,
                    "currency": "₪",
                    "renewalDate": "2025-04-01"
                }),
            },
            RemoteDocument {
                id: "broken".to_string(),
                path: "users/u1/subscriptions/broken".to_string(),
                data: json!({ "name": "no amount" }),
            },
        ]);

        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].id, "doc-1");
        assert_eq!(decoded[0].name, "Spotify");
    }

    #[test]
    fn test_decode_keeps_records_with_non_string_enums() {
        let decoded = decode_subscriptions(vec![
            json!({
                "id": "a",
                "name": "A",
                "category": null,
                "amount": 10.0,
                "currency": "₪",
                "renewalDate": "2025-01-02"
            }),
            json!({
                "id": "b",
                "name": "B",
                "amount": 20.0,
                "currency": "₪",
                "renewalDate": "2025-01-03",
                "billingCycle": false,
                "status": 7
            }),
        ]);

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].category, Category::Unknown);
        assert_eq!(decoded[1].billing_cycle, BillingCycle::Monthly);
        assert_eq!(decoded[1].status, SubscriptionStatus::Unknown);
    }
}
