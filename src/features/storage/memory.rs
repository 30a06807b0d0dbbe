use super::remote::{RemoteDocument, RemoteListener, RemoteRecordStore, RemoteResult, RemoteStoreError};
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

struct Listener {
    collection_path: String,
    sender: mpsc::UnboundedSender<Vec<RemoteDocument>>,
}

#[derive(Default)]
struct Inner {
    documents: BTreeMap<String, serde_json::Value>,
    listeners: Vec<Listener>,
    denied_prefixes: Vec<String>,
    offline: bool,
}

fn parent_path(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

impl Inner {
    fn snapshot(&self, collection_path: &str) -> Vec<RemoteDocument> {
        self.documents
            .iter()
            .filter(|(path, _)| parent_path(path) == collection_path)
            .map(|(path, data)| RemoteDocument {
                id: path.rsplit('/').next().unwrap_or_default().to_string(),
                path: path.clone(),
                data: data.clone(),
            })
            .collect()
    }

    /// 変更されたドキュメントのコレクションを購読しているリスナーへ通知する
    fn notify(&mut self, changed_path: &str) {
        let collection = parent_path(changed_path).to_string();
        let snapshot = self.snapshot(&collection);
        self.listeners.retain(|listener| {
            if listener.collection_path != collection {
                return !listener.sender.is_closed();
            }
            listener.sender.send(snapshot.clone()).is_ok()
        });
    }

    fn check_writable(&self, path: &str) -> RemoteResult {
        if self.offline {
            return Err(RemoteStoreError::Unavailable(path.to_string()));
        }
        if self
            .denied_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return Err(RemoteStoreError::PermissionDenied(path.to_string()));
        }
        Ok(())
    }
}

/// メモリ上のリモートストア
///
/// テストやオフラインのデモ用。クローンは同じデータを共有し、
/// 別端末からの書き込みや権限エラーを再現できる。
#[derive(Clone, Default)]
pub struct InMemoryRemoteStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    /// 外部からドキュメントを書き込む（別端末の操作を再現）
    pub fn insert_document(&self, path: &str, data: serde_json::Value) {
        self.with_inner(|inner| {
            inner.documents.insert(path.to_string(), data);
            inner.notify(path);
        });
    }

    pub fn document(&self, path: &str) -> Option<serde_json::Value> {
        self.with_inner(|inner| inner.documents.get(path).cloned())
    }

    pub fn collection(&self, collection_path: &str) -> Vec<RemoteDocument> {
        self.with_inner(|inner| inner.snapshot(collection_path))
    }

    /// 指定プレフィックスへの書き込みを拒否する
    pub fn deny_writes(&self, prefix: &str) {
        self.with_inner(|inner| inner.denied_prefixes.push(prefix.to_string()));
    }

    /// 接続断を再現する
    pub fn set_offline(&self, offline: bool) {
        self.with_inner(|inner| inner.offline = offline);
    }

    /// 有効なリスナー数（解除済みのものは除外）
    pub fn active_listener_count(&self) -> usize {
        self.with_inner(|inner| {
            inner.listeners.retain(|listener| !listener.sender.is_closed());
            inner.listeners.len()
        })
    }

    fn write<F>(&self, path: &str, apply: F) -> BoxFuture<'static, RemoteResult>
    where
        F: FnOnce(&mut BTreeMap<String, serde_json::Value>, &str) -> RemoteResult + Send + 'static,
    {
        let store = self.clone();
        let path = path.to_string();
        Box::pin(async move {
            store.with_inner(|inner| -> RemoteResult {
                inner.check_writable(&path)?;
                apply(&mut inner.documents, &path)?;
                inner.notify(&path);
                Ok(())
            })
        })
    }
}

fn merge_fields(target: &mut serde_json::Value, fields: serde_json::Value) {
    match (target.as_object_mut(), fields) {
        (Some(object), serde_json::Value::Object(fields)) => {
            for (key, value) in fields {
                object.insert(key, value);
            }
        }
        (_, fields) => *target = fields,
    }
}

impl RemoteRecordStore for InMemoryRemoteStore {
    fn subscribe(&self, collection_path: &str) -> RemoteListener {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.with_inner(|inner| {
            // 購読直後に現在のスナップショットを送る
            let _ = sender.send(inner.snapshot(collection_path));
            inner.listeners.push(Listener {
                collection_path: collection_path.to_string(),
                sender,
            });
        });
        RemoteListener {
            snapshots: receiver,
        }
    }

    fn put(&self, path: &str, record: serde_json::Value) -> BoxFuture<'static, RemoteResult> {
        self.write(path, move |documents, path| {
            documents.insert(path.to_string(), record);
            Ok(())
        })
    }

    fn patch(&self, path: &str, fields: serde_json::Value) -> BoxFuture<'static, RemoteResult> {
        self.write(path, move |documents, path| match documents.get_mut(path) {
            Some(existing) => {
                merge_fields(existing, fields);
                Ok(())
            }
            None => Err(RemoteStoreError::NotFound(path.to_string())),
        })
    }

    fn merge(&self, path: &str, fields: serde_json::Value) -> BoxFuture<'static, RemoteResult> {
        self.write(path, move |documents, path| {
            let existing = documents
                .entry(path.to_string())
                .or_insert_with(|| serde_json::Value::Object(Default::default()));
            merge_fields(existing, fields);
            Ok(())
        })
    }

    fn delete(&self, path: &str) -> BoxFuture<'static, RemoteResult> {
        self.write(path, |documents, path| {
            documents.remove(path);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_subscribe_receives_initial_and_changes() {
        let store = InMemoryRemoteStore::new();
        store.insert_document("users/u1/subscriptions/a", json!({ "name": "A" }));

        let mut listener = store.subscribe("users/u1/subscriptions");
        let initial = listener.next_snapshot().await.unwrap();
        assert_eq!(initial.len(), 1);
        assert_eq!(initial[0].id, "a");

        store
            .put("users/u1/subscriptions/b", json!({ "name": "B" }))
            .await
            .unwrap();
        let next = listener.next_snapshot().await.unwrap();
        assert_eq!(next.len(), 2);
    }

    #[tokio::test]
    async fn test_other_collections_do_not_notify() {
        let store = InMemoryRemoteStore::new();
        let mut listener = store.subscribe("users/u1/subscriptions");
        listener.next_snapshot().await.unwrap();

        store
            .put("users/u2/subscriptions/x", json!({ "name": "X" }))
            .await
            .unwrap();
        assert!(listener.snapshots.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_patch_missing_document_fails() {
        let store = InMemoryRemoteStore::new();
        let result = store
            .patch("users/u1/subscriptions/missing", json!({ "amount": 1 }))
            .await;
        assert!(matches!(result, Err(RemoteStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_merge_creates_and_preserves_fields() {
        let store = InMemoryRemoteStore::new();
        let path = "users/u1/settings/preferences";

        store.merge(path, json!({ "theme": "dark" })).await.unwrap();
        store.merge(path, json!({ "soundEnabled": false })).await.unwrap();

        assert_eq!(
            store.document(path).unwrap(),
            json!({ "theme": "dark", "soundEnabled": false })
        );
    }

    #[tokio::test]
    async fn test_denied_and_offline_writes() {
        let store = InMemoryRemoteStore::new();
        store.deny_writes("users/u1/");
        let denied = store.put("users/u1/subscriptions/a", json!({})).await;
        assert!(matches!(denied, Err(RemoteStoreError::PermissionDenied(_))));

        store.set_offline(true);
        let offline = store.delete("users/u2/subscriptions/a").await;
        assert!(matches!(offline, Err(RemoteStoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_dropped_listener_is_pruned() {
        let store = InMemoryRemoteStore::new();
        let listener = store.subscribe("users/u1/subscriptions");
        assert_eq!(store.active_listener_count(), 1);

        drop(listener);
        assert_eq!(store.active_listener_count(), 0);
    }
}
