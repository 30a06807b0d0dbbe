//! エンジンとリモート・ローカルストアを組み合わせた統合テスト

#[cfg(test)]
mod integration_tests {
    use crate::features::assistant::mock::{extracted, MockExtractor, PerSubscriptionAdvisor};
    use crate::features::assistant::{Recommendation, RecommendationProvider, RecommendationRequest};
    use crate::features::auth::{AuthSession, BackendMode};
    use crate::features::reminders::NotificationSeverity;
    use crate::features::settings::{SettingsPatch, Theme};
    use crate::features::storage::{
        local::KEY_SUBSCRIPTIONS, InMemoryRemoteStore, LocalFallback, LocalStore,
        MemoryLocalStore, WriteOperation,
    };
    use crate::features::subscriptions::{
        Credentials, SubscriptionDraft, SubscriptionEngine, SubscriptionPatch, SubscriptionStatus,
    };
    use crate::shared::clock::FixedClock;
    use crate::shared::errors::AppResult;
    use chrono::{Duration, NaiveDate};
    use futures::future::BoxFuture;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    const USER: &str = "u1";
    const SUBSCRIPTIONS: &str = "users/u1/subscriptions";
    const PREFERENCES: &str = "users/u1/settings/preferences";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 7).unwrap()
    }

    fn setup(remote: &InMemoryRemoteStore) -> (SubscriptionEngine, MemoryLocalStore) {
        let store = MemoryLocalStore::new();
        let engine = SubscriptionEngine::new(
            LocalFallback::new(store.clone()),
            Arc::new(FixedClock::new(today())),
        )
        .with_remote(Arc::new(remote.clone()));
        (engine, store)
    }

    fn draft(name: &str, days_ahead: i64) -> SubscriptionDraft {
        SubscriptionDraft::new(name, 54.9, "₪", today() + Duration::days(days_ahead))
    }

    fn remote_record(name: &str, days_ahead: i64) -> serde_json::Value {
        json!({
            "name": name,
            "amount": 10.0,
            "currency": "USD",
            "renewalDate": (today() + Duration::days(days_ahead)).format("%Y-%m-%d").to_string(),
            "status": "active"
        })
    }

    /// 生成されたタスクを進め、届いたスナップショットを適用する
    async fn settle(engine: &mut SubscriptionEngine) {
        for _ in 0..20 {
            tokio::task::yield_now().await;
            engine.process_pending();
        }
    }

    fn names(engine: &SubscriptionEngine) -> Vec<String> {
        let mut names: Vec<String> = engine.subscriptions().iter().map(|s| s.name.clone()).collect();
        names.sort();
        names
    }

    async fn sign_in(engine: &mut SubscriptionEngine) {
        engine.set_session(Some(AuthSession::new(USER)));
        settle(engine).await;
    }

    #[tokio::test]
    async fn test_sign_in_replaces_local_list() {
        let remote = InMemoryRemoteStore::new();
        remote.insert_document(&format!("{SUBSCRIPTIONS}/r1"), remote_record("Remote only", 20));
        let (mut engine, _) = setup(&remote);
        engine.add_subscription(draft("Local only", 20));

        engine.set_session(Some(AuthSession::new(USER)));
        assert!(engine.subscriptions().is_empty());
        assert_eq!(
            engine.mode(),
            BackendMode::Remote {
                user_id: USER.to_string()
            }
        );

        settle(&mut engine).await;

        assert_eq!(names(&engine), vec!["Remote only"]);
        assert_eq!(engine.subscriptions()[0].id, "r1");
        // ローカルのデータはリモートにマージされない
        assert_eq!(remote.collection(SUBSCRIPTIONS).len(), 1);
    }

    #[tokio::test]
    async fn test_remote_add_arrives_through_snapshot_and_is_mirrored() {
        let remote = InMemoryRemoteStore::new();
        let (mut engine, store) = setup(&remote);
        sign_in(&mut engine).await;

        let id = engine.add_subscription(draft("Netflix", 20));
        assert!(engine.subscription(&id).is_none());

        settle(&mut engine).await;

        assert!(engine.subscription(&id).is_some());
        let stored = remote.document(&format!("{SUBSCRIPTIONS}/{id}")).unwrap();
        assert_eq!(stored["name"], "Netflix");
        assert_eq!(stored["id"], id.as_str());

        let mirrored = store.read(KEY_SUBSCRIPTIONS).unwrap().unwrap();
        assert!(mirrored.contains(&id));
    }

    #[tokio::test]
    async fn test_remote_update_duplicate_and_mark_as_used() {
        let remote = InMemoryRemoteStore::new();
        let (mut engine, _) = setup(&remote);
        sign_in(&mut engine).await;

        let id = engine.add_subscription(draft("Spotify", 20));
        settle(&mut engine).await;

        engine.update_subscription(
            &id,
            SubscriptionPatch {
                amount: Some(24.9),
                ..SubscriptionPatch::default()
            },
        );
        engine.mark_as_used(&id);
        settle(&mut engine).await;

        let updated = engine.subscription(&id).unwrap();
        assert_eq!(updated.amount, 24.9);
        assert_eq!(updated.usage_count, Some(1));
        assert_eq!(updated.last_used_date, Some(today()));

        let copy_id = engine.duplicate_subscription(&id).unwrap();
        settle(&mut engine).await;
        assert_eq!(names(&engine), vec!["Spotify", "Spotify (copy)"]);
        assert_eq!(engine.subscription(&copy_id).unwrap().amount, 24.9);
    }

    #[tokio::test]
    async fn test_sign_out_detaches_listener() {
        let remote = InMemoryRemoteStore::new();
        remote.insert_document(&format!("{SUBSCRIPTIONS}/r1"), remote_record("Cloud", 20));
        let (mut engine, _) = setup(&remote);
        sign_in(&mut engine).await;
        assert_eq!(remote.active_listener_count(), 2);

        engine.set_session(None);
        settle(&mut engine).await;

        assert_eq!(engine.mode(), BackendMode::Local);
        assert_eq!(remote.active_listener_count(), 0);
        // ローカルにはリモートの一覧がミラーされている
        assert_eq!(names(&engine), vec!["Cloud"]);

        remote.insert_document(&format!("{SUBSCRIPTIONS}/r2"), remote_record("Late", 20));
        settle(&mut engine).await;
        assert_eq!(names(&engine), vec!["Cloud"]);
    }

    #[tokio::test]
    async fn test_switching_users_ignores_stale_snapshots() {
        let remote = InMemoryRemoteStore::new();
        remote.insert_document("users/u2/subscriptions/b", remote_record("Second user", 20));
        let (mut engine, _) = setup(&remote);
        sign_in(&mut engine).await;

        // 切り替え直前に届いた変更は適用されない
        remote.insert_document(&format!("{SUBSCRIPTIONS}/a"), remote_record("First user", 20));
        engine.set_session(Some(AuthSession::new("u2")));
        settle(&mut engine).await;

        assert_eq!(names(&engine), vec!["Second user"]);
        assert_eq!(remote.active_listener_count(), 2);
    }

    #[tokio::test]
    async fn test_permission_denied_is_reported_as_event() {
        let remote = InMemoryRemoteStore::new();
        let (mut engine, _) = setup(&remote);
        sign_in(&mut engine).await;
        let mut errors = engine.subscribe_errors();

        remote.deny_writes("users/u1/");
        let id = engine.add_subscription(draft("Blocked", 20));
        settle(&mut engine).await;

        let error = errors.try_recv().unwrap();
        assert_eq!(error.operation, WriteOperation::Put);
        assert_eq!(error.path, format!("{SUBSCRIPTIONS}/{id}"));
        assert!(error.permission_denied);
        assert_eq!(error.payload.unwrap()["name"], "Blocked");
        assert!(engine.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_remote_update_of_unknown_id_fails_asynchronously() {
        let remote = InMemoryRemoteStore::new();
        let (mut engine, _) = setup(&remote);
        sign_in(&mut engine).await;
        let mut errors = engine.subscribe_errors();

        engine.update_subscription("missing", SubscriptionPatch::default());
        settle(&mut engine).await;

        let error = errors.try_recv().unwrap();
        assert_eq!(error.operation, WriteOperation::Patch);
        assert!(!error.permission_denied);
    }

    #[tokio::test]
    async fn test_remote_delete_is_idempotent() {
        let remote = InMemoryRemoteStore::new();
        remote.insert_document(&format!("{SUBSCRIPTIONS}/r1"), remote_record("Gone", 20));
        let (mut engine, _) = setup(&remote);
        sign_in(&mut engine).await;
        let mut errors = engine.subscribe_errors();

        engine.delete_subscription("r1");
        engine.delete_subscription("r1");
        settle(&mut engine).await;

        assert!(engine.subscriptions().is_empty());
        assert!(errors.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_settings_are_merge_written() {
        let remote = InMemoryRemoteStore::new();
        remote.insert_document(PREFERENCES, json!({ "language": "he" }));
        let (mut engine, _) = setup(&remote);
        sign_in(&mut engine).await;

        assert_eq!(engine.settings().language, "he");
        assert_eq!(engine.settings().default_currency, "₪");

        engine.update_settings(SettingsPatch {
            theme: Some(Theme::Dark),
            ..SettingsPatch::default()
        });
        settle(&mut engine).await;

        assert_eq!(
            remote.document(PREFERENCES).unwrap(),
            json!({ "language": "he", "theme": "dark" })
        );
        assert_eq!(engine.settings().theme, Theme::Dark);
        assert_eq!(engine.settings().language, "he");
    }

    #[tokio::test]
    async fn test_remote_snapshots_produce_reminders_once() {
        let remote = InMemoryRemoteStore::new();
        remote.insert_document(&format!("{SUBSCRIPTIONS}/n1"), remote_record("Netflix", 3));
        let (mut engine, _) = setup(&remote);
        let mut alerts = engine.subscribe_alerts();
        sign_in(&mut engine).await;

        assert_eq!(engine.notifications().len(), 1);
        assert_eq!(engine.notifications()[0].id, "reminder-n1-3-2025-03-07");
        assert_eq!(engine.notifications()[0].severity, NotificationSeverity::Warning);
        assert!(alerts.try_recv().is_ok());

        // 別のレコードが追加されてスナップショットが再送されても重複しない
        remote.insert_document(&format!("{SUBSCRIPTIONS}/x"), remote_record("Other", 30));
        settle(&mut engine).await;
        assert_eq!(engine.subscriptions().len(), 2);
        assert_eq!(engine.notifications().len(), 1);
        assert!(alerts.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_remote_records_are_skipped() {
        let remote = InMemoryRemoteStore::new();
        remote.insert_document(&format!("{SUBSCRIPTIONS}/ok"), remote_record("Valid", 20));
        remote.insert_document(&format!("{SUBSCRIPTIONS}/bad"), json!({ "name": 42 }));
        remote.insert_document(
            &format!("{SUBSCRIPTIONS}/odd"),
            json!({
                "name": "Odd",
                "amount": 5.0,
                "currency": "XYZ",
                "renewalDate": "2025-04-01",
                "category": "spaceships",
                "status": "hibernating"
            }),
        );
        let (mut engine, _) = setup(&remote);
        sign_in(&mut engine).await;

        assert_eq!(names(&engine), vec!["Odd", "Valid"]);
        // 未知の通貨は倍率1.0、未知の状態は有効として集計する
        assert!((engine.monthly_total() - (37.2 + 5.0)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_add_from_invoice() {
        let remote = InMemoryRemoteStore::new();
        let (mut engine, _) = setup(&remote);

        let id = engine
            .add_from_invoice(
                &MockExtractor::returning(extracted("Figma", 15.0)),
                "Figma Professional $15.00".to_string(),
            )
            .await
            .unwrap();
        let added = engine.subscription(&id).unwrap();
        assert_eq!(added.name, "Figma");
        assert_eq!(added.currency, "USD");

        let before = engine.snapshot();
        let failed = engine
            .add_from_invoice(&MockExtractor::failing("timeout"), "???".to_string())
            .await;
        assert!(failed.is_err());
        assert_eq!(engine.snapshot(), before);

        let invalid = engine
            .add_from_invoice(
                &MockExtractor::returning(extracted("Free", 0.0)),
                "free".to_string(),
            )
            .await;
        assert!(invalid.is_err());
        assert_eq!(engine.snapshot(), before);
    }

    #[tokio::test]
    async fn test_add_from_voice() {
        let remote = InMemoryRemoteStore::new();
        let (mut engine, _) = setup(&remote);

        let input = crate::features::assistant::VoiceInput {
            audio: vec![0, 1, 2],
            mime_type: "audio/webm".to_string(),
        };
        let id = engine
            .add_from_voice(&MockExtractor::returning(extracted("Audible", 14.95)), input)
            .await
            .unwrap();
        assert_eq!(engine.subscription(&id).unwrap().name, "Audible");
    }

    /// 受け取ったリクエストを記録するレコメンドプロバイダー
    #[derive(Clone, Default)]
    struct CapturingAdvisor {
        requests: Arc<Mutex<Vec<RecommendationRequest>>>,
    }

    impl RecommendationProvider for CapturingAdvisor {
        fn recommend(
            &self,
            request: RecommendationRequest,
        ) -> BoxFuture<'static, AppResult<Vec<Recommendation>>> {
            self.requests.lock().unwrap().push(request.clone());
            PerSubscriptionAdvisor.recommend(request)
        }
    }

    #[tokio::test]
    async fn test_recommendations_exclude_credentials() {
        let remote = InMemoryRemoteStore::new();
        let (mut engine, _) = setup(&remote);
        let mut with_login = draft("Netflix", 20);
        with_login.credentials = Some(Credentials {
            username: Some("me".to_string()),
            password: Some("hunter2".to_string()),
        });
        let id = engine.add_subscription(with_login);
        let mut cancelled = draft("Old", 20);
        cancelled.status = SubscriptionStatus::Cancelled;
        engine.add_subscription(cancelled);

        let advisor = CapturingAdvisor::default();
        let recommendations = engine.recommendations(&advisor).await.unwrap();

        assert_eq!(recommendations.len(), 1);
        assert_eq!(recommendations[0].subscription_id.as_deref(), Some(id.as_str()));

        let requests = advisor.requests.lock().unwrap();
        assert!(requests[0].subscriptions[0].credentials.is_none());
        assert!((requests[0].monthly_total - 54.9).abs() < 1e-9);
        // 元の一覧のログイン情報は残る
        assert!(engine.subscription(&id).unwrap().credentials.is_some());
    }
}
