//! Integration tests for the notification store + repository pipeline.
//!
//! These tests verify:
//! 1. Pagination cursor math and `has_more` against a mocked backend
//! 2. Optimistic mark-read with rollback on write failure
//! 3. The mark-all-read bulk path, including a realtime insert arriving
//!    right after a successful bulk update
//! 4. Resync-instead-of-rollback after a failed bulk update
//! 5. Preferences defaults merge and upsert

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use newsroom_sync::models::{NotificationFilter, NotificationType};
use newsroom_sync::store::notifications::{NewNotification, NotificationRepository};
use newsroom_sync::store::preferences::PreferencesRepository;
use newsroom_sync::store::RestClient;
use newsroom_sync::sync::{NotificationStore, PageLoad};

fn repo(server: &MockServer) -> NotificationRepository {
    NotificationRepository::new(RestClient::new(&server.uri(), "test-key").unwrap())
}

fn row(user: Uuid, created_at: DateTime<Utc>, read: bool) -> serde_json::Value {
    json!({
        "id": Uuid::new_v4(),
        "user_id": user,
        "type": "news_published",
        "title": "Article published",
        "message": null,
        "data": {},
        "read_at": if read { json!(created_at) } else { json!(null) },
        "created_at": created_at,
        "updated_at": created_at,
    })
}

fn page(user: Uuid, base: DateTime<Utc>, offset: i64, count: i64) -> Vec<serde_json::Value> {
    (0..count)
        .map(|i| row(user, base - Duration::minutes(offset + i), false))
        .collect()
}

mod pagination_tests {
    use super::*;

    #[tokio::test]
    async fn test_full_page_advances_cursor_and_keeps_has_more() {
        let server = MockServer::start().await;
        let user = Uuid::new_v4();
        let base = Utc::now();

        Mock::given(method("GET"))
            .and(path("/rest/v1/notifications"))
            .and(query_param("offset", "0"))
            .and(query_param("limit", "20"))
            .and(query_param("user_id", format!("eq.{}", user)))
            .and(query_param("order", "created_at.desc,id.desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(user, base, 0, 20)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/notifications"))
            .and(query_param("offset", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(user, base, 20, 7)))
            .mount(&server)
            .await;

        let store = NotificationStore::new(repo(&server), user, 20);

        assert_eq!(
            store.load_page(true).await.unwrap(),
            PageLoad::Applied { fetched: 20 }
        );
        assert!(store.has_more());
        assert_eq!(store.len(), 20);

        // Second page is short: pagination ends.
        assert_eq!(
            store.load_page(false).await.unwrap(),
            PageLoad::Applied { fetched: 7 }
        );
        assert!(!store.has_more());
        assert_eq!(store.len(), 27);
        assert_eq!(store.unread_count(), 27);

        // Order is descending regardless of page boundaries.
        let created: Vec<_> = store.notifications().iter().map(|n| n.created_at).collect();
        let mut sorted = created.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(created, sorted);
    }

    #[tokio::test]
    async fn test_unread_filter_reaches_the_wire() {
        let server = MockServer::start().await;
        let user = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/rest/v1/notifications"))
            .and(query_param("read_at", "is.null"))
            .and(query_param("type", "in.(approval_request)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let store = NotificationStore::new(repo(&server), user, 20);
        store.set_filter(NotificationFilter {
            types: Some(vec![NotificationType::ApprovalRequest]),
            read: Some(false),
            ..Default::default()
        });

        assert_eq!(
            store.load_page(true).await.unwrap(),
            PageLoad::Applied { fetched: 0 }
        );
        assert!(!store.has_more());
    }

    #[tokio::test]
    async fn test_transport_error_keeps_cache_and_surfaces_state() {
        let server = MockServer::start().await;
        let user = Uuid::new_v4();
        let base = Utc::now();

        Mock::given(method("GET"))
            .and(path("/rest/v1/notifications"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(user, base, 0, 3)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/notifications"))
            .and(query_param("offset", "3"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let store = NotificationStore::new(repo(&server), user, 3);
        store.load_page(true).await.unwrap();
        assert_eq!(store.len(), 3);

        let err = store.load_page(false).await.unwrap_err();
        assert!(err.is_retryable());
        // The cache is never cleared on a transport error.
        assert_eq!(store.len(), 3);
        assert!(store.last_error().is_some());
        assert!(!store.is_loading());
    }
}

mod mark_read_tests {
    use super::*;

    #[tokio::test]
    async fn test_mark_as_read_success() {
        let server = MockServer::start().await;
        let user = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/rest/v1/notifications"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page(user, Utc::now(), 0, 1)),
            )
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/notifications"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let store = NotificationStore::new(repo(&server), user, 20);
        store.load_page(true).await.unwrap();
        assert_eq!(store.unread_count(), 1);

        let id = store.notifications()[0].id;
        store.mark_as_read(id).await.unwrap();
        assert_eq!(store.unread_count(), 0);
        assert!(store.notifications()[0].read_at.is_some());

        // Second call on the same id is a local no-op (the PATCH mock
        // expects exactly one call) and the count never goes negative.
        store.mark_as_read(id).await.unwrap();
        assert_eq!(store.unread_count(), 0);
    }

    #[tokio::test]
    async fn test_mark_as_read_rolls_back_on_failure() {
        let server = MockServer::start().await;
        let user = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/rest/v1/notifications"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page(user, Utc::now(), 0, 1)),
            )
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/notifications"))
            .respond_with(ResponseTemplate::new(500).set_body_string("write failed"))
            .mount(&server)
            .await;

        let store = NotificationStore::new(repo(&server), user, 20);
        store.load_page(true).await.unwrap();

        let id = store.notifications()[0].id;
        assert!(store.mark_as_read(id).await.is_err());

        // Optimistic change reverted, error surfaced.
        assert_eq!(store.unread_count(), 1);
        assert!(store.notifications()[0].read_at.is_none());
        assert!(store.last_error().is_some());
    }
}

mod mark_all_read_tests {
    use super::*;

    #[tokio::test]
    async fn test_mark_all_then_realtime_insert() {
        let server = MockServer::start().await;
        let user = Uuid::new_v4();
        let base = Utc::now();

        Mock::given(method("GET"))
            .and(path("/rest/v1/notifications"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(user, base, 0, 5)))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/notifications"))
            .and(query_param("read_at", "is.null"))
            .and(query_param("user_id", format!("eq.{}", user)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let store = NotificationStore::new(repo(&server), user, 20);
        store.load_page(true).await.unwrap();
        assert_eq!(store.unread_count(), 5);

        store.mark_all_as_read().await.unwrap();
        assert_eq!(store.unread_count(), 0);
        assert!(store.notifications().iter().all(|n| n.read_at.is_some()));

        // A brand-new notification arrives over the realtime channel.
        let fresh: newsroom_sync::models::Notification =
            serde_json::from_value(row(user, base + Duration::minutes(1), false)).unwrap();
        store.ingest_realtime_insert(fresh.clone());

        assert_eq!(store.unread_count(), 1);
        assert_eq!(store.len(), 6);
        assert_eq!(store.notifications()[0].id, fresh.id);
    }

    #[tokio::test]
    async fn test_failed_bulk_update_forces_resync() {
        let server = MockServer::start().await;
        let user = Uuid::new_v4();
        let base = Utc::now();

        Mock::given(method("GET"))
            .and(path("/rest/v1/notifications"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(user, base, 0, 3)))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/notifications"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let store = NotificationStore::new(repo(&server), user, 20);
        store.load_page(true).await.unwrap();

        assert!(store.mark_all_as_read().await.is_err());

        // The resync reload restored the server's view: rows unread
        // again (equal updated_at ties resolve to the incoming row).
        assert_eq!(store.unread_count(), 3);
        assert!(store.notifications().iter().all(|n| n.read_at.is_none()));
    }
}

mod repository_tests {
    use super::*;

    #[tokio::test]
    async fn test_count_unread_reads_content_range() {
        let server = MockServer::start().await;
        let user = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/rest/v1/notifications"))
            .and(query_param("read_at", "is.null"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-range", "0-0/42")
                    .set_body_json(json!([])),
            )
            .mount(&server)
            .await;

        assert_eq!(repo(&server).count_unread(user).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_insert_returns_representation() {
        let server = MockServer::start().await;
        let user = Uuid::new_v4();
        let created = row(user, Utc::now(), false);

        Mock::given(method("POST"))
            .and(path("/rest/v1/notifications"))
            .and(body_partial_json(json!({
                "type": "system",
                "title": "Maintenance tonight",
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([created])))
            .expect(1)
            .mount(&server)
            .await;

        let inserted = repo(&server)
            .insert(&NewNotification {
                user_id: user,
                r#type: NotificationType::System,
                title: "Maintenance tonight".into(),
                message: None,
                data: serde_json::Map::new(),
            })
            .await
            .unwrap();
        assert_eq!(inserted.user_id, user);
    }
}

mod preferences_tests {
    use super::*;

    fn prefs_repo(server: &MockServer) -> PreferencesRepository {
        PreferencesRepository::new(RestClient::new(&server.uri(), "test-key").unwrap())
    }

    #[tokio::test]
    async fn test_missing_row_yields_complete_defaults() {
        let server = MockServer::start().await;
        let user = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/rest/v1/notification_preferences"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let prefs = prefs_repo(&server).load(user).await.unwrap();
        assert_eq!(prefs.user_id, user);
        assert!(prefs.in_app_enabled);
        assert!(!prefs.push_enabled);
        assert!(prefs.type_enabled(NotificationType::CommentNew));
    }

    #[tokio::test]
    async fn test_sparse_row_merges_over_defaults() {
        let server = MockServer::start().await;
        let user = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/rest/v1/notification_preferences"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "user_id": user, "push_enabled": true, "quiet_hours_enabled": true }
            ])))
            .mount(&server)
            .await;

        let prefs = prefs_repo(&server).load(user).await.unwrap();
        assert!(prefs.push_enabled);
        assert!(prefs.quiet_hours_enabled);
        assert_eq!(prefs.quiet_hours_start, "22:00");
        assert_eq!(prefs.quiet_hours_end, "08:00");
    }

    #[tokio::test]
    async fn test_save_sends_only_patched_fields() {
        let server = MockServer::start().await;
        let user = Uuid::new_v4();

        Mock::given(method("POST"))
            .and(path("/rest/v1/notification_preferences"))
            .and(query_param("on_conflict", "user_id"))
            .and(body_partial_json(json!({
                "user_id": user,
                "quiet_hours_enabled": true,
                "quiet_hours_start": "23:00",
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([
                { "user_id": user, "quiet_hours_enabled": true, "quiet_hours_start": "23:00" }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let patch = newsroom_sync::models::PreferencesPatch {
            quiet_hours_enabled: Some(true),
            quiet_hours_start: Some("23:00".into()),
            ..Default::default()
        };
        let saved = prefs_repo(&server).save(user, &patch).await.unwrap();
        assert!(saved.quiet_hours_enabled);
        assert_eq!(saved.quiet_hours_start, "23:00");
        // Untouched fields come back as defaults, not as nulls.
        assert!(saved.in_app_enabled);
    }
}
