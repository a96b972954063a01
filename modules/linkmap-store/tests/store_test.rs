//! Integration tests for the store gateway.
//! Requires a Postgres instance with the pgvector extension. Set
//! DATABASE_TEST_URL or these tests are skipped.

use linkmap_common::{LinkStatus, ProbeEventStatus, UrlKind, EMBEDDING_DIM};
use linkmap_store::{LinkFields, LinkStore};
use uuid::Uuid;

/// Get a migrated test store, or skip if no test DB is available.
async fn test_store() -> Option<LinkStore> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let store = LinkStore::connect(&url).await.ok()?;
    store.migrate().await.ok()?;
    Some(store)
}

/// Each test works under its own user so tests can run in parallel
/// against a shared database.
async fn test_user(store: &LinkStore) -> i64 {
    let chat_id = format!("test-{}", Uuid::new_v4());
    store.upsert_user(&chat_id, "tester").await.unwrap().id
}

/// A unit-norm embedding whose cosine similarity against `unit_x()` is
/// exactly `sim`.
fn vector_with_similarity(sim: f32) -> pgvector::Vector {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[0] = sim;
    v[1] = (1.0 - sim * sim).sqrt();
    pgvector::Vector::from(v)
}

fn unit_x() -> pgvector::Vector {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[0] = 1.0;
    pgvector::Vector::from(v)
}

// =========================================================================
// Links
// =========================================================================

#[tokio::test]
async fn upsert_link_is_idempotent_by_user_and_url() {
    let Some(store) = test_store().await else { return };
    let user = test_user(&store).await;

    let (id1, existing1) = store.upsert_link(user, "https://example.com/a").await.unwrap();
    assert!(!existing1);

    store
        .set_link_status(id1, LinkStatus::Error, Some("boom"))
        .await
        .unwrap();

    let (id2, existing2) = store.upsert_link(user, "https://example.com/a").await.unwrap();
    assert_eq!(id1, id2);
    assert!(existing2);

    // Re-submission resets status and clears the error.
    let link = store.get_link(id1).await.unwrap().unwrap();
    assert_eq!(link.status, "pending");
    assert!(link.error.is_none());

    let n = store
        .count_links_by_url(user, "https://example.com/a")
        .await
        .unwrap();
    assert_eq!(n, 1);
}

#[tokio::test]
async fn update_fields_roundtrip() {
    let Some(store) = test_store().await else { return };
    let user = test_user(&store).await;
    let (id, _) = store.upsert_link(user, "https://example.com/b").await.unwrap();

    store
        .update_link_fields(
            id,
            LinkFields {
                title: Some("Title".into()),
                markdown: Some("# Body".into()),
                summary: Some("a summary".into()),
                tags: Some(vec!["one".into(), "two".into()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let link = store.get_link(id).await.unwrap().unwrap();
    assert_eq!(link.title.as_deref(), Some("Title"));
    assert_eq!(link.markdown.as_deref(), Some("# Body"));
    assert_eq!(link.tag_list(), vec!["one".to_string(), "two".to_string()]);

    let by_url = store
        .get_link_by_url(user, "https://example.com/b")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_url.id, id);
}

#[tokio::test]
async fn analyzed_links_carry_summary_tags_and_vector() {
    let Some(store) = test_store().await else { return };
    let user = test_user(&store).await;
    let (id, _) = store.upsert_link(user, "https://example.com/full").await.unwrap();

    store
        .update_link_fields(
            id,
            LinkFields {
                summary: Some("s".into()),
                tags: Some(vec!["t".into()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    store.set_summary_vector(id, unit_x()).await.unwrap();
    store.set_link_status(id, LinkStatus::Analyzed, None).await.unwrap();

    let link = store.get_link(id).await.unwrap().unwrap();
    assert_eq!(link.status, "analyzed");
    assert!(link.summary.is_some());
    assert!(!link.tag_list().is_empty());
    assert!(link.summary_vector.is_some());
}

#[tokio::test]
async fn list_views_are_scoped_and_ordered() {
    let Some(store) = test_store().await else { return };
    let user = test_user(&store).await;

    let mut ids = Vec::new();
    for i in 0..4 {
        let (id, _) = store
            .upsert_link(user, &format!("https://example.com/list-{i}"))
            .await
            .unwrap();
        ids.push(id);
    }
    store.set_link_status(ids[0], LinkStatus::Analyzed, None).await.unwrap();
    store
        .set_link_status(ids[1], LinkStatus::Error, Some("boom"))
        .await
        .unwrap();

    let recent = store.list_recent(user, 10).await.unwrap();
    assert_eq!(recent.len(), 4);
    // Newest first.
    assert_eq!(recent[0].id, ids[3]);

    let page = store.list_paginated(user, 2, 2).await.unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].id, ids[1]);

    let analyzed = store.list_analyzed(user).await.unwrap();
    assert_eq!(analyzed.iter().map(|l| l.id).collect::<Vec<_>>(), vec![ids[0]]);

    let failed = store.list_failed(user).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, ids[1]);
    assert_eq!(failed[0].error.as_deref(), Some("boom"));

    // Another user sees none of it.
    let other = test_user(&store).await;
    assert!(store.list_recent(other, 10).await.unwrap().is_empty());
}

// =========================================================================
// Relations
// =========================================================================

#[tokio::test]
async fn relations_store_one_edge_per_unordered_pair() {
    let Some(store) = test_store().await else { return };
    let user = test_user(&store).await;
    let (a, _) = store.upsert_link(user, "https://example.com/ra").await.unwrap();
    let (b, _) = store.upsert_link(user, "https://example.com/rb").await.unwrap();

    store.save_relations(a, &[(b, 0.80)]).await.unwrap();
    // B's run rediscovers A; the existing edge is refreshed, not mirrored.
    store.save_relations(b, &[(a, 0.80)]).await.unwrap();

    let edge_count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM link_relations \
         WHERE (link_id = $1 AND related_id = $2) OR (link_id = $2 AND related_id = $1)",
    )
    .bind(a)
    .bind(b)
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_eq!(edge_count, 1);

    // Symmetric view from both endpoints.
    assert_eq!(store.get_relations(a).await.unwrap(), vec![(b, 0.80)]);
    assert_eq!(store.get_relations(b).await.unwrap(), vec![(a, 0.80)]);
}

#[tokio::test]
async fn get_relations_orders_by_score_and_caps_at_five() {
    let Some(store) = test_store().await else { return };
    let user = test_user(&store).await;
    let (hub, _) = store.upsert_link(user, "https://example.com/hub").await.unwrap();

    let mut pairs = Vec::new();
    for i in 0..6 {
        let (id, _) = store
            .upsert_link(user, &format!("https://example.com/spoke-{i}"))
            .await
            .unwrap();
        pairs.push((id, 0.70 + 0.01 * i as f64));
    }
    // save_relations receives already-truncated pairs; store extras as
    // incoming edges to exercise the read-side cap.
    store.save_relations(hub, &pairs[..3]).await.unwrap();
    for (id, score) in &pairs[3..] {
        store.save_relations(*id, &[(hub, *score)]).await.unwrap();
    }

    let relations = store.get_relations(hub).await.unwrap();
    assert_eq!(relations.len(), 5);
    // Best first.
    for window in relations.windows(2) {
        assert!(window[0].1 >= window[1].1);
    }
    // The weakest of the six is the one dropped.
    assert!(!relations.iter().any(|(id, _)| *id == pairs[0].0));
}

#[tokio::test]
async fn save_relations_replaces_outgoing_set() {
    let Some(store) = test_store().await else { return };
    let user = test_user(&store).await;
    let (a, _) = store.upsert_link(user, "https://example.com/sa").await.unwrap();
    let (b, _) = store.upsert_link(user, "https://example.com/sb").await.unwrap();
    let (c, _) = store.upsert_link(user, "https://example.com/sc").await.unwrap();

    store.save_relations(a, &[(b, 0.9)]).await.unwrap();
    store.save_relations(a, &[(c, 0.7)]).await.unwrap();

    let relations = store.get_relations(a).await.unwrap();
    assert_eq!(relations, vec![(c, 0.7)]);

    let link = store.get_link(a).await.unwrap().unwrap();
    assert_eq!(link.related_id_list(), vec![c]);
}

#[tokio::test]
async fn deleting_a_link_cascades_relations_and_scrubs_caches() {
    let Some(store) = test_store().await else { return };
    let user = test_user(&store).await;
    let (a, _) = store.upsert_link(user, "https://example.com/da").await.unwrap();
    let (b, _) = store.upsert_link(user, "https://example.com/db").await.unwrap();
    let (c, _) = store.upsert_link(user, "https://example.com/dc").await.unwrap();

    store.save_relations(a, &[(b, 0.8), (c, 0.7)]).await.unwrap();
    store.save_relations(b, &[(a, 0.8)]).await.unwrap();
    store.save_relations(c, &[(a, 0.7)]).await.unwrap();

    let scrubbed = store.remove_link_from_relations(a).await.unwrap();
    assert_eq!(scrubbed, 2); // b and c both cached a reference to a

    assert!(store.delete_link(a).await.unwrap());

    let remaining = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM link_relations WHERE link_id = $1 OR related_id = $1",
    )
    .bind(a)
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_eq!(remaining, 0);

    assert!(store.get_relations(b).await.unwrap().is_empty());
    assert!(store.get_relations(c).await.unwrap().is_empty());
    assert!(store.get_link(b).await.unwrap().unwrap().related_id_list().is_empty());
}

// =========================================================================
// Vector + text search
// =========================================================================

#[tokio::test]
async fn vector_search_with_no_candidates_returns_empty() {
    let Some(store) = test_store().await else { return };
    let user = test_user(&store).await;
    let (id, _) = store.upsert_link(user, "https://example.com/lonely").await.unwrap();

    let hits = store.vector_search(&unit_x(), user, id, 10).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn vector_search_scores_and_orders_by_distance() {
    let Some(store) = test_store().await else { return };
    let user = test_user(&store).await;

    let (query_link, _) = store.upsert_link(user, "https://example.com/q").await.unwrap();
    store.set_summary_vector(query_link, unit_x()).await.unwrap();

    let (near, _) = store.upsert_link(user, "https://example.com/near").await.unwrap();
    store
        .set_summary_vector(near, vector_with_similarity(0.75))
        .await
        .unwrap();

    let (far, _) = store.upsert_link(user, "https://example.com/far").await.unwrap();
    store
        .set_summary_vector(far, vector_with_similarity(0.2))
        .await
        .unwrap();

    let hits = store.vector_search(&unit_x(), user, query_link, 10).await.unwrap();
    assert_eq!(hits.len(), 2);
    // Excludes the query link itself; nearest first.
    assert_eq!(hits[0].0, near);
    assert_eq!(hits[1].0, far);
    // cosine distance 0.25 → 1 / 1.25 = 0.80
    assert_eq!(hits[0].1, 0.80);

    // Scoped per user: another user sees nothing.
    let other = test_user(&store).await;
    let hits = store.vector_search(&unit_x(), other, 0, 10).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn text_search_ranks_matching_links() {
    let Some(store) = test_store().await else { return };
    let user = test_user(&store).await;

    let (a, _) = store.upsert_link(user, "https://example.com/t1").await.unwrap();
    store
        .update_link_fields(
            a,
            LinkFields {
                title: Some("Rust async runtimes compared".into()),
                summary: Some("A survey of executor design".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let (b, _) = store.upsert_link(user, "https://example.com/t2").await.unwrap();
    store
        .update_link_fields(
            b,
            LinkFields {
                title: Some("Sourdough starters".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let hits = store.text_search("async runtimes", user, 10).await.unwrap();
    assert_eq!(hits, vec![a]);
}

// =========================================================================
// Probe events + devices
// =========================================================================

#[tokio::test]
async fn probe_event_lifecycle() {
    let Some(store) = test_store().await else { return };
    let user = test_user(&store).await;
    let (link, _) = store.upsert_link(user, "https://x.com/u/status/1").await.unwrap();

    let event = store
        .create_probe_event(user, link, "https://x.com/u/status/1", UrlKind::Twitter)
        .await
        .unwrap();
    assert_eq!(event.status, "pending");

    let pending = store.list_pending_probe_events(user).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, event.id);

    store.mark_probe_event_sent(event.id).await.unwrap();
    assert!(store.list_pending_probe_events(user).await.unwrap().is_empty());

    let payload = serde_json::json!({"markdown": "text"});
    let first = store
        .complete_probe_event(event.id, ProbeEventStatus::Completed, Some(&payload), None)
        .await
        .unwrap();
    assert!(first);

    // Duplicate delivery is absorbed: the first terminal transition wins.
    let second = store
        .complete_probe_event(event.id, ProbeEventStatus::Error, None, Some("late"))
        .await
        .unwrap();
    assert!(!second);

    let stored = store.get_probe_event(event.id).await.unwrap().unwrap();
    assert_eq!(stored.status, "completed");
    assert!(stored.result.is_some());
    assert!(stored.completed_at.is_some());
}

#[tokio::test]
async fn expired_probe_events_are_listed() {
    let Some(store) = test_store().await else { return };
    let user = test_user(&store).await;
    let (link, _) = store.upsert_link(user, "https://x.com/u/status/2").await.unwrap();

    let event = store
        .create_probe_event(user, link, "https://x.com/u/status/2", UrlKind::Twitter)
        .await
        .unwrap();

    let future = chrono::Utc::now() + chrono::Duration::hours(1);
    let expired = store.list_expired_probe_events(future).await.unwrap();
    assert!(expired.iter().any(|e| e.id == event.id));

    let past = chrono::Utc::now() - chrono::Duration::hours(1);
    let expired = store.list_expired_probe_events(past).await.unwrap();
    assert!(!expired.iter().any(|e| e.id == event.id));
}

#[tokio::test]
async fn probe_device_token_lookup_and_touch() {
    let Some(store) = test_store().await else { return };
    let user = test_user(&store).await;

    let token = format!("lmp_{}", Uuid::new_v4().simple());
    let device = store.create_probe_device(user, &token, "laptop").await.unwrap();
    assert!(device.last_seen_at.is_none());

    let found = store.get_probe_device_by_token(&token).await.unwrap().unwrap();
    assert_eq!(found.id, device.id);
    assert_eq!(found.user_id, user);

    store.touch_probe_device(device.id).await.unwrap();
    let touched = store.get_probe_device_by_token(&token).await.unwrap().unwrap();
    assert!(touched.last_seen_at.is_some());

    assert!(store
        .get_probe_device_by_token("lmp_unknown")
        .await
        .unwrap()
        .is_none());
}

// =========================================================================
// Device auth
// =========================================================================

#[tokio::test]
async fn device_auth_authorize_flow() {
    let Some(store) = test_store().await else { return };
    let user = test_user(&store).await;

    let device_code = Uuid::new_v4().simple().to_string();
    let user_code = format!("AAAA-{}", &Uuid::new_v4().simple().to_string()[..4].to_uppercase());
    let expires = chrono::Utc::now() + chrono::Duration::minutes(15);

    store
        .create_device_auth(&device_code, &user_code, expires)
        .await
        .unwrap();

    let by_code = store
        .get_device_auth_by_user_code(&user_code)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_code.status, "pending");

    assert!(store.authorize_device_auth(&device_code, user).await.unwrap());
    // Already authorized: a second authorize is a no-op.
    assert!(!store.authorize_device_auth(&device_code, user).await.unwrap());

    let row = store.get_device_auth(&device_code).await.unwrap().unwrap();
    assert_eq!(row.status, "authorized");
    assert_eq!(row.user_id, Some(user));

    store.delete_device_auth(&device_code).await.unwrap();
    assert!(store.get_device_auth(&device_code).await.unwrap().is_none());
}

#[tokio::test]
async fn expired_device_auth_cannot_be_authorized() {
    let Some(store) = test_store().await else { return };
    let user = test_user(&store).await;

    let device_code = Uuid::new_v4().simple().to_string();
    let user_code = format!("BBBB-{}", &Uuid::new_v4().simple().to_string()[..4].to_uppercase());
    let expires = chrono::Utc::now() - chrono::Duration::minutes(1);

    store
        .create_device_auth(&device_code, &user_code, expires)
        .await
        .unwrap();

    assert!(!store.authorize_device_auth(&device_code, user).await.unwrap());
}
