use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};
use contentflow::db::{self, SqliteKv};
use contentflow::filter::{filter, HistoryQuery, PlatformFilter, StatusFilter};
use contentflow::history::HistoryStore;
use contentflow::kv::{KvStore, MemoryKv, HISTORY_KEY};
use contentflow::model::{
    BatchStatus, ContentBatch, Platform, PlatformSet, PostingOutcome, PostingStatus, Script,
    Scripts, TrendInsights,
};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts writes and can be told to fail them.
#[derive(Default)]
struct FlakyKv {
    inner: MemoryKv,
    writes: AtomicUsize,
    fail_writes: bool,
}

#[async_trait::async_trait]
impl KvStore for FlakyKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(anyhow!("disk full"));
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await
    }
}

fn platforms(list: &[Platform]) -> PlatformSet {
    list.iter().copied().collect()
}

fn batch(topic: &str, list: &[Platform], day: u32) -> ContentBatch {
    let scripts: Scripts = list
        .iter()
        .map(|p| {
            (
                *p,
                Script {
                    hashtags: vec!["#tag".into()],
                    format: "post".into(),
                    ..Script::new(format!("{topic} on {p}"))
                },
            )
        })
        .collect();
    let insights = TrendInsights {
        summary: format!("{topic} is rising"),
        trends: Vec::new(),
    };
    ContentBatch::new(topic, platforms(list), Some(insights), scripts)
        .with_created_at(Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap())
}

fn outcome(platform: &str, status: PostingStatus) -> PostingOutcome {
    PostingOutcome {
        platform: platform.into(),
        status,
        message: String::new(),
        post_url: None,
    }
}

#[tokio::test]
async fn history_survives_reopening_sqlite_file() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}/history.db", dir.path().display());

    let kv: Arc<dyn KvStore> = Arc::new(SqliteKv::connect(&url).await.unwrap());
    let store = HistoryStore::load(kv).await;
    store.append(batch("first", &[Platform::Twitter], 1)).await;
    store
        .append(batch("second", &[Platform::LinkedIn, Platform::TikTok], 2))
        .await;
    let first_id = store.all().await[1].id().clone();
    store
        .update_by_id(&first_id, |b| {
            b.record_posting(
                vec![outcome("Twitter", PostingStatus::Posted)],
                "done".into(),
            );
            true
        })
        .await
        .unwrap();
    let expected = store.all().await;

    let pool = db::init_pool(&url).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    let reopened = HistoryStore::load(Arc::new(SqliteKv::new(pool))).await;
    let loaded = reopened.all().await;

    assert_eq!(loaded, expected);
    assert_eq!(loaded[0].topic(), "second");
    assert_eq!(loaded[0].status(), BatchStatus::Draft);
    assert_eq!(loaded[1].status(), BatchStatus::Posted);
}

#[tokio::test]
async fn stored_document_uses_dashboard_field_names() {
    let kv = Arc::new(MemoryKv::new());
    let shared: Arc<dyn KvStore> = kv.clone();
    let store = HistoryStore::load(shared).await;
    store.append(batch("shape", &[Platform::YouTube], 5)).await;

    let raw = kv.get(HISTORY_KEY).await.unwrap().unwrap();
    let doc: Value = serde_json::from_str(&raw).unwrap();
    let entry = &doc[0];
    assert!(entry["id"].is_string());
    assert!(entry["timestamp"].as_str().unwrap().starts_with("2024-03-05T12:00:00"));
    assert_eq!(entry["topic"], "shape");
    assert_eq!(entry["platforms"][0], "YouTube");
    assert_eq!(entry["trendSummary"]["summary"], "shape is rising");
    assert_eq!(entry["scripts"]["youtube"]["content"], "shape on YouTube");
    assert_eq!(entry["status"], "draft");
}

#[tokio::test]
async fn stored_status_is_rederived_on_load() {
    let kv = Arc::new(MemoryKv::new());
    let doc = serde_json::json!([{
        "id": "abc",
        "timestamp": "2024-03-01T10:00:00Z",
        "topic": "tampered",
        "platforms": ["Twitter"],
        "trendSummary": null,
        "scripts": { "twitter": { "content": "hi" } },
        "postingResults": [{ "platform": "Twitter", "status": "ready" }],
        "postingSummary": "",
        "status": "posted"
    }]);
    kv.set(HISTORY_KEY, &doc.to_string()).await.unwrap();

    let store = HistoryStore::load(kv).await;
    let entries = store.all().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status(), BatchStatus::Scheduled);
    assert_eq!(entries[0].scripts().content(Platform::Twitter), "hi");
}

#[tokio::test]
async fn one_bad_entry_does_not_wipe_history() {
    let kv = Arc::new(MemoryKv::new());
    let doc = serde_json::json!([
        {
            "id": "good",
            "timestamp": "2024-03-02T10:00:00Z",
            "topic": "keeps working",
            "platforms": ["Twitter", "LinkedIn"],
            "trendSummary": {
                "summary": "rising",
                "trends": [{ "topic": "t", "platforms": ["X", "Twitter"] }]
            },
            "scripts": {
                "twitter": { "content": "tweet", "character_count": 5 },
                "youtube": { "content": "not requested" }
            },
            "postingResults": [{ "platform": "Twitter", "message": "no status" }],
            "postingSummary": "partial"
        },
        {
            "id": "no-platforms",
            "timestamp": "2024-03-01T10:00:00Z",
            "topic": "dropped",
            "platforms": []
        },
        {
            "id": "broken",
            "timestamp": "yesterday",
            "topic": "dropped",
            "platforms": ["Twitter"]
        }
    ]);
    kv.set(HISTORY_KEY, &doc.to_string()).await.unwrap();

    let shared: Arc<dyn KvStore> = kv.clone();
    let store = HistoryStore::load(shared).await;
    let entries = store.all().await;
    assert_eq!(entries.len(), 1);
    let good = &entries[0];
    assert_eq!(good.id().as_str(), "good");
    assert_eq!(good.status(), BatchStatus::Scheduled);
    assert_eq!(good.posting_outcomes().unwrap()[0].status, PostingStatus::Unknown);
    assert_eq!(good.trend_insights().unwrap().trends[0].platforms, vec![Platform::Twitter]);
    assert_eq!(good.scripts().len(), 1);
    assert_eq!(good.scripts().get(Platform::Twitter).unwrap().character_count, 5);

    store.append(batch("fresh", &[Platform::TikTok], 3)).await;

    let raw = kv.get(HISTORY_KEY).await.unwrap().unwrap();
    let stored: Vec<Value> = serde_json::from_str(&raw).unwrap();
    let ids: Vec<_> = stored.iter().map(|e| e["id"].as_str().unwrap()).collect();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[1], "good");
    assert_eq!(stored[1]["scripts"]["twitter"]["character_count"], 5);
}

#[tokio::test]
async fn write_failures_keep_memory_state() {
    let kv = Arc::new(FlakyKv {
        fail_writes: true,
        ..Default::default()
    });
    let shared: Arc<dyn KvStore> = kv.clone();
    let store = HistoryStore::load(shared).await;

    store.append(batch("kept", &[Platform::Twitter], 1)).await;
    let id = store.all().await[0].id().clone();
    assert!(store.remove_by_id(&id).await);
    store.append(batch("again", &[Platform::Twitter], 2)).await;

    assert_eq!(store.len().await, 1);
    assert_eq!(kv.writes.load(Ordering::SeqCst), 3);
    assert!(kv.get(HISTORY_KEY).await.unwrap().is_none());
}

#[tokio::test]
async fn unchanged_updates_and_unknown_removals_skip_writes() {
    let kv = Arc::new(FlakyKv::default());
    let shared: Arc<dyn KvStore> = kv.clone();
    let store = HistoryStore::load(shared).await;
    store.append(batch("a", &[Platform::Twitter], 1)).await;
    let id = store.all().await[0].id().clone();
    assert_eq!(kv.writes.load(Ordering::SeqCst), 1);

    let same = store
        .update_by_id(&id, |b| b.set_script_content(Platform::Twitter, "a on Twitter"))
        .await;
    assert!(same.is_some());
    assert!(!store.remove_by_id(&"unknown".into()).await);
    assert_eq!(kv.writes.load(Ordering::SeqCst), 1);

    store
        .update_by_id(&id, |b| b.set_script_content(Platform::Twitter, "changed"))
        .await;
    assert_eq!(kv.writes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn filter_over_loaded_history_keeps_order() {
    let store = HistoryStore::load(Arc::new(MemoryKv::new())).await;
    store.append(batch("one", &[Platform::Twitter], 1)).await;
    store
        .append(batch("two", &[Platform::Twitter, Platform::Facebook], 10))
        .await;
    store.append(batch("three", &[Platform::Facebook], 20)).await;
    let two = store.all().await[1].id().clone();
    store
        .update_by_id(&two, |b| {
            b.record_posting(vec![outcome("Facebook", PostingStatus::Ready)], String::new());
            true
        })
        .await;
    let entries = store.all().await;

    let everything = filter(&entries, &HistoryQuery::default());
    assert_eq!(everything.len(), 3);
    assert!(everything.iter().zip(&entries).all(|(a, b)| *a == b));

    let facebook = HistoryQuery {
        platform: PlatformFilter::Only(Platform::Facebook),
        ..Default::default()
    };
    let topics: Vec<_> = filter(&entries, &facebook).iter().map(|b| b.topic()).collect();
    assert_eq!(topics, vec!["three", "two"]);

    let scheduled_in_range = HistoryQuery {
        status: StatusFilter::Only(BatchStatus::Scheduled),
        date_from: Some(chrono::NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()),
        date_to: Some(chrono::NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()),
        ..Default::default()
    };
    let topics: Vec<_> = filter(&entries, &scheduled_in_range)
        .iter()
        .map(|b| b.topic())
        .collect();
    assert_eq!(topics, vec!["two"]);
}
