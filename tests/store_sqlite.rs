// tests/store_sqlite.rs
use chrono::{TimeZone, Utc};
use finance_news_ingest::{NewsItem, NewsStore, SqliteNewsStore};

fn item(id: &str) -> NewsItem {
    NewsItem {
        id: id.to_string(),
        title: "央行宣布降准".to_string(),
        summary: "释放长期资金".to_string(),
        content: "中国人民银行宣布下调存款准备金率。".to_string(),
        source: "雪球".to_string(),
        url: format!("https://xueqiu.com/1/{id}"),
        publish_date: Utc.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap(),
        image_url: Some("https://example.com/a.png".to_string()),
        category: "宏观".to_string(),
        tags: vec!["宏观".to_string(), "货币政策".to_string()],
    }
}

async fn temp_store() -> (tempfile::TempDir, SqliteNewsStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite:{}/news.db", dir.path().display());
    let store = SqliteNewsStore::connect(&url).await.expect("connect");
    (dir, store)
}

#[tokio::test]
async fn committed_rows_read_back_identically() {
    let (_dir, store) = temp_store().await;

    let mut tx = store.begin().await.unwrap();
    assert!(!tx.exists("a").await.unwrap());
    tx.insert(&item("a")).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(store.count().await.unwrap(), 1);
    let rows = store.recent(10).await.unwrap();
    assert_eq!(rows, vec![item("a")]);
}

#[tokio::test]
async fn rollback_leaves_no_rows_behind() {
    let (_dir, store) = temp_store().await;

    let mut tx = store.begin().await.unwrap();
    tx.insert(&item("a")).await.unwrap();
    tx.insert(&item("b")).await.unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn existence_check_sees_previously_committed_rows() {
    let (_dir, store) = temp_store().await;

    let mut tx = store.begin().await.unwrap();
    tx.insert(&item("a")).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    assert!(tx.exists("a").await.unwrap());
    assert!(!tx.exists("b").await.unwrap());
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn primary_key_blocks_a_second_insert_of_the_same_id() {
    let (_dir, store) = temp_store().await;

    let mut tx = store.begin().await.unwrap();
    tx.insert(&item("a")).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    assert!(tx.insert(&item("a")).await.is_err());
    tx.rollback().await.unwrap();
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn in_memory_url_is_supported() {
    let store = SqliteNewsStore::connect("sqlite::memory:").await.unwrap();
    let mut tx = store.begin().await.unwrap();
    tx.insert(&item("a")).await.unwrap();
    tx.commit().await.unwrap();
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn recent_orders_newest_first() {
    let (_dir, store) = temp_store().await;

    let mut older = item("old");
    older.publish_date = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
    let newer = item("new");

    let mut tx = store.begin().await.unwrap();
    tx.insert(&older).await.unwrap();
    tx.insert(&newer).await.unwrap();
    tx.commit().await.unwrap();

    let rows = store.recent(10).await.unwrap();
    assert_eq!(rows[0].id, "new");
    assert_eq!(rows[1].id, "old");
}
