//! Tests for database initialization

use nas_common::db::init::init_database;
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("ledger.db");

    let result = init_database(&db_path, 4).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("ledger.db");

    let pool1 = init_database(&db_path, 2).await.unwrap();
    sqlx::query("CREATE TABLE marker (id INTEGER PRIMARY KEY)")
        .execute(&pool1)
        .await
        .unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path, 2).await.unwrap();
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'marker'",
    )
    .fetch_one(&pool2)
    .await
    .unwrap();
    assert_eq!(count, 1, "Existing schema should survive reopen");
}

#[tokio::test]
async fn test_wal_mode_enabled() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("ledger.db");

    let pool = init_database(&db_path, 1).await.unwrap();
    let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
}
