//! SQLite-backed ledger, SQL-file definitions and pragma foreign-key inspection

use std::fs;
use std::sync::Arc;

use smart_migrations::{
    Database, LedgerSchema, LedgerStore, MigrationRecord, RollbackOptions, SchemaCatalog,
    SmartMigrations, SqlLedgerStore,
};

async fn setup_database() -> Arc<Database> {
    let db = Database::connect("sqlite::memory:").await.unwrap();

    for statement in [
        "CREATE TABLE migrations (migration TEXT PRIMARY KEY, batch INTEGER NOT NULL)",
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        "CREATE TABLE posts (id INTEGER PRIMARY KEY, \
         user_id INTEGER NOT NULL REFERENCES users(id), title TEXT)",
    ] {
        sqlx::query(statement).execute(db.pool()).await.unwrap();
    }

    for (identifier, batch) in [
        ("2024_01_01_000001_create_users_table", 1_i64),
        ("2024_01_02_000001_create_posts_table", 2_i64),
    ] {
        sqlx::query("INSERT INTO migrations (migration, batch) VALUES (?, ?)")
            .bind(identifier.to_string())
            .bind(batch)
            .execute(db.pool())
            .await
            .unwrap();
    }

    Arc::new(db)
}

fn write_migrations(dir: &std::path::Path) {
    fs::write(
        dir.join("2024_01_01_000001_create_users_table.sql"),
        "-- Migration: create users table\n\
         -- Up migration\n\
         CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL);\n\n\
         -- Down migration\n\
         DROP TABLE users;\n",
    )
    .unwrap();
    fs::write(
        dir.join("2024_01_02_000001_create_posts_table.sql"),
        "-- Up migration\n\
         CREATE TABLE posts (id INTEGER PRIMARY KEY, \
         user_id INTEGER NOT NULL REFERENCES users(id), title TEXT);\n\n\
         -- Down migration\n\
         DROP TABLE posts;\n",
    )
    .unwrap();
}

async fn table_exists(db: &Database, table: &str) -> bool {
    let rows = db
        .fetch_rows(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
            &[table.to_string()],
        )
        .await
        .unwrap();
    !rows.is_empty()
}

#[tokio::test]
async fn sql_store_reads_in_ledger_order() {
    let db = setup_database().await;
    let store = SqlLedgerStore::new(db.clone(), LedgerSchema::default());

    assert_eq!(
        store.all_records().await.unwrap(),
        vec![
            MigrationRecord::new("2024_01_01_000001_create_users_table", 1),
            MigrationRecord::new("2024_01_02_000001_create_posts_table", 2),
        ]
    );
    assert_eq!(store.max_batch().await.unwrap(), 2);
    assert_eq!(store.records_in_batch(1).await.unwrap().len(), 1);
    assert!(store.contains("2024_01_02_000001_create_posts_table").await.unwrap());

    assert!(store.delete("2024_01_02_000001_create_posts_table").await.unwrap());
    assert!(!store.delete("2024_01_02_000001_create_posts_table").await.unwrap());
    assert_eq!(store.max_batch().await.unwrap(), 1);
}

#[tokio::test]
async fn foreign_keys_are_reported_in_both_directions() {
    let db = setup_database().await;
    let engine = SmartMigrations::builder()
        .database(db.clone(), LedgerSchema::default())
        .build()
        .unwrap();

    let users = engine.dependencies("users").await;
    assert!(users.outgoing.is_empty());
    assert_eq!(users.incoming.len(), 1);
    assert_eq!(users.incoming[0].source_table, "posts");
    assert_eq!(users.incoming[0].source_column, "user_id");
    assert_eq!(users.warnings().len(), 1);

    let posts = engine.dependencies("posts").await;
    assert_eq!(posts.outgoing.len(), 1);
    assert_eq!(posts.outgoing[0].target_table, "users");
    assert_eq!(posts.outgoing[0].target_column.as_deref(), Some("id"));
}

#[tokio::test]
async fn rollback_runs_down_sql_and_prunes_ledger() {
    let db = setup_database().await;
    let dir = tempfile::tempdir().unwrap();
    write_migrations(dir.path());

    let engine = SmartMigrations::builder()
        .database(db.clone(), LedgerSchema::default())
        .migration_path(dir.path())
        .build()
        .unwrap();

    let plan = engine
        .plan_table_rollback("users", &RollbackOptions::new())
        .await
        .unwrap();
    assert_eq!(
        plan.selection,
        vec![MigrationRecord::new("2024_01_01_000001_create_users_table", 1)]
    );
    assert_eq!(plan.warnings().len(), 1);

    let results = engine
        .rollback_by_table("posts", &RollbackOptions::latest())
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].success, "{:?}", results[0].error);

    assert!(!table_exists(&db, "posts").await);
    assert!(table_exists(&db, "users").await);
    assert_eq!(engine.executed_batches().await.unwrap(), vec![1]);
}
