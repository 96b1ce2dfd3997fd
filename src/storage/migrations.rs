// src/storage/migrations.rs

//! Versioned schema migrations.

use sqlx::SqlitePool;

use crate::error::Result;

/// Run all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    create_migration_table(pool).await?;
    let current_version = get_schema_version(pool).await?;

    if current_version < 1 {
        log::debug!("Running migration v1");
        apply(pool, 1, MIGRATION_V1).await?;
    }

    if current_version < 2 {
        log::debug!("Running migration v2");
        apply(pool, 2, MIGRATION_V2).await?;
    }

    Ok(())
}

/// Run one migration and record its version in a single transaction.
///
/// The version row is written first so the transaction holds the write lock
/// before it checks whether another instance already applied `version`.
async fn apply(pool: &SqlitePool, version: i64, statements: &[&str]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(&mut *tx)
        .await?;
    let recorded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version WHERE version = ?")
        .bind(version)
        .fetch_one(&mut *tx)
        .await?;
    if recorded > 1 {
        log::debug!("Migration v{} already applied", version);
        tx.rollback().await?;
        return Ok(());
    }

    for statement in statements {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn get_schema_version(pool: &SqlitePool) -> Result<i64> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

/// Collections and posts.
const MIGRATION_V1: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS group_info (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        group_id TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        alt TEXT NOT NULL,
        member_count INTEGER,
        created TEXT,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS doulist_info (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        doulist_id TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        alt TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
    )
    ",
    // Deleting a group must never take its posts with it.
    r"
    CREATE TABLE IF NOT EXISTS group_post (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        post_id INTEGER NOT NULL UNIQUE,
        group_id TEXT NOT NULL REFERENCES group_info(group_id) ON DELETE NO ACTION,
        author_name TEXT,
        author_alt TEXT,
        alt TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        comments TEXT NOT NULL DEFAULT '[]',
        photo_list TEXT NOT NULL DEFAULT '[]',
        is_matched INTEGER NOT NULL DEFAULT 0,
        keyword_list TEXT NOT NULL DEFAULT '[]',
        created TEXT NOT NULL,
        updated TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_group_post_group ON group_post(group_id)",
    r"
    CREATE TABLE IF NOT EXISTS doulist_post (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        post_id INTEGER NOT NULL UNIQUE,
        alt TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        comments TEXT NOT NULL DEFAULT '[]',
        photo_list TEXT NOT NULL DEFAULT '[]',
        created TEXT NOT NULL,
        updated TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
    )
    ",
];

/// Curation fields on group posts.
const MIGRATION_V2: &[&str] = &[
    "ALTER TABLE group_post ADD COLUMN is_collected INTEGER NOT NULL DEFAULT 0",
    "ALTER TABLE group_post ADD COLUMN note TEXT",
];
