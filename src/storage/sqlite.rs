//! SQLite storage implementation.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::error::{AppError, Result};
use crate::models::{
    AuthorInfo, Collection, CollectionKind, DoulistPost, GroupPost, PostDraft, StoredPost,
    UpsertOutcome,
};
use crate::storage::{PostStore, migrations, normalize_collection, normalize_draft};

/// SQLite-backed record store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

/// The two post tables.
#[derive(Debug, Clone, Copy)]
enum PostTable {
    Group,
    Doulist,
}

impl PostTable {
    fn name(self) -> &'static str {
        match self {
            PostTable::Group => "group_post",
            PostTable::Doulist => "doulist_post",
        }
    }
}

impl SqliteStore {
    /// Open (or create) the database file at `path` and run migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Other instances may be writing to the same file.
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Private in-memory database, mostly for tests.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        // A single connection that never expires; a new one would see an empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        migrations::run(&pool).await?;
        log::debug!("Database migrations complete");
        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn upsert(&self, table: PostTable, post: &PostRecord<'_>) -> Result<UpsertOutcome> {
        let draft = &post.draft;
        if let Some(outcome) = self.revise(table, draft).await? {
            return Ok(outcome);
        }
        self.insert_or_revise(table, post).await
    }

    /// Insert path. Losing an insert race to another writer falls back to
    /// revising the row that writer stored.
    async fn insert_or_revise(
        &self,
        table: PostTable,
        post: &PostRecord<'_>,
    ) -> Result<UpsertOutcome> {
        let draft = &post.draft;
        match self.insert(table, post).await {
            Ok(()) => {
                log::info!("[post] save {} post: {}", table.name(), draft.post_id);
                Ok(UpsertOutcome::Inserted)
            }
            // Another writer inserted the same post in between.
            Err(AppError::Database(sqlx::Error::Database(e))) if e.is_unique_violation() => {
                log::debug!("post {} inserted concurrently, revising", draft.post_id);
                self.revise(table, draft).await?.ok_or_else(|| {
                    AppError::validation(format!("post {} vanished after conflict", draft.post_id))
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Update path: rewrite title/updated of a known post. `None` if unknown.
    async fn revise(&self, table: PostTable, draft: &PostDraft) -> Result<Option<UpsertOutcome>> {
        let existing: Option<(String, String)> = sqlx::query_as(&format!(
            "SELECT title, updated FROM {} WHERE post_id = ?",
            table.name()
        ))
        .bind(draft.post_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((title, updated)) = existing else {
            return Ok(None);
        };

        let new_updated = timestamp(&draft.updated);
        if title == draft.title && updated == new_updated {
            return Ok(Some(UpsertOutcome::Unchanged));
        }

        sqlx::query(&format!(
            "UPDATE {} SET title = ?, updated = ? WHERE post_id = ?",
            table.name()
        ))
        .bind(&draft.title)
        .bind(&new_updated)
        .bind(draft.post_id)
        .execute(&self.pool)
        .await?;

        log::info!("[post] update existing post: {}", draft.post_id);
        Ok(Some(UpsertOutcome::Updated))
    }

    async fn insert(&self, table: PostTable, post: &PostRecord<'_>) -> Result<()> {
        let draft = &post.draft;
        let comments = serde_json::to_string(&draft.comments)?;
        let photos = serde_json::to_string(&draft.photos)?;
        let created_at = timestamp(&Utc::now());

        match table {
            PostTable::Group => {
                let keywords = serde_json::to_string(post.keyword_list)?;
                sqlx::query(
                    r"
                    INSERT INTO group_post (
                        post_id, group_id, author_name, author_alt, alt, title, content,
                        comments, photo_list, is_matched, keyword_list, created, updated,
                        created_at
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ",
                )
                .bind(draft.post_id)
                .bind(post.group_id)
                .bind(draft.author.as_ref().map(|a| a.name.as_str()))
                .bind(draft.author.as_ref().map(|a| a.alt.as_str()))
                .bind(&draft.alt)
                .bind(&draft.title)
                .bind(&draft.content)
                .bind(&comments)
                .bind(&photos)
                .bind(post.is_matched)
                .bind(&keywords)
                .bind(timestamp(&draft.created))
                .bind(timestamp(&draft.updated))
                .bind(&created_at)
                .execute(&self.pool)
                .await?;
            }
            PostTable::Doulist => {
                sqlx::query(
                    r"
                    INSERT INTO doulist_post (
                        post_id, alt, title, content, comments, photo_list, created, updated,
                        created_at
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ",
                )
                .bind(draft.post_id)
                .bind(&draft.alt)
                .bind(&draft.title)
                .bind(&draft.content)
                .bind(&comments)
                .bind(&photos)
                .bind(timestamp(&draft.created))
                .bind(timestamp(&draft.updated))
                .bind(&created_at)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }
}

/// Borrowed view of what goes into a post row.
struct PostRecord<'a> {
    draft: PostDraft,
    group_id: Option<&'a str>,
    is_matched: bool,
    keyword_list: &'a [String],
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    group_id: String,
    name: String,
    alt: String,
    member_count: Option<i64>,
    created: Option<String>,
    created_at: String,
}

#[derive(sqlx::FromRow)]
struct DoulistRow {
    doulist_id: String,
    name: String,
    alt: String,
    created_at: String,
}

#[derive(sqlx::FromRow)]
struct GroupPostRow {
    post_id: i64,
    group_id: String,
    author_name: Option<String>,
    author_alt: Option<String>,
    alt: String,
    title: String,
    content: String,
    comments: String,
    photo_list: String,
    is_matched: bool,
    keyword_list: String,
    created: String,
    updated: String,
    created_at: String,
    is_collected: bool,
    note: Option<String>,
}

#[derive(sqlx::FromRow)]
struct DoulistPostRow {
    post_id: i64,
    alt: String,
    title: String,
    content: String,
    comments: String,
    photo_list: String,
    created: String,
    updated: String,
    created_at: String,
}

impl TryFrom<GroupPostRow> for StoredPost {
    type Error = AppError;

    fn try_from(row: GroupPostRow) -> Result<Self> {
        let author = match (row.author_name, row.author_alt) {
            (None, None) => None,
            (name, alt) => Some(AuthorInfo {
                name: name.unwrap_or_default(),
                alt: alt.unwrap_or_default(),
            }),
        };
        Ok(StoredPost {
            post_id: row.post_id,
            group_id: Some(row.group_id),
            author,
            alt: row.alt,
            title: row.title,
            content: row.content,
            comments: serde_json::from_str(&row.comments)?,
            photos: serde_json::from_str(&row.photo_list)?,
            is_matched: row.is_matched,
            keyword_list: serde_json::from_str(&row.keyword_list)?,
            created: parse_timestamp(&row.created)?,
            updated: parse_timestamp(&row.updated)?,
            created_at: parse_timestamp(&row.created_at)?,
            is_collected: row.is_collected,
            note: row.note,
        })
    }
}

impl TryFrom<DoulistPostRow> for StoredPost {
    type Error = AppError;

    fn try_from(row: DoulistPostRow) -> Result<Self> {
        Ok(StoredPost {
            post_id: row.post_id,
            group_id: None,
            author: None,
            alt: row.alt,
            title: row.title,
            content: row.content,
            comments: serde_json::from_str(&row.comments)?,
            photos: serde_json::from_str(&row.photo_list)?,
            is_matched: false,
            keyword_list: Vec::new(),
            created: parse_timestamp(&row.created)?,
            updated: parse_timestamp(&row.updated)?,
            created_at: parse_timestamp(&row.created_at)?,
            is_collected: false,
            note: None,
        })
    }
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::validation(format!("stored timestamp {s:?}: {e}")))
}

#[async_trait]
impl PostStore for SqliteStore {
    async fn find_collection(
        &self,
        kind: CollectionKind,
        external_id: &str,
    ) -> Result<Option<Collection>> {
        match kind {
            CollectionKind::Group => {
                let row: Option<GroupRow> = sqlx::query_as(
                    "SELECT group_id, name, alt, member_count, created, created_at \
                     FROM group_info WHERE group_id = ?",
                )
                .bind(external_id)
                .fetch_optional(&self.pool)
                .await?;

                row.map(|r| -> Result<Collection> {
                    Ok(Collection {
                        kind,
                        external_id: r.group_id,
                        name: r.name,
                        alt: r.alt,
                        member_count: r.member_count,
                        created: r.created.as_deref().map(parse_timestamp).transpose()?,
                        created_at: Some(parse_timestamp(&r.created_at)?),
                    })
                })
                .transpose()
            }
            CollectionKind::Doulist => {
                let row: Option<DoulistRow> = sqlx::query_as(
                    "SELECT doulist_id, name, alt, created_at FROM doulist_info WHERE doulist_id = ?",
                )
                .bind(external_id)
                .fetch_optional(&self.pool)
                .await?;

                row.map(|r| -> Result<Collection> {
                    Ok(Collection {
                        kind,
                        external_id: r.doulist_id,
                        name: r.name,
                        alt: r.alt,
                        member_count: None,
                        created: None,
                        created_at: Some(parse_timestamp(&r.created_at)?),
                    })
                })
                .transpose()
            }
        }
    }

    async fn insert_collection(&self, collection: &Collection) -> Result<()> {
        let c = normalize_collection(collection);
        let created_at = timestamp(&Utc::now());
        match c.kind {
            CollectionKind::Group => {
                sqlx::query(
                    r"
                    INSERT INTO group_info (group_id, name, alt, member_count, created, created_at)
                    VALUES (?, ?, ?, ?, ?, ?)
                    ON CONFLICT(group_id) DO NOTHING
                    ",
                )
                .bind(&c.external_id)
                .bind(&c.name)
                .bind(&c.alt)
                .bind(c.member_count)
                .bind(c.created.as_ref().map(timestamp))
                .bind(&created_at)
                .execute(&self.pool)
                .await?;
            }
            CollectionKind::Doulist => {
                sqlx::query(
                    r"
                    INSERT INTO doulist_info (doulist_id, name, alt, created_at)
                    VALUES (?, ?, ?, ?)
                    ON CONFLICT(doulist_id) DO NOTHING
                    ",
                )
                .bind(&c.external_id)
                .bind(&c.name)
                .bind(&c.alt)
                .bind(&created_at)
                .execute(&self.pool)
                .await?;
            }
        }
        log::info!("[{}] save {}: {}", c.kind, c.external_id, c.name);
        Ok(())
    }

    async fn group_post_exists(&self, post_id: i64) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT post_id FROM group_post WHERE post_id = ?")
                .bind(post_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn upsert_group_post(&self, post: &GroupPost) -> Result<UpsertOutcome> {
        let record = PostRecord {
            draft: normalize_draft(&post.draft),
            group_id: Some(post.group_id.as_str()),
            is_matched: post.is_matched,
            keyword_list: &post.keyword_list,
        };
        self.upsert(PostTable::Group, &record).await
    }

    async fn upsert_doulist_post(&self, post: &DoulistPost) -> Result<UpsertOutcome> {
        let record = PostRecord {
            draft: normalize_draft(&post.draft),
            group_id: None,
            is_matched: false,
            keyword_list: &[],
        };
        self.upsert(PostTable::Doulist, &record).await
    }

    async fn find_group_post(&self, post_id: i64) -> Result<Option<StoredPost>> {
        let row: Option<GroupPostRow> = sqlx::query_as(
            r"
            SELECT post_id, group_id, author_name, author_alt, alt, title, content, comments,
                   photo_list, is_matched, keyword_list, created, updated, created_at,
                   is_collected, note
            FROM group_post WHERE post_id = ?
            ",
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(StoredPost::try_from).transpose()
    }

    async fn find_doulist_post(&self, post_id: i64) -> Result<Option<StoredPost>> {
        let row: Option<DoulistPostRow> = sqlx::query_as(
            r"
            SELECT post_id, alt, title, content, comments, photo_list, created, updated,
                   created_at
            FROM doulist_post WHERE post_id = ?
            ",
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(StoredPost::try_from).transpose()
    }

    async fn count_posts(&self, kind: CollectionKind) -> Result<i64> {
        let table = match kind {
            CollectionKind::Group => PostTable::Group,
            CollectionKind::Doulist => PostTable::Doulist,
        };
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table.name()))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn set_collected(
        &self,
        post_id: i64,
        collected: bool,
        note: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE group_post SET is_collected = ?, note = COALESCE(?, note) WHERE post_id = ?",
        )
        .bind(collected)
        .bind(note)
        .bind(post_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn store_with_group() -> SqliteStore {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .insert_collection(&Collection::new(
                CollectionKind::Group,
                "10086",
                "租房",
                "https://www.douban.com/group/10086",
            ))
            .await
            .unwrap();
        store
    }

    fn draft(post_id: i64, title: &str) -> PostDraft {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        PostDraft {
            post_id,
            alt: format!(r"https:\/\/www.douban.com\/group\/topic\/{post_id}\/"),
            title: title.to_string(),
            content: "花园小区 主卧".to_string(),
            comments: vec!["还在吗".to_string()],
            photos: vec![r"https:\/\/img.example.com\/1.jpg".to_string()],
            author: Some(AuthorInfo {
                name: "alice".to_string(),
                alt: r"https:\/\/www.douban.com\/people\/alice\/".to_string(),
            }),
            created: t,
            updated: t,
        }
    }

    fn group_post(draft: PostDraft) -> GroupPost {
        GroupPost {
            group_id: "10086".to_string(),
            draft,
            is_matched: true,
            keyword_list: vec!["花园".to_string()],
        }
    }

    #[tokio::test]
    async fn insert_then_read_back_normalized() {
        let store = store_with_group().await;
        let outcome = store
            .upsert_group_post(&group_post(draft(1, "出租")))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        let stored = store.find_group_post(1).await.unwrap().unwrap();
        assert_eq!(stored.group_id.as_deref(), Some("10086"));
        assert_eq!(stored.alt, "https://www.douban.com/group/topic/1/");
        assert_eq!(stored.photos, vec!["https://img.example.com/1.jpg"]);
        assert_eq!(
            stored.author.unwrap().alt,
            "https://www.douban.com/people/alice/"
        );
        assert!(stored.is_matched);
        assert_eq!(stored.keyword_list, vec!["花园"]);
        assert_eq!(stored.comments, vec!["还在吗"]);
        assert!(!stored.is_collected);
    }

    #[tokio::test]
    async fn second_sighting_only_touches_title_and_updated() {
        let store = store_with_group().await;
        store
            .upsert_group_post(&group_post(draft(7, "first title")))
            .await
            .unwrap();

        let mut changed = draft(7, "second title");
        changed.content = "completely different".to_string();
        changed.comments = vec![];
        changed.photos = vec![];
        changed.updated = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut post = group_post(changed.clone());
        post.is_matched = false;
        post.keyword_list = vec![];

        let outcome = store.upsert_group_post(&post).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);

        let stored = store.find_group_post(7).await.unwrap().unwrap();
        assert_eq!(stored.title, "second title");
        assert_eq!(stored.updated, changed.updated);
        assert_eq!(stored.content, "花园小区 主卧");
        assert_eq!(stored.comments, vec!["还在吗"]);
        assert_eq!(stored.photos.len(), 1);
        assert!(stored.is_matched);
        assert_eq!(stored.keyword_list, vec!["花园"]);
        assert_eq!(store.count_posts(CollectionKind::Group).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn identical_sighting_is_unchanged() {
        let store = store_with_group().await;
        let post = group_post(draft(3, "same"));
        store.upsert_group_post(&post).await.unwrap();
        assert_eq!(
            store.upsert_group_post(&post).await.unwrap(),
            UpsertOutcome::Unchanged
        );
    }

    #[tokio::test]
    async fn insert_losing_race_revises_existing_row() {
        let store = store_with_group().await;
        store
            .upsert_group_post(&group_post(draft(21, "first")))
            .await
            .unwrap();

        let mut later = draft(21, "renamed");
        later.content = "ignored".to_string();
        let record = PostRecord {
            draft: normalize_draft(&later),
            group_id: Some("10086"),
            is_matched: true,
            keyword_list: &[],
        };
        let outcome = store
            .insert_or_revise(PostTable::Group, &record)
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);

        let again = store
            .insert_or_revise(PostTable::Group, &record)
            .await
            .unwrap();
        assert_eq!(again, UpsertOutcome::Unchanged);

        let stored = store.find_group_post(21).await.unwrap().unwrap();
        assert_eq!(stored.title, "renamed");
        assert_eq!(stored.content, "花园小区 主卧");
        assert_eq!(store.count_posts(CollectionKind::Group).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn post_id_unique_constraint_is_enforced() {
        let store = store_with_group().await;
        store
            .upsert_group_post(&group_post(draft(9, "t")))
            .await
            .unwrap();
        let err = sqlx::query(
            "INSERT INTO group_post (post_id, group_id, alt, title, content, created, updated) \
             VALUES (9, '10086', 'x', 't', 'c', 'x', 'x')",
        )
        .execute(store.pool())
        .await
        .unwrap_err();
        match err {
            sqlx::Error::Database(e) => assert!(e.is_unique_violation()),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn doulist_posts_are_stored_separately() {
        let store = SqliteStore::in_memory().await.unwrap();
        let outcome = store
            .upsert_doulist_post(&DoulistPost {
                draft: draft(11, "清单条目"),
            })
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        let stored = store.find_doulist_post(11).await.unwrap().unwrap();
        assert_eq!(stored.group_id, None);
        assert_eq!(stored.alt, "https://www.douban.com/group/topic/11/");
        assert_eq!(stored.photos, vec!["https://img.example.com/1.jpg"]);
        assert_eq!(store.count_posts(CollectionKind::Doulist).await.unwrap(), 1);
        assert_eq!(store.count_posts(CollectionKind::Group).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn collections_round_trip_and_keep_first_insert() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut group = Collection::new(
            CollectionKind::Group,
            "42",
            "first",
            r"https:\/\/www.douban.com\/group\/42",
        );
        group.member_count = Some(12000);
        group.created = Some(Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap());
        store.insert_collection(&group).await.unwrap();

        let mut again = group.clone();
        again.name = "second".to_string();
        store.insert_collection(&again).await.unwrap();

        let found = store
            .find_collection(CollectionKind::Group, "42")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.name, "first");
        assert_eq!(found.alt, "https://www.douban.com/group/42");
        assert_eq!(found.member_count, Some(12000));
        assert_eq!(found.created, group.created);
        assert!(found.created_at.is_some());

        assert!(store
            .find_collection(CollectionKind::Doulist, "42")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn group_post_requires_known_group() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store
            .upsert_group_post(&group_post(draft(1, "orphan")))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn set_collected_updates_curation_fields() {
        let store = store_with_group().await;
        store
            .upsert_group_post(&group_post(draft(5, "t")))
            .await
            .unwrap();
        assert!(store.set_collected(5, true, Some("call owner")).await.unwrap());
        assert!(!store.set_collected(404, true, None).await.unwrap());

        let stored = store.find_group_post(5).await.unwrap().unwrap();
        assert!(stored.is_collected);
        assert_eq!(stored.note.as_deref(), Some("call owner"));

        // A later crawl revision leaves curation alone
        let mut revised = draft(5, "new title");
        revised.updated = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        store.upsert_group_post(&group_post(revised)).await.unwrap();
        let stored = store.find_group_post(5).await.unwrap().unwrap();
        assert!(stored.is_collected);
        assert_eq!(stored.note.as_deref(), Some("call owner"));
    }

    #[tokio::test]
    async fn open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("spy.sqlite");
        let store = SqliteStore::open(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(store.count_posts(CollectionKind::Group).await.unwrap(), 0);

        // Reopening runs no migration twice
        drop(store);
        let reopened = SqliteStore::open(&path).await.unwrap();
        assert_eq!(reopened.count_posts(CollectionKind::Doulist).await.unwrap(), 0);
    }
}
