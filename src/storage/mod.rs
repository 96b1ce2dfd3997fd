//! Storage abstractions for collection and post persistence.
//!
//! Four record tables, each keyed by the remote site's id under a unique
//! constraint, with a local surrogate key and a first-seen timestamp:
//!
//! ```text
//! group_info     (group_id UNIQUE)
//! doulist_info   (doulist_id UNIQUE)
//! group_post     (post_id UNIQUE, group_id -> group_info, no cascade)
//! doulist_post   (post_id UNIQUE)
//! ```
//!
//! Posts are upserted: the first sighting inserts the full record, later
//! sightings only rewrite `title` and `updated`. URL-bearing fields are
//! stripped of escape backslashes before every write.

mod migrations;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Collection, CollectionKind, DoulistPost, GroupPost, PostDraft, StoredPost, UpsertOutcome,
};
use crate::utils::strip_escapes;

// Re-export for convenience
pub use sqlite::SqliteStore;

/// Trait for record store backends.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Look up a collection by its external id.
    async fn find_collection(
        &self,
        kind: CollectionKind,
        external_id: &str,
    ) -> Result<Option<Collection>>;

    /// Insert a collection; an existing row with the same id is kept as is.
    async fn insert_collection(&self, collection: &Collection) -> Result<()>;

    /// Whether a group post with this id is already stored.
    async fn group_post_exists(&self, post_id: i64) -> Result<bool>;

    /// Insert or revise a group post.
    async fn upsert_group_post(&self, post: &GroupPost) -> Result<UpsertOutcome>;

    /// Insert or revise a doulist post.
    async fn upsert_doulist_post(&self, post: &DoulistPost) -> Result<UpsertOutcome>;

    /// Read back a stored group post.
    async fn find_group_post(&self, post_id: i64) -> Result<Option<StoredPost>>;

    /// Read back a stored doulist post.
    async fn find_doulist_post(&self, post_id: i64) -> Result<Option<StoredPost>>;

    /// Number of stored posts of a kind.
    async fn count_posts(&self, kind: CollectionKind) -> Result<i64>;

    /// Set the curation flag and note of a group post. Returns `false` if
    /// the post does not exist.
    async fn set_collected(&self, post_id: i64, collected: bool, note: Option<&str>)
    -> Result<bool>;
}

/// Copy of `draft` with escape characters stripped from every URL field.
pub fn normalize_draft(draft: &PostDraft) -> PostDraft {
    let mut normalized = draft.clone();
    normalized.alt = strip_escapes(&draft.alt);
    normalized.photos = draft.photos.iter().map(|p| strip_escapes(p)).collect();
    if let Some(author) = normalized.author.as_mut() {
        author.alt = strip_escapes(&author.alt);
    }
    normalized
}

/// Copy of `collection` with escape characters stripped from its URL.
pub fn normalize_collection(collection: &Collection) -> Collection {
    let mut normalized = collection.clone();
    normalized.alt = strip_escapes(&collection.alt);
    normalized
}
