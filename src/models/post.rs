//! Post data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author name and profile link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AuthorInfo {
    pub name: String,
    pub alt: String,
}

/// A post reference found on a listing page, before its detail page is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostStub {
    /// Absolute link to the detail page
    pub link: String,

    /// Title attribute (or link text) from the listing row
    pub title: Option<String>,

    /// Author column of the listing row
    pub author: Option<AuthorInfo>,
}

/// A fully extracted post, not yet matched or stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDraft {
    pub post_id: i64,
    pub alt: String,
    pub title: String,
    pub content: String,
    pub comments: Vec<String>,
    pub photos: Vec<String>,
    pub author: Option<AuthorInfo>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl PostDraft {
    /// Prefer the listing row's title and author over the detail page's.
    pub fn with_stub(mut self, stub: &PostStub) -> Self {
        if let Some(title) = &stub.title {
            self.title = title.clone();
        }
        if stub.author.is_some() {
            self.author = stub.author.clone();
        }
        self
    }
}

/// A group post ready for the store.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupPost {
    pub group_id: String,
    pub draft: PostDraft,
    pub is_matched: bool,
    pub keyword_list: Vec<String>,
}

/// A doulist post ready for the store.
#[derive(Debug, Clone, PartialEq)]
pub struct DoulistPost {
    pub draft: PostDraft,
}

/// A post as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPost {
    pub post_id: i64,

    /// Owning group (group posts only)
    pub group_id: Option<String>,
    pub author: Option<AuthorInfo>,
    pub alt: String,
    pub title: String,
    pub content: String,
    pub comments: Vec<String>,
    pub photos: Vec<String>,
    pub is_matched: bool,
    pub keyword_list: Vec<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,

    /// Curation flag, never touched by the crawler
    pub is_collected: bool,

    /// Curation note, never touched by the crawler
    pub note: Option<String>,
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First sighting, full record written
    Inserted,
    /// Known post, title/updated rewritten
    Updated,
    /// Known post with identical title/updated, nothing written
    Unchanged,
}
