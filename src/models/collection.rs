//! Collection data structures.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two kinds of remote content source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    /// Discussion group; posts are keyword-gated
    Group,
    /// Curated list; every post is kept
    Doulist,
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionKind::Group => f.write_str("group"),
            CollectionKind::Doulist => f.write_str("doulist"),
        }
    }
}

/// A remote content source tracked by its external id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub kind: CollectionKind,

    /// Stable external id, e.g. "10086"
    pub external_id: String,

    /// Display name
    pub name: String,

    /// Canonical URL
    pub alt: String,

    /// Member count (groups only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_count: Option<i64>,

    /// Creation date on the remote site (groups only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    /// Local first-seen timestamp; set by the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Collection {
    /// A collection as parsed from its info page, not yet stored.
    pub fn new(
        kind: CollectionKind,
        external_id: impl Into<String>,
        name: impl Into<String>,
        alt: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            external_id: external_id.into(),
            name: name.into(),
            alt: alt.into(),
            member_count: None,
            created: None,
            created_at: None,
        }
    }
}
