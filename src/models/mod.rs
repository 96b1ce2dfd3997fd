// src/models/mod.rs

//! Domain models for the crawler application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod collection;
mod config;
mod post;
mod selectors;

// Re-export all public types
pub use collection::{Collection, CollectionKind};
pub use config::{Config, CrawlerConfig, PacingConfig, PollConfig, SiteConfig, StorageConfig};
pub use post::{AuthorInfo, DoulistPost, GroupPost, PostDraft, PostStub, StoredPost, UpsertOutcome};
pub use selectors::SiteSelectors;

/// Counters for one pass over one collection.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub pages_fetched: usize,
    pub pages_failed: usize,
    pub posts_seen: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub excluded: usize,
    pub unmatched: usize,
    pub extraction_failures: usize,
    pub fetch_failures: usize,
    pub store_failures: usize,
}

impl PassSummary {
    /// Record the outcome of one upsert.
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }
}
