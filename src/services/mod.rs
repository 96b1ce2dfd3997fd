//! Service layer for the crawler application.
//!
//! This module contains the business logic for:
//! - Listing page extraction (`ListingExtractor`)
//! - Detail page extraction (`DetailExtractor`)
//! - Collection info parsing (`InfoParser`)
//! - Fuzzy keyword matching (`KeywordMatcher`)
//! - Request pacing and decoys (`Pacer`)

mod detail;
mod info;
mod listing;
mod matcher;
mod pacing;

pub use detail::DetailExtractor;
pub use info::InfoParser;
pub use listing::ListingExtractor;
pub use matcher::{KeywordMatcher, MatchVerdict};
pub use pacing::Pacer;
