//! Utility functions and helpers.

pub mod http;

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use url::Url;

use crate::error::{AppError, Result};

/// Format of the remote site's post timestamps.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format of the remote site's group creation dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

static POST_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(?:group/topic|topic|note)/(\d+)").expect("valid regex"));

static PARENTHESIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[(（]([^)）]*)[)）]").expect("valid regex"));

static CREATED_ON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"创建于\s*(\d{4}-\d{1,2}-\d{1,2})").expect("valid regex"));

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Strip escape backslashes from a URL-bearing string.
pub fn strip_escapes(s: &str) -> String {
    s.replace('\\', "")
}

/// Extract the numeric post id from a detail page link.
pub fn extract_post_id(link: &str) -> Option<i64> {
    POST_ID
        .captures(link)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn site_offset(utc_offset_hours: i32) -> Result<FixedOffset> {
    FixedOffset::east_opt(utc_offset_hours * 3600)
        .ok_or_else(|| AppError::config(format!("invalid UTC offset: {utc_offset_hours}h")))
}

/// Parse a site-local post timestamp into UTC.
pub fn parse_site_datetime(text: &str, utc_offset_hours: i32) -> Result<DateTime<Utc>> {
    let text = text.trim();
    let naive = NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
        .map_err(|e| AppError::extraction("timestamp", format!("{text:?}: {e}")))?;
    localize(naive, utc_offset_hours)
}

/// Parse the creation date out of a group's "创建于YYYY-MM-DD" text.
pub fn parse_created_on(text: &str, utc_offset_hours: i32) -> Option<DateTime<Utc>> {
    let caps = CREATED_ON.captures(text)?;
    let date = NaiveDate::parse_from_str(caps.get(1)?.as_str(), DATE_FORMAT).ok()?;
    localize(date.and_hms_opt(0, 0, 0)?, utc_offset_hours).ok()
}

fn localize(naive: NaiveDateTime, utc_offset_hours: i32) -> Result<DateTime<Utc>> {
    site_offset(utc_offset_hours)?
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| AppError::extraction("timestamp", format!("ambiguous time {naive}")))
}

/// Parse a member count such as "浏览所有成员 (1.2万+)".
pub fn parse_member_count(text: &str) -> Option<i64> {
    let inner = PARENTHESIZED.captures(text)?.get(1)?.as_str();
    let cleaned = inner.trim().trim_end_matches('+').trim();
    if let Some(tens_of_thousands) = cleaned.strip_suffix('万') {
        let value: f64 = tens_of_thousands.trim().parse().ok()?;
        return Some((value * 10_000.0).round() as i64);
    }
    cleaned.replace(',', "").parse().ok()
}
