//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::SiteSelectors;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP identity and transport settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Remote host and URL templates
    #[serde(default)]
    pub site: SiteConfig,

    /// Delays and decoy requests
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Outer polling loop settings
    #[serde(default)]
    pub poll: PollConfig,

    /// Persistence settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// CSS selectors for the remote markup
    #[serde(default)]
    pub selectors: SiteSelectors,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        url::Url::parse(&self.site.base_url)
            .map_err(|e| AppError::validation(format!("site.base_url is invalid: {e}")))?;
        for (name, template) in [
            ("site.group_info_path", &self.site.group_info_path),
            ("site.group_topics_path", &self.site.group_topics_path),
            ("site.doulist_path", &self.site.doulist_path),
        ] {
            if !template.contains("{id}") {
                return Err(AppError::validation(format!(
                    "{name} must contain an {{id}} placeholder"
                )));
            }
        }
        if self.site.page_size == 0 {
            return Err(AppError::validation("site.page_size must be > 0"));
        }
        if !(-12..=14).contains(&self.site.utc_offset_hours) {
            return Err(AppError::validation(
                "site.utc_offset_hours must be between -12 and 14",
            ));
        }
        if self.pacing.page_delay_min_secs > self.pacing.page_delay_max_secs {
            return Err(AppError::validation(
                "pacing.page_delay_min_secs must not exceed pacing.page_delay_max_secs",
            ));
        }
        if self.pacing.detail_delay_min_ms > self.pacing.detail_delay_max_ms {
            return Err(AppError::validation(
                "pacing.detail_delay_min_ms must not exceed pacing.detail_delay_max_ms",
            ));
        }
        for (name, p) in [
            ("pacing.decoy_probability", self.pacing.decoy_probability),
            (
                "pacing.second_decoy_probability",
                self.pacing.second_decoy_probability,
            ),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(AppError::validation(format!("{name} must be within 0..=1")));
            }
        }
        if self.poll.interval_secs == 0 {
            return Err(AppError::validation("poll.interval_secs must be > 0"));
        }
        self.selectors.validate()?;
        Ok(())
    }
}

/// HTTP identity and transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Session cookie sent with every request
    #[serde(default)]
    pub cookie: String,

    /// Request timeout in seconds (0 keeps the transport default)
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            cookie: String::new(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Remote host and URL templates. `{id}` is replaced by the collection id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    #[serde(default = "defaults::group_info_path")]
    pub group_info_path: String,

    #[serde(default = "defaults::group_topics_path")]
    pub group_topics_path: String,

    #[serde(default = "defaults::doulist_path")]
    pub doulist_path: String,

    /// Number of rows per listing page, used to compute `start`
    #[serde(default = "defaults::page_size")]
    pub page_size: u32,

    /// Offset of the site's local time from UTC
    #[serde(default = "defaults::utc_offset_hours")]
    pub utc_offset_hours: i32,

    /// Unrelated pages hit as decoys
    #[serde(default = "defaults::decoy_paths")]
    pub decoy_paths: Vec<String>,
}

impl SiteConfig {
    fn render(&self, template: &str, id: &str) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            template.replace("{id}", id)
        )
    }

    /// Collection info page of a group.
    pub fn group_info_url(&self, group_id: &str) -> String {
        self.render(&self.group_info_path, group_id)
    }

    /// Paginated topic listing of a group.
    pub fn group_topics_url(&self, group_id: &str) -> String {
        self.render(&self.group_topics_path, group_id)
    }

    /// Doulist page; serves both as info page and paginated listing.
    pub fn doulist_url(&self, doulist_id: &str) -> String {
        self.render(&self.doulist_path, doulist_id)
    }

    /// Canonical URL stored for a group.
    pub fn group_alt(&self, group_id: &str) -> String {
        format!("{}/group/{}", self.base_url.trim_end_matches('/'), group_id)
    }

    /// Absolute decoy URLs.
    pub fn decoy_urls(&self) -> Vec<String> {
        self.decoy_paths
            .iter()
            .map(|p| format!("{}{}", self.base_url.trim_end_matches('/'), p))
            .collect()
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            group_info_path: defaults::group_info_path(),
            group_topics_path: defaults::group_topics_path(),
            doulist_path: defaults::doulist_path(),
            page_size: defaults::page_size(),
            utc_offset_hours: defaults::utc_offset_hours(),
            decoy_paths: defaults::decoy_paths(),
        }
    }
}

/// Randomized delays and decoy traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    #[serde(default = "defaults::page_delay_min")]
    pub page_delay_min_secs: u64,

    #[serde(default = "defaults::page_delay_max")]
    pub page_delay_max_secs: u64,

    #[serde(default = "defaults::detail_delay_min")]
    pub detail_delay_min_ms: u64,

    #[serde(default = "defaults::detail_delay_max")]
    pub detail_delay_max_ms: u64,

    /// Chance of one decoy request before a detail fetch
    #[serde(default = "defaults::decoy_probability")]
    pub decoy_probability: f64,

    /// Chance of a second decoy once the first one fired
    #[serde(default = "defaults::second_decoy_probability")]
    pub second_decoy_probability: f64,
}

impl PacingConfig {
    /// Pacing with every delay and decoy switched off.
    pub fn disabled() -> Self {
        Self {
            page_delay_min_secs: 0,
            page_delay_max_secs: 0,
            detail_delay_min_ms: 0,
            detail_delay_max_ms: 0,
            decoy_probability: 0.0,
            second_decoy_probability: 0.0,
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            page_delay_min_secs: defaults::page_delay_min(),
            page_delay_max_secs: defaults::page_delay_max(),
            detail_delay_min_ms: defaults::detail_delay_min(),
            detail_delay_max_ms: defaults::detail_delay_max(),
            decoy_probability: defaults::decoy_probability(),
            second_decoy_probability: defaults::second_decoy_probability(),
        }
    }
}

/// Outer polling loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Sleep between two full passes
    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,

    /// Listing pages per group and pass
    #[serde(default = "defaults::pages")]
    pub pages: u32,

    /// Row offset the first group page starts at
    #[serde(default)]
    pub offset: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::interval(),
            pages: defaults::pages(),
            offset: 0,
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "defaults::database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: defaults::database_path(),
        }
    }
}

mod defaults {
    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
            .into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Site defaults
    pub fn base_url() -> String {
        "https://www.douban.com".into()
    }
    pub fn group_info_path() -> String {
        "/group/{id}/".into()
    }
    pub fn group_topics_path() -> String {
        "/group/{id}/discussion".into()
    }
    pub fn doulist_path() -> String {
        "/doulist/{id}/".into()
    }
    pub fn page_size() -> u32 {
        25
    }
    pub fn utc_offset_hours() -> i32 {
        8
    }
    pub fn decoy_paths() -> Vec<String> {
        vec!["/".into(), "/doulist/".into()]
    }

    // Pacing defaults
    pub fn page_delay_min() -> u64 {
        5
    }
    pub fn page_delay_max() -> u64 {
        8
    }
    pub fn detail_delay_min() -> u64 {
        2500
    }
    pub fn detail_delay_max() -> u64 {
        7500
    }
    pub fn decoy_probability() -> f64 {
        0.25
    }
    pub fn second_decoy_probability() -> f64 {
        0.5
    }

    // Poll defaults
    pub fn interval() -> u64 {
        60 * 15
    }
    pub fn pages() -> u32 {
        10
    }

    // Storage defaults
    pub fn database_path() -> String {
        "data/group_spy.sqlite".into()
    }
}
