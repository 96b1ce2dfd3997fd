// src/models/selectors.rs

//! CSS selectors for scraping listing, detail and info pages.

use scraper::Selector;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// CSS selectors for the remote site's markup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSelectors {
    /// Selector for each topic row on a group listing page
    #[serde(default = "defaults::group_row")]
    pub group_row_selector: String,

    /// Selector for the topic link within a group row
    #[serde(default = "defaults::group_link")]
    pub group_link_selector: String,

    /// Selector for the author link within a group row
    #[serde(default = "defaults::group_author")]
    pub group_author_selector: String,

    /// Selector for each item on a doulist page
    #[serde(default = "defaults::doulist_row")]
    pub doulist_row_selector: String,

    /// Selector for the item link within a doulist row
    #[serde(default = "defaults::doulist_link")]
    pub doulist_link_selector: String,

    /// Element carrying the total page count of a doulist
    #[serde(default = "defaults::paginator")]
    pub paginator_selector: String,

    /// Attribute of the paginator element holding the total
    #[serde(default = "defaults::paginator_attr")]
    pub paginator_attr: String,

    /// Post body container on the detail page
    #[serde(default = "defaults::content")]
    pub content_selector: String,

    /// Comment paragraphs on the detail page
    #[serde(default = "defaults::comment")]
    pub comment_selector: String,

    /// Images inside the body container
    #[serde(default = "defaults::photo")]
    pub photo_selector: String,

    /// Creation time element on the detail page
    #[serde(default = "defaults::create_time")]
    pub create_time_selector: String,

    /// Document title on the detail page
    #[serde(default = "defaults::page_title")]
    pub page_title_selector: String,

    /// Collection name on an info page
    #[serde(default = "defaults::info_name")]
    pub info_name_selector: String,

    /// Member count link on a group info page
    #[serde(default = "defaults::info_members")]
    pub info_members_selector: String,

    /// Creation text on a group info page
    #[serde(default = "defaults::info_created")]
    pub info_created_selector: String,
}

impl SiteSelectors {
    /// Parse a single selector string.
    pub fn parse(s: &str) -> Result<Selector> {
        Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
    }

    /// Check that every selector compiles.
    pub fn validate(&self) -> Result<()> {
        for s in [
            &self.group_row_selector,
            &self.group_link_selector,
            &self.group_author_selector,
            &self.doulist_row_selector,
            &self.doulist_link_selector,
            &self.paginator_selector,
            &self.content_selector,
            &self.comment_selector,
            &self.photo_selector,
            &self.create_time_selector,
            &self.page_title_selector,
            &self.info_name_selector,
            &self.info_members_selector,
            &self.info_created_selector,
        ] {
            Self::parse(s)?;
        }
        Ok(())
    }
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self {
            group_row_selector: defaults::group_row(),
            group_link_selector: defaults::group_link(),
            group_author_selector: defaults::group_author(),
            doulist_row_selector: defaults::doulist_row(),
            doulist_link_selector: defaults::doulist_link(),
            paginator_selector: defaults::paginator(),
            paginator_attr: defaults::paginator_attr(),
            content_selector: defaults::content(),
            comment_selector: defaults::comment(),
            photo_selector: defaults::photo(),
            create_time_selector: defaults::create_time(),
            page_title_selector: defaults::page_title(),
            info_name_selector: defaults::info_name(),
            info_members_selector: defaults::info_members(),
            info_created_selector: defaults::info_created(),
        }
    }
}

mod defaults {
    pub fn group_row() -> String {
        "table.olt tr".into()
    }
    pub fn group_link() -> String {
        "td.title a".into()
    }
    pub fn group_author() -> String {
        "td:nth-child(2) a".into()
    }
    pub fn doulist_row() -> String {
        "div.bd.doulist-note".into()
    }
    pub fn doulist_link() -> String {
        "div.title a".into()
    }
    pub fn paginator() -> String {
        "span.thispage".into()
    }
    pub fn paginator_attr() -> String {
        "data-total-page".into()
    }
    pub fn content() -> String {
        "div.topic-content".into()
    }
    pub fn comment() -> String {
        "p.reply-content".into()
    }
    pub fn photo() -> String {
        "img".into()
    }
    pub fn create_time() -> String {
        ".create-time".into()
    }
    pub fn page_title() -> String {
        "title".into()
    }
    pub fn info_name() -> String {
        "h1".into()
    }
    pub fn info_members() -> String {
        "a[href$='/members']".into()
    }
    pub fn info_created() -> String {
        ".group-loc".into()
    }
}
