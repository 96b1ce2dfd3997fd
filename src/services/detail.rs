// src/services/detail.rs

//! Detail page extraction.
//!
//! A post is either extracted completely or not at all: a missing content
//! container or creation time fails the whole page.

use scraper::{Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{PostDraft, SiteSelectors};
use crate::utils::parse_site_datetime;

/// Parses a single post page into a [`PostDraft`].
#[derive(Debug, Clone)]
pub struct DetailExtractor {
    content: Selector,
    comment: Selector,
    photo: Selector,
    create_time: Selector,
    page_title: Selector,
    utc_offset_hours: i32,
}

impl DetailExtractor {
    /// Compile the detail selectors. Timestamps are read as site-local time.
    pub fn new(selectors: &SiteSelectors, utc_offset_hours: i32) -> Result<Self> {
        Ok(Self {
            content: SiteSelectors::parse(&selectors.content_selector)?,
            comment: SiteSelectors::parse(&selectors.comment_selector)?,
            photo: SiteSelectors::parse(&selectors.photo_selector)?,
            create_time: SiteSelectors::parse(&selectors.create_time_selector)?,
            page_title: SiteSelectors::parse(&selectors.page_title_selector)?,
            utc_offset_hours,
        })
    }

    /// Extract the post behind `link`.
    pub fn extract(&self, html: &str, post_id: i64, link: &str) -> Result<PostDraft> {
        let document = Html::parse_document(html);

        let content_elem = document
            .select(&self.content)
            .next()
            .ok_or_else(|| AppError::extraction(link, "content container not found"))?;
        let content = content_elem.text().collect::<String>().trim().to_string();

        let photos = content_elem
            .select(&self.photo)
            .map(|img| {
                img.value()
                    .attr("src")
                    .map(str::to_string)
                    .ok_or_else(|| AppError::extraction(link, "image without src"))
            })
            .collect::<Result<Vec<_>>>()?;

        let comments = document
            .select(&self.comment)
            .map(|c| c.text().collect::<String>().trim().to_string())
            .collect();

        let create_time = document
            .select(&self.create_time)
            .next()
            .ok_or_else(|| AppError::extraction(link, "creation time not found"))?
            .text()
            .collect::<String>();
        // The page only exposes one timestamp; it doubles as the update time.
        let created = parse_site_datetime(&create_time, self.utc_offset_hours)?;

        let title = document
            .select(&self.page_title)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        Ok(PostDraft {
            post_id,
            alt: link.to_string(),
            title,
            content,
            comments,
            photos,
            author: None,
            created,
            updated: created,
        })
    }
}
