// src/services/listing.rs

//! Listing page extraction.
//!
//! Turns a paginated index page into ordered post stubs. Rows without a
//! usable link are skipped instead of failing the page.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::Result;
use crate::models::{AuthorInfo, CollectionKind, PostStub, SiteSelectors};
use crate::utils::resolve_url;

/// Extracts post stubs from group and doulist listing pages.
#[derive(Debug, Clone)]
pub struct ListingExtractor {
    base_url: Url,
    group_row: Selector,
    group_link: Selector,
    group_author: Selector,
    doulist_row: Selector,
    doulist_link: Selector,
    paginator: Selector,
    paginator_attr: String,
}

impl ListingExtractor {
    /// Compile the listing selectors; relative links resolve against `base_url`.
    pub fn new(selectors: &SiteSelectors, base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            group_row: SiteSelectors::parse(&selectors.group_row_selector)?,
            group_link: SiteSelectors::parse(&selectors.group_link_selector)?,
            group_author: SiteSelectors::parse(&selectors.group_author_selector)?,
            doulist_row: SiteSelectors::parse(&selectors.doulist_row_selector)?,
            doulist_link: SiteSelectors::parse(&selectors.doulist_link_selector)?,
            paginator: SiteSelectors::parse(&selectors.paginator_selector)?,
            paginator_attr: selectors.paginator_attr.clone(),
        })
    }

    /// Extract the stubs of a listing page in document order.
    pub fn extract(&self, kind: CollectionKind, html: &str) -> Vec<PostStub> {
        let document = Html::parse_document(html);
        let (row_sel, link_sel, author_sel) = match kind {
            CollectionKind::Group => (&self.group_row, &self.group_link, Some(&self.group_author)),
            CollectionKind::Doulist => (&self.doulist_row, &self.doulist_link, None),
        };

        document
            .select(row_sel)
            .filter_map(|row| self.parse_row(&row, link_sel, author_sel))
            .collect()
    }

    /// Read the total page count a doulist listing advertises.
    pub fn total_pages(&self, html: &str) -> Option<u32> {
        let document = Html::parse_document(html);
        document
            .select(&self.paginator)
            .next()
            .and_then(|el| el.value().attr(&self.paginator_attr))
            .and_then(|v| v.trim().parse().ok())
    }

    fn parse_row(
        &self,
        row: &ElementRef,
        link_sel: &Selector,
        author_sel: Option<&Selector>,
    ) -> Option<PostStub> {
        let link_elem = row.select(link_sel).next()?;
        let href = link_elem.value().attr("href")?.trim();
        if href.is_empty() {
            return None;
        }

        let title = link_elem
            .value()
            .attr("title")
            .map(str::to_string)
            .or_else(|| Some(link_elem.text().collect::<String>()))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let author = author_sel
            .and_then(|sel| row.select(sel).next())
            .map(|a| AuthorInfo {
                name: a.text().collect::<String>().trim().to_string(),
                alt: a
                    .value()
                    .attr("href")
                    .map(|h| resolve_url(&self.base_url, h))
                    .unwrap_or_default(),
            });

        Some(PostStub {
            link: resolve_url(&self.base_url, href),
            title,
            author,
        })
    }
}
