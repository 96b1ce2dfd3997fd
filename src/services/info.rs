// src/services/info.rs

//! Collection info page parsing.

use scraper::{Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{Collection, CollectionKind, SiteConfig, SiteSelectors};
use crate::utils::{parse_created_on, parse_member_count};

/// Builds [`Collection`] records from group and doulist info pages.
#[derive(Debug, Clone)]
pub struct InfoParser {
    name: Selector,
    members: Selector,
    created: Selector,
    site: SiteConfig,
}

impl InfoParser {
    pub fn new(selectors: &SiteSelectors, site: &SiteConfig) -> Result<Self> {
        Ok(Self {
            name: SiteSelectors::parse(&selectors.info_name_selector)?,
            members: SiteSelectors::parse(&selectors.info_members_selector)?,
            created: SiteSelectors::parse(&selectors.info_created_selector)?,
            site: site.clone(),
        })
    }

    /// Parse the info page of `external_id`. The name is mandatory; member
    /// count and creation date are optional and only read for groups.
    pub fn parse(&self, kind: CollectionKind, external_id: &str, html: &str) -> Result<Collection> {
        let document = Html::parse_document(html);

        let name = document
            .select(&self.name)
            .next()
            .map(|h| h.text().collect::<String>().trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                AppError::extraction(format!("{kind} {external_id}"), "name not found")
            })?;

        match kind {
            CollectionKind::Group => {
                let mut collection = Collection::new(
                    kind,
                    external_id,
                    name,
                    self.site.group_alt(external_id),
                );
                collection.member_count = document
                    .select(&self.members)
                    .next()
                    .and_then(|a| parse_member_count(&a.text().collect::<String>()));
                collection.created = document.select(&self.created).next().and_then(|el| {
                    parse_created_on(&el.text().collect::<String>(), self.site.utc_offset_hours)
                });
                Ok(collection)
            }
            CollectionKind::Doulist => {
                let alt = self
                    .site
                    .doulist_url(external_id)
                    .trim_end_matches('/')
                    .to_string();
                Ok(Collection::new(kind, external_id, name, alt))
            }
        }
    }
}
