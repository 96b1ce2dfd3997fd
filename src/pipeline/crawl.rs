// src/pipeline/crawl.rs

//! Crawl orchestration for one pass over one collection.
//!
//! A pass resolves the collection (lazily creating it from its info page),
//! walks the listing pages and, for every stub, paces, fetches and extracts
//! the detail page before handing it to the store. Failures below the
//! collection level are logged and counted, never propagated.

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{
    Collection, CollectionKind, Config, DoulistPost, GroupPost, PassSummary, PostDraft, PostStub,
    SiteConfig,
};
use crate::services::{
    DetailExtractor, InfoParser, KeywordMatcher, ListingExtractor, MatchVerdict, Pacer,
};
use crate::storage::PostStore;
use crate::utils::extract_post_id;
use crate::utils::http::FetchClient;

/// Which pages of a group to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    /// Number of listing pages
    pub pages: u32,
    /// Start offset added to every page's `start` parameter
    pub offset: u32,
}

/// Drives passes over groups and doulists.
pub struct Crawler<'a> {
    site: SiteConfig,
    client: FetchClient,
    pacer: Pacer,
    listing: ListingExtractor,
    detail: DetailExtractor,
    info: InfoParser,
    store: &'a dyn PostStore,
    cancel: CancellationToken,
}

impl<'a> Crawler<'a> {
    /// Build a crawler from the configuration. The fetch client carries the
    /// configured identity and credential headers for the crawler's lifetime.
    pub fn new(config: &Config, store: &'a dyn PostStore, cancel: CancellationToken) -> Result<Self> {
        let client = FetchClient::new(&config.crawler)?;
        Self::with_client(config, client, store, cancel)
    }

    /// Build a crawler around an existing fetch client.
    pub fn with_client(
        config: &Config,
        client: FetchClient,
        store: &'a dyn PostStore,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let site = config.site.clone();
        let pacer = Pacer::new(config.pacing.clone(), site.decoy_urls(), client.clone());
        Ok(Self {
            listing: ListingExtractor::new(&config.selectors, &site.base_url)?,
            detail: DetailExtractor::new(&config.selectors, site.utc_offset_hours)?,
            info: InfoParser::new(&config.selectors, &site)?,
            site,
            client,
            pacer,
            store,
            cancel,
        })
    }

    /// Token that stops the crawler between pages and stubs.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// One pass over a group: `window.pages` listing pages starting at
    /// `window.offset`, keyword-gated inserts.
    pub async fn crawl_group(
        &self,
        group_id: &str,
        matcher: &KeywordMatcher,
        window: PageWindow,
    ) -> Result<PassSummary> {
        log::info!("start crawling group: {}", group_id);
        self.resolve_collection(CollectionKind::Group, group_id).await?;

        let url = self.site.group_topics_url(group_id);
        let mut summary = PassSummary::default();

        for p in 0..window.pages {
            if self.cancel.is_cancelled() {
                log::info!("[group] {} stopped before page {}", group_id, p);
                break;
            }

            let start = window.offset + p * self.site.page_size;
            self.pacer.before_page().await;
            let Some(body) = self.fetch_listing(&url, start, &mut summary).await else {
                continue;
            };

            let stubs = self.listing.extract(CollectionKind::Group, &body);
            log::debug!("[group] {} page {}: {} rows", group_id, p, stubs.len());
            for stub in stubs {
                if self.cancel.is_cancelled() {
                    break;
                }
                self.process_group_stub(group_id, &stub, matcher, &mut summary)
                    .await;
            }
        }

        log_summary(CollectionKind::Group, group_id, &summary);
        Ok(summary)
    }

    /// One pass over a doulist. The page count comes from the first
    /// listing page, which is processed as page 0.
    pub async fn crawl_doulist(&self, doulist_id: &str) -> Result<PassSummary> {
        log::info!("start crawling doulist: {}", doulist_id);
        self.resolve_collection(CollectionKind::Doulist, doulist_id)
            .await?;

        let url = self.site.doulist_url(doulist_id);
        let mut summary = PassSummary::default();

        self.pacer.before_page().await;
        let Some(first) = self.fetch_listing(&url, 0, &mut summary).await else {
            log::warn!("[doulist] {}: first page unavailable, skipping pass", doulist_id);
            log_summary(CollectionKind::Doulist, doulist_id, &summary);
            return Ok(summary);
        };

        // Page 0 has been fetched already, so the count never drops below 1.
        let total = match self.listing.total_pages(&first) {
            Some(n) => n.max(1),
            None => {
                log::debug!("[doulist] {}: no page indicator, assuming 1 page", doulist_id);
                1
            }
        };
        log::info!("[doulist] {}: {} pages", doulist_id, total);

        let first_stubs = self.listing.extract(CollectionKind::Doulist, &first);
        self.process_doulist_stubs(first_stubs, &mut summary).await;

        for p in 1..total {
            if self.cancel.is_cancelled() {
                log::info!("[doulist] {} stopped before page {}", doulist_id, p);
                break;
            }

            self.pacer.before_page().await;
            let start = p * self.site.page_size;
            let Some(body) = self.fetch_listing(&url, start, &mut summary).await else {
                continue;
            };
            let stubs = self.listing.extract(CollectionKind::Doulist, &body);
            self.process_doulist_stubs(stubs, &mut summary).await;
        }

        log_summary(CollectionKind::Doulist, doulist_id, &summary);
        Ok(summary)
    }

    /// Look up a collection, creating it from its info page on first sight.
    pub async fn resolve_collection(
        &self,
        kind: CollectionKind,
        external_id: &str,
    ) -> Result<Collection> {
        if let Some(existing) = self.store.find_collection(kind, external_id).await? {
            return Ok(existing);
        }

        let url = match kind {
            CollectionKind::Group => self.site.group_info_url(external_id),
            CollectionKind::Doulist => self.site.doulist_url(external_id),
        };
        log::info!("[{}] {} unknown, fetching {}", kind, external_id, url);
        let page = self.client.fetch(&url, &[]).await?;
        let collection = self.info.parse(kind, external_id, &page.body)?;
        log::info!("Getting {}: {} successful", kind, external_id);

        self.store.insert_collection(&collection).await?;
        Ok(collection)
    }

    /// Fetch one listing page. `None` when the page is lost for this pass.
    async fn fetch_listing(&self, url: &str, start: u32, summary: &mut PassSummary) -> Option<String> {
        match self.client.fetch(url, &[("start", start.to_string())]).await {
            Ok(page) => {
                summary.pages_fetched += 1;
                Some(page.body)
            }
            Err(e) => {
                summary.pages_failed += 1;
                log::warn!("Skipping listing page {} (start={}): {}", url, start, e);
                None
            }
        }
    }

    /// Pace, fetch and extract one stub's detail page.
    async fn fetch_draft(&self, stub: &PostStub, summary: &mut PassSummary) -> Option<PostDraft> {
        summary.posts_seen += 1;
        let Some(post_id) = extract_post_id(&stub.link) else {
            summary.extraction_failures += 1;
            log::debug!("no post id in {}", stub.link);
            return None;
        };

        self.pacer.before_detail().await;
        let page = match self.client.fetch(&stub.link, &[]).await {
            Ok(page) => page,
            Err(e) => {
                summary.fetch_failures += 1;
                log::warn!("Skipping post {}: {}", post_id, e);
                return None;
            }
        };

        match self.detail.extract(&page.body, post_id, &stub.link) {
            Ok(draft) => Some(draft),
            Err(e) => {
                summary.extraction_failures += 1;
                log::debug!("dropping post {}: {}", post_id, e);
                None
            }
        }
    }

    async fn process_group_stub(
        &self,
        group_id: &str,
        stub: &PostStub,
        matcher: &KeywordMatcher,
        summary: &mut PassSummary,
    ) {
        let Some(draft) = self.fetch_draft(stub, summary).await else {
            return;
        };
        let draft = draft.with_stub(stub);
        let post_id = draft.post_id;

        let verdict = matcher.evaluate(&draft);
        match &verdict {
            MatchVerdict::Excluded { term } => {
                summary.excluded += 1;
                log::debug!("post {} excluded by {:?}", post_id, term);
                return;
            }
            MatchVerdict::Matched {
                relevant_comments, ..
            } if !relevant_comments.is_empty() => {
                log::debug!("post {} relevant comments: {:?}", post_id, relevant_comments);
            }
            _ => {}
        }

        // Known posts are revised whether or not they still match.
        let known = match self.store.group_post_exists(post_id).await {
            Ok(known) => known,
            Err(e) => {
                summary.store_failures += 1;
                log::warn!("Failed to look up post {}: {}", post_id, e);
                return;
            }
        };
        if !known && !verdict.is_matched() {
            summary.unmatched += 1;
            return;
        }

        let post = GroupPost {
            group_id: group_id.to_string(),
            is_matched: verdict.is_matched(),
            keyword_list: verdict.keywords().to_vec(),
            draft,
        };
        match self.store.upsert_group_post(&post).await {
            Ok(outcome) => summary.record(outcome),
            Err(e) => {
                summary.store_failures += 1;
                log::warn!("Failed to store post {}: {}", post_id, e);
            }
        }
    }

    async fn process_doulist_stubs(&self, stubs: Vec<PostStub>, summary: &mut PassSummary) {
        for stub in stubs {
            if self.cancel.is_cancelled() {
                break;
            }
            let Some(draft) = self.fetch_draft(&stub, summary).await else {
                continue;
            };
            let post_id = draft.post_id;
            match self.store.upsert_doulist_post(&DoulistPost { draft }).await {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    summary.store_failures += 1;
                    log::warn!("Failed to store doulist post {}: {}", post_id, e);
                }
            }
        }
    }
}

fn log_summary(kind: CollectionKind, id: &str, s: &PassSummary) {
    log::info!(
        "[{}] {} done: pages {}/{} ok, posts seen {}, inserted {}, updated {}, unchanged {}, \
         excluded {}, unmatched {}, extraction failures {}, fetch failures {}, store failures {}",
        kind,
        id,
        s.pages_fetched,
        s.pages_fetched + s.pages_failed,
        s.posts_seen,
        s.inserted,
        s.updated,
        s.unchanged,
        s.excluded,
        s.unmatched,
        s.extraction_failures,
        s.fetch_failures,
        s.store_failures,
    );
}
