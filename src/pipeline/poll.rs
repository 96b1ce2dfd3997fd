// src/pipeline/poll.rs

//! Outer polling loop.
//!
//! Runs one pass per collection, then sleeps for the poll interval. A failed
//! pass is logged and the loop moves on; only cancellation ends it.

use std::time::Duration;

use crate::error::Result;
use crate::models::PassSummary;
use crate::pipeline::crawl::{Crawler, PageWindow};
use crate::services::KeywordMatcher;

/// The collections a poll loop walks, in order.
#[derive(Debug, Clone)]
pub enum PollTargets {
    Groups {
        ids: Vec<String>,
        matcher: KeywordMatcher,
        window: PageWindow,
    },
    Doulists {
        ids: Vec<String>,
    },
}

impl PollTargets {
    fn ids(&self) -> &[String] {
        match self {
            PollTargets::Groups { ids, .. } | PollTargets::Doulists { ids } => ids,
        }
    }
}

/// Run one pass over every target. Per-collection failures are logged and
/// returned as `None` entries.
pub async fn run_pass(crawler: &Crawler<'_>, targets: &PollTargets) -> Vec<Option<PassSummary>> {
    let mut results = Vec::with_capacity(targets.ids().len());

    for id in targets.ids() {
        if crawler.cancellation().is_cancelled() {
            break;
        }

        let result = match targets {
            PollTargets::Groups {
                matcher, window, ..
            } => crawler.crawl_group(id, matcher, *window).await,
            PollTargets::Doulists { .. } => crawler.crawl_doulist(id).await,
        };

        match result {
            Ok(summary) => results.push(Some(summary)),
            Err(e) => {
                log::warn!("Pass over {} failed: {}", id, e);
                results.push(None);
            }
        }
    }

    results
}

/// Poll until the crawler's cancellation token fires.
pub async fn run_poll(
    crawler: &Crawler<'_>,
    targets: &PollTargets,
    interval: Duration,
) -> Result<()> {
    let cancel = crawler.cancellation();

    loop {
        run_pass(crawler, targets).await;
        if cancel.is_cancelled() {
            break;
        }

        log::info!("Sleeping {}s...", interval.as_secs());
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    log::info!("Polling stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CollectionKind, Config, PacingConfig};
    use crate::storage::{PostStore, SqliteStore};
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn doulist_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doulist/1/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<h1>清单</h1><span class=\"thispage\" data-total-page=\"1\"></span>"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/doulist/2/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        server
    }

    fn config(server: &MockServer) -> Config {
        let mut config = Config::default();
        config.site.base_url = server.uri();
        config.pacing = PacingConfig::disabled();
        config
    }

    #[tokio::test]
    async fn failed_collection_does_not_stop_the_pass() {
        let server = doulist_server().await;
        let store = SqliteStore::in_memory().await.unwrap();
        let config = config(&server);
        let crawler = Crawler::new(&config, &store, CancellationToken::new()).unwrap();

        let targets = PollTargets::Doulists {
            ids: vec!["2".to_string(), "1".to_string()],
        };
        let results = run_pass(&crawler, &targets).await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_none());
        assert_eq!(results[1].as_ref().unwrap().pages_fetched, 1);
        assert!(store
            .find_collection(CollectionKind::Doulist, "1")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn poll_stops_on_cancellation_during_sleep() {
        let server = doulist_server().await;
        let store = SqliteStore::in_memory().await.unwrap();
        let config = config(&server);
        let cancel = CancellationToken::new();
        let crawler = Crawler::new(&config, &store, cancel.clone()).unwrap();
        let targets = PollTargets::Doulists {
            ids: vec!["1".to_string()],
        };

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        });

        tokio::time::timeout(
            Duration::from_secs(10),
            run_poll(&crawler, &targets, Duration::from_secs(3600)),
        )
        .await
        .expect("poll loop should stop after cancellation")
        .unwrap();
        stopper.await.unwrap();
    }
}
