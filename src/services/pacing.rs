// src/services/pacing.rs

//! Request pacing and decoy traffic.
//!
//! Sleeps a random interval before every listing and detail fetch and now
//! and then hits unrelated pages of the same site, so the crawl does not
//! look like a fixed-rate bot to the remote rate limiter.

use std::time::Duration;

use rand::Rng;

use crate::models::PacingConfig;
use crate::utils::http::FetchClient;

/// Side-effecting delays and decoys between fetches.
#[derive(Debug, Clone)]
pub struct Pacer {
    config: PacingConfig,
    decoy_urls: Vec<String>,
    client: FetchClient,
}

impl Pacer {
    pub fn new(config: PacingConfig, decoy_urls: Vec<String>, client: FetchClient) -> Self {
        Self {
            config,
            decoy_urls,
            client,
        }
    }

    /// Sleep before a listing page fetch.
    pub async fn before_page(&self) {
        let delay = Duration::from_secs(random_between(
            self.config.page_delay_min_secs,
            self.config.page_delay_max_secs,
        ));
        sleep(delay).await;
    }

    /// Sleep before a detail fetch, then maybe send decoys.
    pub async fn before_detail(&self) {
        let delay = Duration::from_millis(random_between(
            self.config.detail_delay_min_ms,
            self.config.detail_delay_max_ms,
        ));
        sleep(delay).await;

        for url in self.pick_decoys() {
            self.client.touch(&url).await;
        }
    }

    /// Zero, one or two decoy URLs for this round.
    fn pick_decoys(&self) -> Vec<String> {
        if self.decoy_urls.is_empty() {
            return Vec::new();
        }
        let mut rng = rand::thread_rng();
        let mut picked = Vec::new();
        if rng.gen_bool(self.config.decoy_probability.clamp(0.0, 1.0)) {
            picked.push(self.decoy_urls[0].clone());
            if self.decoy_urls.len() > 1
                && rng.gen_bool(self.config.second_decoy_probability.clamp(0.0, 1.0))
            {
                picked.push(self.decoy_urls[1].clone());
            }
        }
        picked
    }
}

fn random_between(min: u64, max: u64) -> u64 {
    if max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..=max)
}

async fn sleep(delay: Duration) {
    if !delay.is_zero() {
        log::debug!("sleeping {:?}", delay);
        tokio::time::sleep(delay).await;
    }
}
