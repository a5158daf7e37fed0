//! Gamma API client for market discovery.
//!
//! Fetches the active market universe: a few pages of the general listing
//! plus the crypto tag (short-dated BTC/ETH binaries), deduplicated by ID.

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::Market;

use super::types::{list_payload, market_from_gamma};

pub const GAMMA_URL: &str = "https://gamma-api.polymarket.com";

const PAGE_SIZE: usize = 200;
const MAX_PAGES: usize = 3;

/// Client for Polymarket's Gamma API.
pub struct GammaClient {
    client: Client,
    base_url: String,
}

impl GammaClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(GAMMA_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("polybot/0.1")
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    async fn fetch_page(&self, query: &[(&str, String)]) -> Result<Vec<Value>> {
        let url = format!("{}/markets", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .context("Failed to fetch markets")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gamma API error: {} - {}", status, body);
        }

        let data: Value = response
            .json()
            .await
            .context("Failed to parse markets response")?;

        Ok(list_payload(data, &["markets", "data"]))
    }

    /// Fetch all active, unclosed markets.
    ///
    /// A failing page ends paging; a failing crypto-tag query is ignored.
    /// Only fails when nothing at all could be fetched.
    pub async fn fetch_active_markets(&self) -> Result<Vec<Market>> {
        let mut seen = HashSet::new();
        let mut markets = Vec::new();
        let mut first_error = None;

        for page in 0..MAX_PAGES {
            let query = [
                ("active", "true".to_string()),
                ("closed", "false".to_string()),
                ("limit", PAGE_SIZE.to_string()),
                ("offset", (page * PAGE_SIZE).to_string()),
            ];

            match self.fetch_page(&query).await {
                Ok(batch) if batch.is_empty() => break,
                Ok(batch) => {
                    let full_page = batch.len() >= PAGE_SIZE;
                    Self::merge(batch, &mut seen, &mut markets);
                    if !full_page {
                        break;
                    }
                }
                Err(e) => {
                    warn!(page, error = %e, "Market page fetch failed");
                    first_error.get_or_insert(e);
                    break;
                }
            }
        }

        let crypto = [
            ("active", "true".to_string()),
            ("closed", "false".to_string()),
            ("limit", PAGE_SIZE.to_string()),
            ("tag", "crypto".to_string()),
        ];
        match self.fetch_page(&crypto).await {
            Ok(batch) => Self::merge(batch, &mut seen, &mut markets),
            Err(e) => warn!(error = %e, "Crypto-tag market fetch failed"),
        }

        if markets.is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        debug!(count = markets.len(), "Fetched unique markets");
        Ok(markets)
    }

    fn merge(batch: Vec<Value>, seen: &mut HashSet<String>, markets: &mut Vec<Market>) {
        for market in batch.iter().filter_map(market_from_gamma) {
            if seen.insert(market.id.clone()) {
                markets.push(market);
            }
        }
    }
}
