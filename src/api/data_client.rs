//! Polymarket Data API client for trader activity, positions, and portfolio value.

use anyhow::{Context, Result};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::models::{ActivityEvent, ActorPosition};

use super::types::{activity_from_data, actor_position_from_data, balance_from, list_payload};

const DATA_API_BASE: &str = "https://data-api.polymarket.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Client for Polymarket Data API (read-only operations).
pub struct DataClient {
    client: Client,
    base_url: String,
}

impl DataClient {
    /// Create a new data client with default settings.
    pub fn new() -> Result<Self> {
        Self::with_base_url(DATA_API_BASE.to_string())
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent("polybot/0.1")
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    async fn get_json(&self, url: &str, what: &str) -> Result<Value> {
        debug!(url = %url, "Fetching {}", what);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", what))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} request failed: {} - {}", what, status, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", what))
    }

    /// Fetch a trader's most recent activity, newest first.
    pub async fn get_activity(&self, address: &str, limit: usize) -> Result<Vec<ActivityEvent>> {
        let url = format!(
            "{}/activity?user={}&limit={}",
            self.base_url,
            address.to_lowercase(),
            limit.min(500)
        );
        let data = self.get_json(&url, "activity").await?;

        Ok(list_payload(data, &["activity", "data"])
            .iter()
            .filter_map(|raw| activity_from_data(raw, address))
            .collect())
    }

    /// Fetch open positions for a trader.
    pub async fn get_positions(&self, address: &str) -> Result<Vec<ActorPosition>> {
        let url = format!("{}/positions?user={}", self.base_url, address.to_lowercase());
        let data = self.get_json(&url, "positions").await?;

        Ok(list_payload(data, &["positions", "data"])
            .iter()
            .filter_map(actor_position_from_data)
            .collect())
    }

    /// Fetch portfolio value for a wallet.
    pub async fn get_portfolio_value(&self, address: &str) -> Result<Decimal> {
        let url = format!("{}/value?user={}", self.base_url, address);
        let data = self.get_json(&url, "portfolio value").await?;

        // Either {"value": ..} or [{"user": .., "value": ..}]
        let entry = match data {
            Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
            other => other,
        };
        balance_from(&entry).context("Value response has no value field")
    }
}
