//! `MarketFeed` backed by the live Polymarket APIs.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::{ActivityEvent, ActorPosition, Market, TradeSide};

use super::clob_client::ClobPrices;
use super::{BalanceSource, ClobClient, DataClient, GammaClient, MarketFeed};

/// Composes the Gamma (markets), Data (activity) and CLOB (prices) clients.
///
/// Only public endpoints are used, so the feed needs no credentials.
pub struct PolymarketFeed {
    gamma: GammaClient,
    data: DataClient,
    prices: ClobPrices,
}

impl PolymarketFeed {
    pub fn new() -> Result<Self> {
        Ok(Self {
            gamma: GammaClient::new()?,
            data: DataClient::new()?,
            prices: ClobPrices::new()?,
        })
    }
}

#[async_trait]
impl MarketFeed for PolymarketFeed {
    async fn list_active_markets(&self) -> Result<Vec<Market>> {
        self.gamma.fetch_active_markets().await
    }

    async fn recent_activity(&self, actor: &str, limit: usize) -> Result<Vec<ActivityEvent>> {
        self.data.get_activity(actor, limit).await
    }

    async fn actor_positions(&self, actor: &str) -> Result<Vec<ActorPosition>> {
        self.data.get_positions(actor).await
    }

    /// Midpoint, falling back to the best BUY price.
    async fn current_price(&self, instrument_id: &str) -> Result<Option<Decimal>> {
        match self.prices.midpoint(instrument_id).await {
            Ok(Some(mid)) => return Ok(Some(mid)),
            Ok(None) => {}
            Err(e) => debug!(instrument_id, error = %e, "Midpoint unavailable"),
        }
        self.prices.best_price(instrument_id, TradeSide::Buy).await
    }
}

/// Wallet collateral from the CLOB, falling back to the Data API portfolio value.
pub struct WalletBalance {
    clob: Arc<ClobClient>,
    data: DataClient,
}

impl WalletBalance {
    pub fn new(clob: Arc<ClobClient>) -> Result<Self> {
        Ok(Self {
            clob,
            data: DataClient::new()?,
        })
    }
}

#[async_trait]
impl BalanceSource for WalletBalance {
    async fn available_capital(&self) -> Result<Decimal> {
        match self.clob.get_balance().await {
            Ok(balance) => Ok(balance),
            Err(e) => {
                warn!(error = %e, "CLOB balance unavailable, trying portfolio value");
                let address = format!("{:?}", self.clob.address());
                self.data.get_portfolio_value(&address).await
            }
        }
    }
}
