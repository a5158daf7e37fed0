//! Polymarket API clients and the collaborator traits the engine depends on.

mod clob_client;
mod data_client;
mod feed;
mod gamma_client;
mod paper;
pub mod types;

pub use clob_client::{marketable_terms, ClobClient};
pub use data_client::DataClient;
pub use feed::{PolymarketFeed, WalletBalance};
pub use gamma_client::GammaClient;
pub use paper::{FixedBalance, PaperExecutor};

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::future::Future;
use std::time::Duration;

use crate::models::{ActivityEvent, ActorPosition, Market, TradeSide};

/// Opaque reference returned by a successful order placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRef(pub String);

impl std::fmt::Display for OrderRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of market listings, trader activity, and prices.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Active, unclosed markets.
    async fn list_active_markets(&self) -> Result<Vec<Market>>;

    /// Most recent activity of `actor`, newest first.
    async fn recent_activity(&self, actor: &str, limit: usize) -> Result<Vec<ActivityEvent>>;

    /// Current holdings of `actor`.
    async fn actor_positions(&self, actor: &str) -> Result<Vec<ActorPosition>>;

    /// Current price of an outcome token, if one is quoted.
    async fn current_price(&self, instrument_id: &str) -> Result<Option<Decimal>>;
}

/// Places orders. Success or failure is all the engine learns.
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    /// Cross the book for a USDC amount.
    async fn place_marketable(
        &self,
        instrument_id: &str,
        side: TradeSide,
        usdc_amount: Decimal,
    ) -> Result<OrderRef>;

    /// Rest a limit order for `quantity` shares at `price`.
    async fn place_resting(
        &self,
        instrument_id: &str,
        side: TradeSide,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<OrderRef>;
}

/// Reports capital available for new entries.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn available_capital(&self) -> Result<Decimal>;
}

/// Run `fut` with a deadline; elapsing counts as an error.
pub async fn with_timeout<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => anyhow::bail!("{} timed out after {:?}", what, limit),
    }
}

#[async_trait]
impl OrderExecutor for ClobClient {
    async fn place_marketable(
        &self,
        instrument_id: &str,
        side: TradeSide,
        usdc_amount: Decimal,
    ) -> Result<OrderRef> {
        let response = self.market_order(instrument_id, side, usdc_amount).await?;
        Ok(OrderRef(response.order_id.unwrap_or_default()))
    }

    async fn place_resting(
        &self,
        instrument_id: &str,
        side: TradeSide,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<OrderRef> {
        let response = self.limit_order(instrument_id, side, price, quantity).await?;
        Ok(OrderRef(response.order_id.unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout() {
        let ok = with_timeout(Duration::from_millis(50), "fast", async { Ok(1) }).await;
        assert_eq!(ok.unwrap(), 1);

        let slow = with_timeout(Duration::from_millis(10), "slow", async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(slow.unwrap_err().to_string().contains("timed out"));
    }
}
