//! Dry-run collaborators: simulated order placement and a fixed balance.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

use crate::models::TradeSide;

use super::{marketable_terms, BalanceSource, OrderExecutor, OrderRef};

/// Accepts every order without contacting the exchange.
#[derive(Debug, Default)]
pub struct PaperExecutor {
    placed: AtomicUsize,
}

impl PaperExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn placed(&self) -> usize {
        self.placed.load(Ordering::Relaxed)
    }

    fn next_ref(&self) -> OrderRef {
        self.placed.fetch_add(1, Ordering::Relaxed);
        OrderRef(format!("paper-{}", uuid::Uuid::new_v4()))
    }
}

#[async_trait]
impl OrderExecutor for PaperExecutor {
    async fn place_marketable(
        &self,
        instrument_id: &str,
        side: TradeSide,
        usdc_amount: Decimal,
    ) -> Result<OrderRef> {
        let (limit, shares) = marketable_terms(side, usdc_amount);
        let order_ref = self.next_ref();
        info!(
            instrument_id,
            side = %side,
            usdc = %usdc_amount,
            %limit,
            %shares,
            order_ref = %order_ref,
            "Paper FOK order filled"
        );
        Ok(order_ref)
    }

    async fn place_resting(
        &self,
        instrument_id: &str,
        side: TradeSide,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<OrderRef> {
        let order_ref = self.next_ref();
        info!(
            instrument_id,
            side = %side,
            %price,
            %quantity,
            order_ref = %order_ref,
            "Paper GTC order resting"
        );
        Ok(order_ref)
    }
}

/// Balance source that always reports the configured capital.
#[derive(Debug, Clone, Copy)]
pub struct FixedBalance(pub Decimal);

#[async_trait]
impl BalanceSource for FixedBalance {
    async fn available_capital(&self) -> Result<Decimal> {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_paper_orders() {
        let executor = PaperExecutor::new();

        let first = executor
            .place_marketable("tok", TradeSide::Buy, dec!(50))
            .await
            .unwrap();
        let second = executor
            .place_resting("tok", TradeSide::Buy, dec!(0.1), dec!(500))
            .await
            .unwrap();

        assert!(first.0.starts_with("paper-"));
        assert_ne!(first, second);
        assert_eq!(executor.placed(), 2);
    }

    #[tokio::test]
    async fn test_fixed_balance() {
        let balance = FixedBalance(dec!(1000));
        assert_eq!(balance.available_capital().await.unwrap(), dec!(1000));
    }
}
