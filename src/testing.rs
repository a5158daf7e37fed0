//! In-memory collaborators shared by unit tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::api::{BalanceSource, MarketFeed, OrderExecutor, OrderRef};
use crate::models::{ActivityEvent, ActivityKind, ActorPosition, Market, OutcomeToken, TradeSide};

#[derive(Default)]
pub struct FakeFeed {
    markets: Mutex<Vec<Market>>,
    activity: Mutex<Vec<ActivityEvent>>,
    actor_positions: Mutex<Vec<ActorPosition>>,
    prices: Mutex<HashMap<String, Decimal>>,
    fail_markets: AtomicBool,
    fail_activity: AtomicBool,
    pub market_calls: AtomicUsize,
}

impl FakeFeed {
    pub fn set_markets(&self, markets: Vec<Market>) {
        *self.markets.lock().unwrap() = markets;
    }

    pub fn set_activity(&self, activity: Vec<ActivityEvent>) {
        *self.activity.lock().unwrap() = activity;
    }

    pub fn set_actor_positions(&self, positions: Vec<ActorPosition>) {
        *self.actor_positions.lock().unwrap() = positions;
    }

    pub fn set_price(&self, instrument_id: &str, price: Decimal) {
        self.prices
            .lock()
            .unwrap()
            .insert(instrument_id.to_string(), price);
    }

    pub fn fail_markets(&self, fail: bool) {
        self.fail_markets.store(fail, Ordering::SeqCst);
    }

    pub fn fail_activity(&self, fail: bool) {
        self.fail_activity.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MarketFeed for FakeFeed {
    async fn list_active_markets(&self) -> Result<Vec<Market>> {
        self.market_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_markets.load(Ordering::SeqCst) {
            anyhow::bail!("market listing unavailable");
        }
        Ok(self.markets.lock().unwrap().clone())
    }

    async fn recent_activity(&self, _actor: &str, limit: usize) -> Result<Vec<ActivityEvent>> {
        if self.fail_activity.load(Ordering::SeqCst) {
            anyhow::bail!("activity unavailable");
        }
        Ok(self
            .activity
            .lock()
            .unwrap()
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn actor_positions(&self, _actor: &str) -> Result<Vec<ActorPosition>> {
        Ok(self.actor_positions.lock().unwrap().clone())
    }

    async fn current_price(&self, instrument_id: &str) -> Result<Option<Decimal>> {
        Ok(self.prices.lock().unwrap().get(instrument_id).copied())
    }
}

/// Records placed orders; can be switched to reject everything.
#[derive(Default)]
pub struct FakeExecutor {
    pub orders: Mutex<Vec<(String, TradeSide, Decimal)>>,
    reject: AtomicBool,
}

impl FakeExecutor {
    pub fn reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.orders.lock().unwrap().len()
    }

    fn record(&self, instrument_id: &str, side: TradeSide, amount: Decimal) -> Result<OrderRef> {
        if self.reject.load(Ordering::SeqCst) {
            anyhow::bail!("order rejected: insufficient liquidity");
        }
        let mut orders = self.orders.lock().unwrap();
        orders.push((instrument_id.to_string(), side, amount));
        Ok(OrderRef(format!("order-{}", orders.len())))
    }
}

#[async_trait]
impl OrderExecutor for FakeExecutor {
    async fn place_marketable(
        &self,
        instrument_id: &str,
        side: TradeSide,
        usdc_amount: Decimal,
    ) -> Result<OrderRef> {
        self.record(instrument_id, side, usdc_amount)
    }

    async fn place_resting(
        &self,
        instrument_id: &str,
        side: TradeSide,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<OrderRef> {
        self.record(instrument_id, side, price * quantity)
    }
}

pub struct FailingBalance;

#[async_trait]
impl BalanceSource for FailingBalance {
    async fn available_capital(&self) -> Result<Decimal> {
        anyhow::bail!("balance unavailable")
    }
}

pub fn activity(
    id: &str,
    token: &str,
    side: &str,
    price: Decimal,
    notional: Decimal,
) -> ActivityEvent {
    let kind = ActivityKind::classify(side);
    ActivityEvent {
        id: id.to_string(),
        actor: "0xtarget".to_string(),
        instrument_id: token.to_string(),
        market_id: format!("cond-{}", token),
        title: format!("Market for {}", token),
        outcome: "Yes".to_string(),
        kind,
        side: if kind == ActivityKind::Exit {
            TradeSide::Sell
        } else {
            TradeSide::Buy
        },
        price,
        notional,
        timestamp: Utc::now(),
    }
}

/// Binary market `id` with tokens `<id>-yes` / `<id>-no` priced at `yes` and `1 - yes`.
pub fn binary_market(id: &str, yes: Decimal) -> Market {
    Market {
        condition_id: format!("0x{}", id),
        tokens: vec![
            OutcomeToken {
                token_id: format!("{}-yes", id),
                outcome: "YES".to_string(),
                price: Some(yes),
            },
            OutcomeToken {
                token_id: format!("{}-no", id),
                outcome: "NO".to_string(),
                price: Some(Decimal::ONE - yes),
            },
        ],
        volume: Decimal::from(10_000),
        liquidity: Decimal::from(5_000),
        ..Market::new(id, format!("Question {}", id))
    }
}
