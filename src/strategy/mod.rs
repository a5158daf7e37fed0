//! Signal sources: turn feed data into candidate entries for the decision engine.

mod mirror;
mod threshold;

pub use mirror::MirrorSource;
pub use threshold::ThresholdSource;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::api::MarketFeed;
use crate::error::EngineError;
use crate::models::{DecisionAction, TradeSide};
use crate::trading::EntryGuard;

/// Which strategy an engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Mirror,
    Threshold,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Mirror => "mirror",
            StrategyKind::Threshold => "threshold",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the engine should size a candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeRequest {
    /// Scale the mirrored trade's notional through the risk ledger
    Mirror { target_notional: Decimal },
    /// Use this USDC amount as-is
    Fixed(Decimal),
}

/// How the engine should place a candidate's order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderPlan {
    /// Cross the book for the sized USDC amount
    Marketable,
    /// Rest a limit order; quantity is derived from the final size
    Resting { price: Decimal },
}

/// A proposed entry produced by a signal source.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Instrument to trade (may differ from the one that triggered)
    pub instrument_id: String,
    pub market_id: String,
    pub label: String,
    pub outcome: String,
    pub side: TradeSide,
    /// Price observed on the triggering instrument
    pub detected_price: Decimal,
    /// Expected entry price on the traded instrument
    pub entry_price: Decimal,
    pub size: SizeRequest,
    pub order: OrderPlan,
    pub rationale: String,
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Option<Decimal>,
    /// Notional of the mirrored trade, when mirroring
    pub reference_size: Option<Decimal>,
}

/// Read-only inputs available to a scan.
pub struct ScanContext<'a> {
    pub feed: &'a dyn MarketFeed,
    /// Snapshot of the entry guard taken at the start of the tick
    pub guard: &'a EntryGuard,
    pub now: DateTime<Utc>,
    /// Deadline for each feed call
    pub call_timeout: Duration,
}

/// Result of one scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub candidates: Vec<Candidate>,
    /// Markets (or activity events) examined
    pub scanned: usize,
}

/// A strategy that proposes entries.
#[async_trait]
pub trait SignalSource: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// One-line description for status output.
    fn describe(&self) -> String;

    /// Reject configurations the strategy cannot run with.
    fn validate(&self) -> Result<(), EngineError>;

    /// Audit action recorded when the risk gate denies a candidate.
    fn denial_action(&self) -> DecisionAction;

    /// Time between ticks.
    fn interval(&self) -> Duration;

    async fn scan(&mut self, ctx: &ScanContext<'_>) -> Result<ScanReport>;
}
