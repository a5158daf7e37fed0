//! Trade-side primitives and the typed activity records the feed produces.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }

    /// The side that closes a position opened on this side.
    pub fn opposite(&self) -> Self {
        match self {
            TradeSide::Buy => TradeSide::Sell,
            TradeSide::Sell => TradeSide::Buy,
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an activity opens or reduces exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityKind {
    /// Buy / enter: a new exposure we may mirror.
    Entry,
    /// Sell / exit: ignored by the mirror strategy.
    Exit,
    /// Anything else (splits, merges, redemptions, rewards).
    Other,
}

impl ActivityKind {
    /// Classify a raw side/type label as reported by the activity feed.
    pub fn classify(label: &str) -> Self {
        let upper = label.to_uppercase();
        if upper.contains("BUY") || upper.contains("ENTER") {
            ActivityKind::Entry
        } else if upper.contains("SELL") || upper.contains("EXIT") {
            ActivityKind::Exit
        } else {
            ActivityKind::Other
        }
    }
}

/// A single trade event performed by a watched actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Opaque external identifier, used for deduplication
    pub id: String,

    /// Actor (wallet) that performed the trade
    pub actor: String,

    /// Outcome token traded
    pub instrument_id: String,

    /// Market condition ID, when reported
    #[serde(default)]
    pub market_id: String,

    /// Market question, when reported
    #[serde(default)]
    pub title: String,

    /// Outcome label (e.g. "Yes"), when reported
    #[serde(default)]
    pub outcome: String,

    /// Entry, exit, or other
    pub kind: ActivityKind,

    /// Side as reported (kept for the audit trail)
    pub side: TradeSide,

    /// Price per token (0.0 to 1.0)
    pub price: Decimal,

    /// Notional in USDC
    pub notional: Decimal,

    /// When the trade happened
    pub timestamp: DateTime<Utc>,
}

impl ActivityEvent {
    /// Returns true when the event carries enough data to act on.
    pub fn is_actionable(&self) -> bool {
        self.price > Decimal::ZERO
            && self.notional > Decimal::ZERO
            && !self.instrument_id.is_empty()
    }
}

/// A holding in the watched actor's current position snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorPosition {
    pub instrument_id: String,
    pub market_id: String,
    pub title: String,
    pub outcome: String,
    pub size: Decimal,
    pub avg_price: Decimal,
}
