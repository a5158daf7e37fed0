//! Position model representing one of our own open exposures.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TradeSide;

/// An open position held by one of our strategies.
///
/// Entry price, size and trigger prices are fixed when the position opens;
/// only `current_price` and `unrealized_pnl` change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Outcome token held
    pub instrument_id: String,

    /// Market condition ID
    #[serde(default)]
    pub market_id: String,

    /// Market title for display
    #[serde(default)]
    pub label: String,

    /// Outcome label (e.g. "Yes", "No")
    #[serde(default)]
    pub outcome: String,

    pub side: TradeSide,

    /// Entry price per token (0.0 to 1.0)
    pub entry_price: Decimal,

    /// Notional size in USDC
    pub size: Decimal,

    pub opened_at: DateTime<Utc>,

    /// Last observed market price per token
    pub current_price: Decimal,

    /// Unrealized P&L in USDC
    #[serde(default)]
    pub unrealized_pnl: Decimal,

    /// Price at which the stop-loss fires
    pub stop_loss_price: Decimal,

    /// Price at which the take-profit fires, when one is set
    #[serde(default)]
    pub take_profit_price: Option<Decimal>,

    /// Observed price that caused the entry
    pub trigger_price: Decimal,

    /// External order reference
    #[serde(default)]
    pub order_ref: String,
}

impl Position {
    /// Update position P&L based on current market price.
    pub fn update_price(&mut self, current_price: Decimal) {
        self.current_price = current_price;
        self.unrealized_pnl = self.pnl_at(current_price);
    }

    /// P&L if the position were valued at `price`.
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        if self.entry_price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (price - self.entry_price) * self.shares()
    }

    /// Number of outcome tokens implied by the notional size.
    pub fn shares(&self) -> Decimal {
        if self.entry_price.is_zero() {
            Decimal::ZERO
        } else {
            self.size / self.entry_price
        }
    }

    /// Whether the stop-loss trigger has been reached at the current price.
    pub fn stop_loss_hit(&self) -> bool {
        match self.side {
            TradeSide::Buy => self.current_price <= self.stop_loss_price,
            TradeSide::Sell => self.current_price >= self.stop_loss_price,
        }
    }

    /// Whether the take-profit trigger has been reached at the current price.
    pub fn take_profit_hit(&self) -> bool {
        self.take_profit_price
            .is_some_and(|tp| self.current_price >= tp)
    }
}
