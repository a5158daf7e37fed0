//! Audit records for every decision the engine takes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TradeSide;

/// What the engine did with a signal or a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionAction {
    Entered,
    Skipped,
    RiskBlocked,
    StopLoss,
    TakeProfit,
    Exit,
    Failed,
    EmergencyStop,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionAction::Entered => "ENTERED",
            DecisionAction::Skipped => "SKIPPED",
            DecisionAction::RiskBlocked => "RISK_BLOCKED",
            DecisionAction::StopLoss => "STOP_LOSS",
            DecisionAction::TakeProfit => "TAKE_PROFIT",
            DecisionAction::Exit => "EXIT",
            DecisionAction::Failed => "FAILED",
            DecisionAction::EmergencyStop => "EMERGENCY_STOP",
        }
    }
}

impl std::fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub timestamp: DateTime<Utc>,

    /// Strategy that produced the record ("mirror" or "threshold")
    pub strategy: String,

    pub instrument_id: String,

    /// Market title for display
    pub label: String,

    /// Price observed when the decision was taken
    pub detected_price: Decimal,

    pub side: TradeSide,

    #[serde(default)]
    pub outcome: String,

    /// Proposed (or closed) notional in USDC
    pub size: Decimal,

    /// Notional of the mirrored actor's trade, when mirroring
    #[serde(default)]
    pub reference_size: Option<Decimal>,

    pub action: DecisionAction,

    pub reason: String,
}

impl DecisionRecord {
    /// Record not tied to any instrument (e.g. emergency stop).
    pub fn engine_wide(strategy: &str, action: DecisionAction, reason: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            strategy: strategy.to_string(),
            instrument_id: String::new(),
            label: String::new(),
            detected_price: Decimal::ZERO,
            side: TradeSide::Buy,
            outcome: String::new(),
            size: Decimal::ZERO,
            reference_size: None,
            action,
            reason: reason.into(),
        }
    }
}
