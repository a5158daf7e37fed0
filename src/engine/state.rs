//! Mutable engine state and the status snapshot built from it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::DecisionRecord;
use crate::trading::{AuditLog, EntryGuard, PositionStore, RiskLedger};

/// Running counters for one engine.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    pub entries: u64,
    pub exits: u64,
    pub stop_losses: u64,
    pub take_profits: u64,
    pub skipped: u64,
    pub risk_blocked: u64,
    pub failed: u64,
    pub markets_scanned: u64,
    pub realized_pnl: Decimal,
    pub last_tick: Option<DateTime<Utc>>,
}

/// Everything the tick loop and the control operations mutate.
#[derive(Debug)]
pub(crate) struct TradingState {
    pub ledger: RiskLedger,
    pub positions: PositionStore,
    pub guard: EntryGuard,
    pub audit: AuditLog,
    pub stats: EngineStats,
}

impl TradingState {
    pub fn new(ledger: RiskLedger, audit_capacity: usize) -> Self {
        Self {
            ledger,
            positions: PositionStore::new(),
            guard: EntryGuard::new(),
            audit: AuditLog::new(audit_capacity),
            stats: EngineStats::default(),
        }
    }

    /// Append to the audit log and return the record for publishing.
    pub fn record(&mut self, record: DecisionRecord) -> DecisionRecord {
        self.audit.append(record.clone());
        record
    }
}

/// Point-in-time view of an engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub strategy: String,
    pub description: String,
    pub running: bool,
    pub open_positions: usize,
    pub entries: u64,
    pub exits: u64,
    pub stop_losses: u64,
    pub take_profits: u64,
    pub skipped: u64,
    pub risk_blocked: u64,
    pub failed: u64,
    pub markets_scanned: u64,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub daily_loss: Decimal,
    pub weekly_loss: Decimal,
    pub emergency_stop: bool,
    pub last_tick: Option<DateTime<Utc>>,
}

impl EngineStatus {
    pub(crate) fn build(
        strategy: &str,
        description: &str,
        running: bool,
        state: &TradingState,
    ) -> Self {
        let stats = &state.stats;
        Self {
            strategy: strategy.to_string(),
            description: description.to_string(),
            running,
            open_positions: state.positions.len(),
            entries: stats.entries,
            exits: stats.exits,
            stop_losses: stats.stop_losses,
            take_profits: stats.take_profits,
            skipped: stats.skipped,
            risk_blocked: stats.risk_blocked,
            failed: stats.failed,
            markets_scanned: stats.markets_scanned,
            realized_pnl: stats.realized_pnl,
            unrealized_pnl: state.positions.unrealized_pnl(),
            daily_loss: state.ledger.daily_loss(),
            weekly_loss: state.ledger.weekly_loss(),
            emergency_stop: state.ledger.is_emergency_stopped(),
            last_tick: stats.last_tick,
        }
    }
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== {} Engine ===", self.strategy)?;
        writeln!(f, "Strategy:        {}", self.description)?;
        let status = if self.running { "Running" } else { "Stopped" };
        let halted = if self.emergency_stop { "(EMERGENCY STOP)" } else { "" };
        writeln!(f, "Status:          {} {}", status, halted)?;
        writeln!(f, "Open Positions:  {}", self.open_positions)?;
        writeln!(
            f,
            "Entries:         {} (Exits: {}, Stop-losses: {}, Take-profits: {})",
            self.entries, self.exits, self.stop_losses, self.take_profits
        )?;
        writeln!(
            f,
            "Not Entered:     {} skipped, {} risk-blocked, {} failed",
            self.skipped, self.risk_blocked, self.failed
        )?;
        writeln!(f, "Markets Scanned: {}", self.markets_scanned)?;
        writeln!(f, "Realized P&L:    ${:.2}", self.realized_pnl)?;
        writeln!(f, "Unrealized P&L:  ${:.2}", self.unrealized_pnl)?;
        writeln!(f, "Daily Loss:      ${:.2}", self.daily_loss)?;
        writeln!(f, "Weekly Loss:     ${:.2}", self.weekly_loss)?;
        match self.last_tick {
            Some(at) => writeln!(f, "Last Tick:       {}", at.format("%Y-%m-%d %H:%M:%S UTC"))?,
            None => writeln!(f, "Last Tick:       never")?,
        }
        Ok(())
    }
}
