//! Trading state: configuration, risk ledger, positions, entry guard, audit log.

mod audit;
mod config;
mod guard;
mod positions;
mod risk;

pub use audit::AuditLog;
pub use config::{
    AppConfig, EngineSettings, MirrorConfig, OrderStyle, RiskConfig, SizingConfig, SizingMode,
    ThresholdConfig,
};
pub use guard::{EntryGuard, GuardState};
pub use positions::{CloseKind, ClosedPosition, PositionStore};
pub use risk::{GateDecision, RiskLedger};
