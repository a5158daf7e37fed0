//! Data models for markets, trade activity, positions, and decisions.

mod decision;
mod market;
mod position;
mod trade;

pub use decision::{DecisionAction, DecisionRecord};
pub use market::{Market, OutcomeToken};
pub use position::Position;
pub use trade::{ActivityEvent, ActivityKind, ActorPosition, TradeSide};
