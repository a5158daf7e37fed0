//! Open position store with live P&L and exit detection.

use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::models::{DecisionAction, Position};

/// Why a position left the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    StopLoss,
    TakeProfit,
    /// Operator closed it manually
    Manual,
    /// Liquidated in accounting by an emergency stop
    Emergency,
}

impl CloseKind {
    pub fn action(&self) -> DecisionAction {
        match self {
            CloseKind::StopLoss => DecisionAction::StopLoss,
            CloseKind::TakeProfit => DecisionAction::TakeProfit,
            CloseKind::Manual => DecisionAction::Exit,
            CloseKind::Emergency => DecisionAction::EmergencyStop,
        }
    }
}

/// A position that was removed from the store, with its realized result.
#[derive(Debug, Clone)]
pub struct ClosedPosition {
    pub position: Position,
    pub kind: CloseKind,
    pub exit_price: Decimal,
    pub realized_pnl: Decimal,
}

impl ClosedPosition {
    fn new(position: Position, kind: CloseKind) -> Self {
        let exit_price = position.current_price;
        let realized_pnl = position.pnl_at(exit_price);
        Self {
            position,
            kind,
            exit_price,
            realized_pnl,
        }
    }

    /// Realized loss as a positive amount, zero for winners.
    pub fn loss(&self) -> Decimal {
        (-self.realized_pnl).max(Decimal::ZERO)
    }
}

/// Open positions keyed by instrument ID; at most one per instrument.
#[derive(Debug, Clone, Default)]
pub struct PositionStore {
    positions: HashMap<String, Position>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new position. Returns `None` (and leaves the store
    /// unchanged) when one is already open on the instrument.
    pub fn open(&mut self, position: Position) -> Option<&Position> {
        use std::collections::hash_map::Entry;

        match self.positions.entry(position.instrument_id.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => Some(slot.insert(position)),
        }
    }

    pub fn contains(&self, instrument_id: &str) -> bool {
        self.positions.contains_key(instrument_id)
    }

    pub fn get(&self, instrument_id: &str) -> Option<&Position> {
        self.positions.get(instrument_id)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn instrument_ids(&self) -> Vec<String> {
        self.positions.keys().cloned().collect()
    }

    /// Update current prices; instruments without a price keep their last one.
    pub fn refresh<F>(&mut self, mut lookup: F)
    where
        F: FnMut(&str) -> Option<Decimal>,
    {
        for (instrument_id, position) in self.positions.iter_mut() {
            if let Some(price) = lookup(instrument_id) {
                position.update_price(price);
            }
        }
    }

    /// Remove and return every position whose stop-loss or take-profit fired.
    ///
    /// Stop-loss is checked first; a position exits at most once per call.
    pub fn check_exits(&mut self) -> Vec<ClosedPosition> {
        let fired: Vec<(String, CloseKind)> = self
            .positions
            .values()
            .filter_map(|p| {
                if p.stop_loss_hit() {
                    Some((p.instrument_id.clone(), CloseKind::StopLoss))
                } else if p.take_profit_hit() {
                    Some((p.instrument_id.clone(), CloseKind::TakeProfit))
                } else {
                    None
                }
            })
            .collect();

        fired
            .into_iter()
            .filter_map(|(id, kind)| self.close(&id, kind))
            .collect()
    }

    /// Remove one position at its last known price.
    pub fn close(&mut self, instrument_id: &str, kind: CloseKind) -> Option<ClosedPosition> {
        self.positions
            .remove(instrument_id)
            .map(|p| ClosedPosition::new(p, kind))
    }

    /// Remove every position at its last known price, oldest first.
    pub fn drain(&mut self, kind: CloseKind) -> Vec<ClosedPosition> {
        let mut closed: Vec<ClosedPosition> = self
            .positions
            .drain()
            .map(|(_, p)| ClosedPosition::new(p, kind))
            .collect();
        closed.sort_by_key(|c| c.position.opened_at);
        closed
    }

    /// Copies of all open positions, oldest first.
    pub fn snapshot(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.positions.values().cloned().collect();
        positions.sort_by_key(|p| p.opened_at);
        positions
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.positions.values().map(|p| p.unrealized_pnl).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TradeSide;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn position(id: &str, entry: Decimal, stop: Decimal, tp: Option<Decimal>) -> Position {
        Position {
            instrument_id: id.to_string(),
            market_id: "0xmarket".to_string(),
            label: "Will it rain?".to_string(),
            outcome: "Yes".to_string(),
            side: TradeSide::Buy,
            entry_price: entry,
            size: dec!(50),
            opened_at: Utc::now(),
            current_price: entry,
            unrealized_pnl: Decimal::ZERO,
            stop_loss_price: stop,
            take_profit_price: tp,
            trigger_price: entry,
            order_ref: "paper".to_string(),
        }
    }

    #[test]
    fn test_no_duplicates() {
        let mut store = PositionStore::new();
        assert!(store.open(position("a", dec!(0.5), dec!(0.4), None)).is_some());
        assert!(store.open(position("a", dec!(0.6), dec!(0.5), None)).is_none());
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a").unwrap().entry_price, dec!(0.5));
    }

    #[test]
    fn test_refresh_and_stop_loss() {
        let mut store = PositionStore::new();
        store.open(position("a", dec!(0.50), dec!(0.40), None));
        store.open(position("b", dec!(0.50), dec!(0.40), None));

        store.refresh(|id| if id == "a" { Some(dec!(0.45)) } else { None });
        assert_eq!(store.get("a").unwrap().unrealized_pnl, dec!(-5));
        assert_eq!(store.get("b").unwrap().current_price, dec!(0.50));
        assert!(store.check_exits().is_empty());

        store.refresh(|id| if id == "a" { Some(dec!(0.40)) } else { None });
        let closed = store.check_exits();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].kind, CloseKind::StopLoss);
        assert_eq!(closed[0].realized_pnl, dec!(-10));
        assert_eq!(closed[0].loss(), dec!(10));
        assert!(!store.contains("a"));
        assert!(store.contains("b"));
    }

    #[test]
    fn test_take_profit() {
        let mut store = PositionStore::new();
        store.open(position("a", dec!(0.10), dec!(0.085), Some(dec!(0.105))));
        store.refresh(|_| Some(dec!(0.11)));

        let closed = store.check_exits();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].kind, CloseKind::TakeProfit);
        assert_eq!(closed[0].loss(), Decimal::ZERO);
        assert!(store.is_empty());
    }

    #[test]
    fn test_stop_loss_wins_over_take_profit() {
        let mut store = PositionStore::new();
        // Degenerate triggers where both fire at once
        store.open(position("a", dec!(0.50), dec!(0.60), Some(dec!(0.55))));
        store.refresh(|_| Some(dec!(0.58)));

        let closed = store.check_exits();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].kind, CloseKind::StopLoss);
    }

    #[test]
    fn test_drain_and_snapshot_order() {
        let mut store = PositionStore::new();
        let mut older = position("old", dec!(0.5), dec!(0.4), None);
        older.opened_at = Utc::now() - Duration::minutes(10);
        store.open(position("new", dec!(0.5), dec!(0.4), None));
        store.open(older);

        let snapshot = store.snapshot();
        assert_eq!(snapshot[0].instrument_id, "old");

        let closed = store.drain(CloseKind::Emergency);
        assert_eq!(closed.len(), 2);
        assert_eq!(closed[0].position.instrument_id, "old");
        assert_eq!(closed[0].kind.action(), DecisionAction::EmergencyStop);
        assert!(store.is_empty());
    }
}
