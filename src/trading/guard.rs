//! Entry guard: blocks re-entry on held instruments and cools down failed ones.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// A position is open; re-entry is blocked until it exits
    Open,
    /// The last order failed; blocked until `until`
    CoolingDown { until: DateTime<Utc> },
}

#[derive(Debug, Clone, Default)]
pub struct EntryGuard {
    entries: HashMap<String, GuardState>,
}

impl EntryGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a new entry on `instrument_id` is currently suppressed.
    pub fn blocked(&self, instrument_id: &str, now: DateTime<Utc>) -> bool {
        match self.entries.get(instrument_id) {
            Some(GuardState::Open) => true,
            Some(GuardState::CoolingDown { until }) => now < *until,
            None => false,
        }
    }

    pub fn state(&self, instrument_id: &str) -> Option<GuardState> {
        self.entries.get(instrument_id).copied()
    }

    pub fn mark_open(&mut self, instrument_id: &str) {
        self.entries.insert(instrument_id.to_string(), GuardState::Open);
    }

    pub fn mark_failed(&mut self, instrument_id: &str, now: DateTime<Utc>, cooldown: Duration) {
        self.entries.insert(
            instrument_id.to_string(),
            GuardState::CoolingDown {
                until: now + cooldown,
            },
        );
    }

    /// Forget an instrument after its position exited.
    pub fn clear(&mut self, instrument_id: &str) {
        self.entries.remove(instrument_id);
    }

    /// Drop expired cooldowns.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        self.entries.retain(|_, state| match state {
            GuardState::Open => true,
            GuardState::CoolingDown { until } => now < *until,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_expires() {
        let now = Utc::now();
        let mut guard = EntryGuard::new();
        guard.mark_failed("tok", now, Duration::minutes(5));

        assert!(guard.blocked("tok", now));
        assert!(guard.blocked("tok", now + Duration::minutes(4)));
        assert!(!guard.blocked("tok", now + Duration::minutes(5)));

        guard.prune(now + Duration::minutes(6));
        assert!(guard.is_empty());
    }

    #[test]
    fn test_open_blocks_until_cleared() {
        let now = Utc::now();
        let mut guard = EntryGuard::new();
        guard.mark_open("tok");

        assert!(guard.blocked("tok", now + Duration::days(30)));
        guard.prune(now + Duration::days(30));
        assert_eq!(guard.state("tok"), Some(GuardState::Open));

        guard.clear("tok");
        assert!(!guard.blocked("tok", now));
        assert!(!guard.blocked("other", now));
    }
}
