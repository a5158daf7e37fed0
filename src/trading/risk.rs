//! Risk ledger: rolling realized-loss accounting, entry gating and sizing.

use chrono::{Datelike, Local, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tracing::{info, warn};

use super::config::{RiskConfig, SizingConfig, SizingMode};

/// Outcome of an entry gate check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: String,
}

impl GateDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: "OK".to_string(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// ISO (year, week) pair identifying a calendar week.
type WeekKey = (i32, u32);

fn week_of(date: NaiveDate) -> WeekKey {
    let week = date.iso_week();
    (week.year(), week.week())
}

/// Tracks realized losses per day and per ISO week and decides whether new
/// entries are allowed.
///
/// Counters reset lazily: every read or write compares the current local date
/// with the last one seen. Periods only move forward; a clock that steps back
/// keeps the current counters.
#[derive(Debug, Clone)]
pub struct RiskLedger {
    limits: RiskConfig,
    sizing: SizingConfig,
    daily_loss: Decimal,
    weekly_loss: Decimal,
    day: NaiveDate,
    week: WeekKey,
    emergency_stop: bool,
}

impl RiskLedger {
    pub fn new(limits: RiskConfig, sizing: SizingConfig) -> Self {
        Self::starting_on(limits, sizing, Local::now().date_naive())
    }

    /// Ledger whose current period is the one containing `today`.
    pub fn starting_on(limits: RiskConfig, sizing: SizingConfig, today: NaiveDate) -> Self {
        Self {
            limits,
            sizing,
            daily_loss: Decimal::ZERO,
            weekly_loss: Decimal::ZERO,
            day: today,
            week: week_of(today),
            emergency_stop: false,
        }
    }

    pub fn limits(&self) -> &RiskConfig {
        &self.limits
    }

    fn roll(&mut self, today: NaiveDate) {
        if today > self.day {
            if !self.daily_loss.is_zero() {
                info!(previous = %self.day, loss = %self.daily_loss, "Daily loss counter reset");
            }
            self.daily_loss = Decimal::ZERO;
            self.day = today;
        }
        let week = week_of(today);
        if week > self.week {
            if !self.weekly_loss.is_zero() {
                info!(loss = %self.weekly_loss, "Weekly loss counter reset");
            }
            self.weekly_loss = Decimal::ZERO;
            self.week = week;
        }
    }

    /// Check whether a new entry of `proposed_size` is allowed.
    pub fn can_trade(&mut self, proposed_size: Decimal, open_count: usize) -> GateDecision {
        self.can_trade_on(proposed_size, open_count, Local::now().date_naive())
    }

    pub fn can_trade_on(
        &mut self,
        proposed_size: Decimal,
        open_count: usize,
        today: NaiveDate,
    ) -> GateDecision {
        self.roll(today);

        if self.emergency_stop {
            return GateDecision::deny("Emergency stop active");
        }
        if self.daily_loss >= self.limits.daily_loss_limit {
            return GateDecision::deny(format!(
                "Daily loss limit reached: ${} >= ${}",
                self.daily_loss, self.limits.daily_loss_limit
            ));
        }
        if self.weekly_loss >= self.limits.weekly_loss_limit {
            return GateDecision::deny(format!(
                "Weekly loss limit reached: ${} >= ${}",
                self.weekly_loss, self.limits.weekly_loss_limit
            ));
        }
        if open_count >= self.limits.max_open_positions {
            return GateDecision::deny(format!(
                "Max open positions reached: {}/{}",
                open_count, self.limits.max_open_positions
            ));
        }
        if let Some(min) = self.limits.min_trade_size {
            if proposed_size < min {
                return GateDecision::deny(format!(
                    "Trade size ${} below minimum ${}",
                    proposed_size, min
                ));
            }
        }

        GateDecision::allow()
    }

    /// Size an entry in USDC.
    ///
    /// Proportional mode scales the mirrored notional; allocation mode takes a
    /// fraction of capital. The result is capped by the max trade size, the
    /// per-trade risk budget and the capital itself, floored at zero and
    /// truncated to cents so rounding never lifts it over a cap.
    pub fn size_for(&self, target_size: Decimal, available_capital: Decimal) -> Decimal {
        let capital = available_capital.max(Decimal::ZERO);
        let base = match self.sizing.mode {
            SizingMode::Proportional => target_size * self.sizing.copy_ratio,
            SizingMode::Allocation => capital * self.sizing.allocation_pct,
        };

        base.min(self.sizing.max_trade_size)
            .min(capital * self.sizing.max_risk_per_trade_pct)
            .min(capital)
            .max(Decimal::ZERO)
            .round_dp_with_strategy(2, RoundingStrategy::ToZero)
    }

    /// Credit a realized loss. Non-positive amounts are ignored.
    pub fn record_loss(&mut self, amount: Decimal) {
        self.record_loss_on(amount, Local::now().date_naive());
    }

    pub fn record_loss_on(&mut self, amount: Decimal, today: NaiveDate) {
        if amount <= Decimal::ZERO {
            return;
        }
        self.roll(today);
        self.daily_loss += amount;
        self.weekly_loss += amount;

        if self.daily_loss >= self.limits.daily_loss_limit {
            warn!(
                daily_loss = %self.daily_loss,
                limit = %self.limits.daily_loss_limit,
                "Daily loss limit reached"
            );
        }
    }

    pub fn trigger_emergency_stop(&mut self) {
        self.emergency_stop = true;
    }

    pub fn is_emergency_stopped(&self) -> bool {
        self.emergency_stop
    }

    pub fn daily_loss(&self) -> Decimal {
        self.daily_loss_on(Local::now().date_naive())
    }

    pub fn weekly_loss(&self) -> Decimal {
        self.weekly_loss_on(Local::now().date_naive())
    }

    /// Daily loss as it would read on `today`, without rolling the period.
    pub fn daily_loss_on(&self, today: NaiveDate) -> Decimal {
        if today <= self.day {
            self.daily_loss
        } else {
            Decimal::ZERO
        }
    }

    pub fn weekly_loss_on(&self, today: NaiveDate) -> Decimal {
        if week_of(today) <= self.week {
            self.weekly_loss
        } else {
            Decimal::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn limits() -> RiskConfig {
        RiskConfig {
            daily_loss_limit: dec!(100),
            weekly_loss_limit: dec!(300),
            max_open_positions: 3,
            min_trade_size: Some(dec!(5)),
        }
    }

    fn ledger_on(today: NaiveDate) -> RiskLedger {
        RiskLedger::starting_on(limits(), SizingConfig::default(), today)
    }

    #[test]
    fn test_size_respects_caps() {
        let ledger = ledger_on(date(2024, 6, 5));

        // 10% of a $500 trade = $50, capped at 5% of $1000 = $50
        assert_eq!(ledger.size_for(dec!(500), dec!(1000)), dec!(50));
        // 10% of $100 = $10
        assert_eq!(ledger.size_for(dec!(100), dec!(1000)), dec!(10));
        // Max trade size $200 applies before the risk cap on a large account
        assert_eq!(ledger.size_for(dec!(10000), dec!(100000)), dec!(200));
        // Never more than capital, never negative
        assert_eq!(ledger.size_for(dec!(500), dec!(0)), dec!(0));
        assert_eq!(ledger.size_for(dec!(-50), dec!(1000)), dec!(0));
        // Rounded to cents
        assert_eq!(ledger.size_for(dec!(33.333), dec!(1000)), dec!(3.33));
    }

    #[test]
    fn test_size_property_bounds() {
        let ledger = ledger_on(date(2024, 6, 5));
        for target in [dec!(0), dec!(1), dec!(77.7), dec!(5000)] {
            for capital in [dec!(0), dec!(10), dec!(999.99), dec!(1000000)] {
                let size = ledger.size_for(target, capital);
                assert!(size >= Decimal::ZERO);
                assert!(size <= dec!(200));
                assert!(size <= capital);
                assert!(size <= capital * dec!(0.05));
            }
        }
    }

    #[test]
    fn test_size_truncates_below_risk_cap() {
        let ledger = ledger_on(date(2024, 6, 5));
        // Risk cap is 1000.30 x 5% = 50.015; half-up would give 50.02
        let size = ledger.size_for(dec!(10000), dec!(1000.30));
        assert_eq!(size, dec!(50.01));
        assert!(size <= dec!(1000.30) * dec!(0.05));
        // 10% of 33.339 = 3.3339
        assert_eq!(ledger.size_for(dec!(33.339), dec!(1000)), dec!(3.33));
    }

    #[test]
    fn test_allocation_mode() {
        let sizing = SizingConfig {
            mode: SizingMode::Allocation,
            allocation_pct: dec!(0.5),
            max_risk_per_trade_pct: dec!(1),
            max_trade_size: dec!(10000),
            ..Default::default()
        };
        let ledger = RiskLedger::starting_on(limits(), sizing, date(2024, 6, 5));
        assert_eq!(ledger.size_for(dec!(1), dec!(400)), dec!(200));
    }

    #[test]
    fn test_gate_order() {
        let today = date(2024, 6, 5);
        let mut ledger = ledger_on(today);

        assert!(ledger.can_trade_on(dec!(10), 0, today).allowed);

        let denied = ledger.can_trade_on(dec!(4), 0, today);
        assert!(!denied.allowed);
        assert!(denied.reason.contains("minimum"));

        let denied = ledger.can_trade_on(dec!(10), 3, today);
        assert!(denied.reason.contains("Max open positions"));

        ledger.trigger_emergency_stop();
        let denied = ledger.can_trade_on(dec!(10), 0, today);
        assert!(!denied.allowed);
        assert!(denied.reason.contains("Emergency"));
    }

    #[test]
    fn test_daily_limit_blocks() {
        let today = date(2024, 6, 5);
        let mut ledger = ledger_on(today);

        ledger.record_loss_on(dec!(60), today);
        assert!(ledger.can_trade_on(dec!(10), 0, today).allowed);

        ledger.record_loss_on(dec!(50), today);
        assert_eq!(ledger.daily_loss_on(today), dec!(110));

        let denied = ledger.can_trade_on(dec!(10), 0, today);
        assert!(!denied.allowed);
        assert!(denied.reason.contains("Daily loss limit"));
    }

    #[test]
    fn test_non_positive_losses_ignored() {
        let today = date(2024, 6, 5);
        let mut ledger = ledger_on(today);
        ledger.record_loss_on(dec!(0), today);
        ledger.record_loss_on(dec!(-25), today);
        assert_eq!(ledger.daily_loss_on(today), dec!(0));
        assert_eq!(ledger.weekly_loss_on(today), dec!(0));
    }

    #[test]
    fn test_period_rollover() {
        // 2024-06-05 is a Wednesday; 2024-06-10 starts the next ISO week
        let wed = date(2024, 6, 5);
        let thu = date(2024, 6, 6);
        let next_mon = date(2024, 6, 10);
        let mut ledger = ledger_on(wed);

        ledger.record_loss_on(dec!(40), wed);
        ledger.record_loss_on(dec!(30), thu);
        assert_eq!(ledger.daily_loss_on(thu), dec!(30));
        assert_eq!(ledger.weekly_loss_on(thu), dec!(70));

        // A second read on the same day does not reset again
        assert!(ledger.can_trade_on(dec!(10), 0, thu).allowed);
        assert_eq!(ledger.daily_loss_on(thu), dec!(30));

        ledger.record_loss_on(dec!(5), next_mon);
        assert_eq!(ledger.daily_loss_on(next_mon), dec!(5));
        assert_eq!(ledger.weekly_loss_on(next_mon), dec!(5));
    }

    #[test]
    fn test_clock_stepping_back_keeps_counters() {
        let thu = date(2024, 6, 6);
        let wed = date(2024, 6, 5);
        let prev_fri = date(2024, 5, 31);
        let mut ledger = ledger_on(thu);
        ledger.record_loss_on(dec!(80), thu);

        assert!(ledger.can_trade_on(dec!(10), 0, wed).allowed);
        assert_eq!(ledger.daily_loss_on(thu), dec!(80));
        assert_eq!(ledger.daily_loss_on(wed), dec!(80));

        // Previous ISO week does not zero the weekly counter either
        ledger.record_loss_on(dec!(30), prev_fri);
        assert_eq!(ledger.daily_loss_on(thu), dec!(110));
        assert_eq!(ledger.weekly_loss_on(thu), dec!(110));
        let denied = ledger.can_trade_on(dec!(10), 0, prev_fri);
        assert!(denied.reason.contains("Daily loss limit"));
    }

    #[test]
    fn test_week_uses_iso_year() {
        // 2024-12-30 belongs to ISO week 1 of 2025, same as 2025-01-02
        let mon = date(2024, 12, 30);
        let thu = date(2025, 1, 2);
        let mut ledger = ledger_on(mon);
        ledger.record_loss_on(dec!(50), mon);
        ledger.record_loss_on(dec!(20), thu);
        assert_eq!(ledger.weekly_loss_on(thu), dec!(70));
        assert_eq!(ledger.daily_loss_on(thu), dec!(20));
    }

    #[test]
    fn test_weekly_limit_blocks_after_daily_resets() {
        let mut ledger = ledger_on(date(2024, 6, 3));
        for day in 3..=6 {
            ledger.record_loss_on(dec!(90), date(2024, 6, day));
        }
        let friday = date(2024, 6, 7);
        let denied = ledger.can_trade_on(dec!(10), 0, friday);
        assert!(!denied.allowed);
        assert!(denied.reason.contains("Weekly loss limit"));
    }
}
