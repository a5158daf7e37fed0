//! Decision engine: the periodic loop that turns signals into positions.
//!
//! Each tick:
//! - Scans the signal source for candidate entries
//! - Sizes and gates every candidate through the risk ledger
//! - Places orders for allowed candidates and registers positions
//! - Refreshes prices of open positions and closes those whose exit fired
//! - Records every outcome in the audit log and publishes it to listeners

mod events;
mod state;

pub use events::{ChannelListener, EngineEvent, EventListener, LogListener, StatusMessage};
pub use state::{EngineStats, EngineStatus};

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use futures::FutureExt;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::api::{with_timeout, BalanceSource, MarketFeed, OrderExecutor, OrderRef};
use crate::error::EngineError;
use crate::models::{DecisionAction, DecisionRecord, Position, TradeSide};
use crate::strategy::{Candidate, OrderPlan, ScanContext, SignalSource, SizeRequest, StrategyKind};
use crate::trading::{CloseKind, ClosedPosition, EngineSettings, RiskLedger};

use state::TradingState;

/// Highest take-profit trigger price.
const MAX_TAKE_PROFIT: Decimal = dec!(0.99);

/// External services an engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub feed: Arc<dyn MarketFeed>,
    pub executor: Arc<dyn OrderExecutor>,
    pub balance: Arc<dyn BalanceSource>,
}

/// Engine-level settings that are not part of a strategy's config.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub settings: EngineSettings,
    /// Capital assumed when the balance source fails
    pub fallback_capital: Decimal,
    /// How long an instrument is suppressed after a failed order
    pub cooldown: chrono::Duration,
}

impl EngineOptions {
    fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.call_timeout_secs.max(1))
    }
}

/// State visible to both the loop task and the handle.
struct Shared {
    state: RwLock<TradingState>,
    running: AtomicBool,
    /// Bumped on every start so a stale loop exits after a restart
    generation: AtomicU64,
    wake: Notify,
    listeners: Vec<Arc<dyn EventListener>>,
    strategy: StrategyKind,
    description: String,
    liquidate_on_emergency_stop: bool,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.running.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == generation
    }

    /// Deliver events in order. Must be called without the state lock held.
    fn publish(&self, events: Vec<EngineEvent>) {
        for event in &events {
            for listener in &self.listeners {
                listener.on_event(event);
            }
        }
    }

    fn status(&self, message: impl Into<String>) -> EngineEvent {
        EngineEvent::Status(StatusMessage::new(self.strategy.as_str(), message))
    }
}

/// Parts of the engine only the tick touches; guarded by an async mutex so
/// ticks never overlap.
struct EngineCore<S> {
    source: S,
    collab: Collaborators,
    options: EngineOptions,
}

/// Handle to one strategy's engine.
pub struct DecisionEngine<S: SignalSource + 'static> {
    shared: Arc<Shared>,
    core: Arc<Mutex<EngineCore<S>>>,
    interval: Duration,
}

impl<S: SignalSource + 'static> DecisionEngine<S> {
    /// Build a stopped engine. Fails when the strategy config is unusable.
    pub fn new(
        source: S,
        ledger: RiskLedger,
        collab: Collaborators,
        options: EngineOptions,
        listeners: Vec<Arc<dyn EventListener>>,
    ) -> Result<Self, EngineError> {
        source.validate()?;
        ledger.limits().validate()?;

        let interval = source.interval();
        if interval.is_zero() {
            return Err(EngineError::invalid("interval", "must be at least 1 second"));
        }

        let shared = Shared {
            state: RwLock::new(TradingState::new(ledger, options.settings.audit_capacity)),
            running: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            wake: Notify::new(),
            listeners,
            strategy: source.kind(),
            description: source.describe(),
            liquidate_on_emergency_stop: options.settings.liquidate_on_emergency_stop,
        };

        Ok(Self {
            shared: Arc::new(shared),
            core: Arc::new(Mutex::new(EngineCore {
                source,
                collab,
                options,
            })),
            interval,
        })
    }

    pub fn strategy(&self) -> StrategyKind {
        self.shared.strategy
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Spawn the tick loop. The first tick runs immediately.
    pub fn start(&self) -> Result<(), EngineError> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyRunning);
        }
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        info!(
            strategy = %self.shared.strategy,
            interval = ?self.interval,
            "Starting engine loop"
        );
        self.shared.publish(vec![self.shared.status(format!(
            "Engine started: {}",
            self.shared.description
        ))]);

        tokio::spawn(run_loop(
            self.shared.clone(),
            self.core.clone(),
            self.interval,
            generation,
        ));
        Ok(())
    }

    /// Stop the loop; an in-flight tick finishes first.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.wake.notify_one();
        info!(strategy = %self.shared.strategy, "Engine stopped");
        self.shared.publish(vec![self.shared.status("Engine stopped")]);
    }

    /// Halt the loop and block every future entry until the engine is rebuilt.
    ///
    /// When configured, open positions are liquidated in accounting only; no
    /// orders are sent. Dedup and cooldown state is kept.
    pub async fn emergency_stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.wake.notify_one();

        let strategy = self.shared.strategy.as_str();

        let mut events = Vec::new();
        {
            let mut state = self.shared.state.write().await;
            state.ledger.trigger_emergency_stop();

            if self.shared.liquidate_on_emergency_stop {
                let liquidated = state.positions.drain(CloseKind::Emergency);
                for closed in liquidated {
                    let record = apply_close(&mut state, strategy, closed);
                    events.push(EngineEvent::Decision(record));
                }
            }
            let open = state.positions.len();
            let record = state.record(DecisionRecord::engine_wide(
                strategy,
                DecisionAction::EmergencyStop,
                format!("Emergency stop triggered ({} positions still open)", open),
            ));
            events.push(EngineEvent::Decision(record));
        }

        warn!(strategy, "EMERGENCY STOP");
        events.push(self.shared.status("Emergency stop: trading halted"));
        self.shared.publish(events);
    }

    /// Close one position manually at its last known price (accounting only).
    pub async fn close_position(&self, instrument_id: &str) -> Option<ClosedPosition> {
        let strategy = self.shared.strategy.as_str();
        let (closed, record) = {
            let mut state = self.shared.state.write().await;
            let closed = state.positions.close(instrument_id, CloseKind::Manual)?;
            let record = apply_close(&mut state, strategy, closed.clone());
            (closed, record)
        };
        self.shared.publish(vec![EngineEvent::Decision(record)]);
        Some(closed)
    }

    pub async fn status(&self) -> EngineStatus {
        let state = self.shared.state.read().await;
        EngineStatus::build(
            self.shared.strategy.as_str(),
            &self.shared.description,
            self.is_running(),
            &state,
        )
    }

    /// Open positions, oldest first.
    pub async fn positions(&self) -> Vec<Position> {
        self.shared.state.read().await.positions.snapshot()
    }

    /// Most recent decisions first, at most `limit`.
    pub async fn decisions(&self, limit: usize) -> Vec<DecisionRecord> {
        self.shared.state.read().await.audit.recent(limit)
    }

    /// Run one tick on the caller's task, outside the loop.
    #[cfg(test)]
    pub async fn tick_once(&self) -> Result<()> {
        let mut core = self.core.lock().await;
        core.tick(&self.shared).await
    }
}

impl<S: SignalSource + 'static> Drop for DecisionEngine<S> {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.wake.notify_one();
    }
}

async fn run_loop<S: SignalSource + 'static>(
    shared: Arc<Shared>,
    core: Arc<Mutex<EngineCore<S>>>,
    period: Duration,
    generation: u64,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shared.wake.notified() => {}
        }
        if !shared.is_current(generation) {
            break;
        }

        let mut core = core.lock().await;
        if !shared.is_current(generation) {
            break;
        }

        match AssertUnwindSafe(core.tick(&shared)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(strategy = %shared.strategy, error = %e, "Error in engine tick");
                shared.publish(vec![shared.status(format!("Tick failed: {:#}", e))]);
            }
            Err(_) => {
                error!(strategy = %shared.strategy, "Engine tick panicked");
                shared.publish(vec![shared.status("Tick failed: internal error")]);
            }
        }
    }

    debug!(strategy = %shared.strategy, generation, "Engine loop exited");
}

impl<S: SignalSource> EngineCore<S> {
    /// Single iteration of the engine loop.
    async fn tick(&mut self, shared: &Shared) -> Result<()> {
        let now = Utc::now();
        let call_timeout = self.options.call_timeout();

        // 1. Scan against a snapshot of the guard
        let guard = {
            let mut state = shared.state.write().await;
            state.guard.prune(now);
            state.guard.clone()
        };
        let ctx = ScanContext {
            feed: self.collab.feed.as_ref(),
            guard: &guard,
            now,
            call_timeout,
        };
        let (candidates, scan_error) = match self.source.scan(&ctx).await {
            Ok(report) => {
                shared.state.write().await.stats.markets_scanned += report.scanned as u64;
                (report.candidates, None)
            }
            Err(e) => (Vec::new(), Some(e)),
        };

        // 2. Gate, size and execute
        if !candidates.is_empty() {
            debug!(count = candidates.len(), "Processing candidates");
        }
        let mut capital = None;
        for candidate in candidates {
            let events = self.process(candidate, &mut capital, shared).await;
            shared.publish(events);
        }

        // 3. Refresh prices and close positions whose exit fired
        let events = self.refresh_and_exit(shared).await;
        shared.publish(events);

        shared.state.write().await.stats.last_tick = Some(Utc::now());

        match scan_error {
            Some(e) => Err(e.context("Signal scan failed")),
            None => Ok(()),
        }
    }

    async fn available_capital(&self) -> Decimal {
        match with_timeout(
            self.options.call_timeout(),
            "balance lookup",
            self.collab.balance.available_capital(),
        )
        .await
        {
            Ok(capital) => capital,
            Err(e) => {
                warn!(
                    error = %e,
                    fallback = %self.options.fallback_capital,
                    "Balance unavailable, using configured capital"
                );
                self.options.fallback_capital
            }
        }
    }

    /// Size, gate and (if allowed) execute one candidate.
    async fn process(
        &self,
        candidate: Candidate,
        capital: &mut Option<Decimal>,
        shared: &Shared,
    ) -> Vec<EngineEvent> {
        let strategy = self.source.kind().as_str();
        let id = candidate.instrument_id.as_str();

        {
            let mut state = shared.state.write().await;
            let duplicate = if state.positions.contains(id) {
                Some("Position already open on this instrument")
            } else if state.guard.blocked(id, Utc::now()) {
                Some("Instrument cooling down after a failed order")
            } else {
                None
            };
            if let Some(reason) = duplicate {
                state.stats.skipped += 1;
                let size = candidate.reference_size.unwrap_or_default();
                let skipped = decision(strategy, &candidate, size, DecisionAction::Skipped, reason);
                let record = state.record(skipped);
                return vec![EngineEvent::Decision(record)];
            }
        }

        let size = match candidate.size {
            SizeRequest::Fixed(size) => size,
            SizeRequest::Mirror { target_notional } => {
                let available = match *capital {
                    Some(c) => c,
                    None => {
                        let c = self.available_capital().await;
                        *capital = Some(c);
                        c
                    }
                };
                shared.state.read().await.ledger.size_for(target_notional, available)
            }
        };

        {
            let mut state = shared.state.write().await;
            let open = state.positions.len();
            let gate = if size <= Decimal::ZERO {
                crate::trading::GateDecision::deny("Computed trade size is zero")
            } else {
                state.ledger.can_trade(size, open)
            };
            if !gate.allowed {
                let action = self.source.denial_action();
                match action {
                    DecisionAction::RiskBlocked => state.stats.risk_blocked += 1,
                    _ => state.stats.skipped += 1,
                }
                let denied = decision(strategy, &candidate, size, action, gate.reason);
                let record = state.record(denied);
                return vec![EngineEvent::Decision(record)];
            }
        }

        // No lock held across the order call
        let call_timeout = self.options.call_timeout();
        let executor = &self.collab.executor;
        let (placed, entry_price) = match candidate.order {
            OrderPlan::Marketable => (
                with_timeout(
                    call_timeout,
                    "order placement",
                    executor.place_marketable(id, candidate.side, size),
                )
                .await,
                candidate.entry_price,
            ),
            OrderPlan::Resting { price } => {
                let quantity = (size / price).round_dp(2);
                (
                    with_timeout(
                        call_timeout,
                        "order placement",
                        executor.place_resting(id, candidate.side, price, quantity),
                    )
                    .await,
                    price,
                )
            }
        };

        let mut state = shared.state.write().await;
        let record = match placed {
            Ok(order_ref) => {
                info!(
                    strategy,
                    instrument = id,
                    market = %candidate.label,
                    size = %size,
                    price = %entry_price,
                    order_ref = %order_ref,
                    "Entry placed"
                );
                let position = open_position(&candidate, entry_price, size, order_ref);
                if state.positions.open(position).is_none() {
                    state.stats.skipped += 1;
                    decision(
                        strategy,
                        &candidate,
                        size,
                        DecisionAction::Skipped,
                        "Position already open on this instrument",
                    )
                } else {
                    state.guard.mark_open(id);
                    state.stats.entries += 1;
                    decision(
                        strategy,
                        &candidate,
                        size,
                        DecisionAction::Entered,
                        candidate.rationale.clone(),
                    )
                }
            }
            Err(e) => {
                error!(strategy, instrument = id, error = %e, "Order failed");
                state.guard.mark_failed(id, Utc::now(), self.options.cooldown);
                state.stats.failed += 1;
                decision(
                    strategy,
                    &candidate,
                    size,
                    DecisionAction::Failed,
                    format!("Order failed: {:#}", e),
                )
            }
        };
        let record = state.record(record);
        vec![EngineEvent::Decision(record)]
    }

    async fn refresh_and_exit(&self, shared: &Shared) -> Vec<EngineEvent> {
        let ids = shared.state.read().await.positions.instrument_ids();
        if ids.is_empty() {
            return Vec::new();
        }

        let call_timeout = self.options.call_timeout();
        let feed = self.collab.feed.as_ref();
        let lookups = ids.iter().map(|id| async move {
            let price = with_timeout(call_timeout, "price refresh", feed.current_price(id)).await;
            (id.as_str(), price)
        });

        let mut prices: HashMap<&str, Decimal> = HashMap::new();
        for (id, result) in futures::future::join_all(lookups).await {
            match result {
                Ok(Some(price)) => {
                    prices.insert(id, price);
                }
                Ok(None) => {}
                Err(e) => debug!(instrument = id, error = %e, "Price refresh failed"),
            }
        }

        let strategy = self.source.kind().as_str();
        let mut state = shared.state.write().await;
        state.positions.refresh(|id| prices.get(id).copied());

        let exited = state.positions.check_exits();
        let mut events = Vec::new();
        for closed in exited {
            info!(
                strategy,
                instrument = %closed.position.instrument_id,
                kind = ?closed.kind,
                exit_price = %closed.exit_price,
                pnl = %closed.realized_pnl,
                "Exit triggered"
            );
            events.push(EngineEvent::Decision(apply_close(&mut state, strategy, closed)));
        }
        events
    }
}

/// Book a closed position into ledger, guard, stats and audit log.
///
/// Emergency liquidation keeps the guard entry so the instrument stays deduplicated.
fn apply_close(state: &mut TradingState, strategy: &str, closed: ClosedPosition) -> DecisionRecord {
    state.ledger.record_loss(closed.loss());
    if closed.kind != CloseKind::Emergency {
        state.guard.clear(&closed.position.instrument_id);
    }

    let stats = &mut state.stats;
    stats.exits += 1;
    stats.realized_pnl += closed.realized_pnl;
    match closed.kind {
        CloseKind::StopLoss => stats.stop_losses += 1,
        CloseKind::TakeProfit => stats.take_profits += 1,
        CloseKind::Manual | CloseKind::Emergency => {}
    }

    let p = &closed.position;
    let reason = match closed.kind {
        CloseKind::StopLoss => format!(
            "Stop-loss at {} (trigger {})",
            closed.exit_price, p.stop_loss_price
        ),
        CloseKind::TakeProfit => format!(
            "Take-profit at {} (trigger {})",
            closed.exit_price,
            p.take_profit_price.unwrap_or_default()
        ),
        CloseKind::Manual => format!("Closed manually at {}", closed.exit_price),
        CloseKind::Emergency => format!("Liquidated by emergency stop at {}", closed.exit_price),
    };

    state.record(DecisionRecord {
        timestamp: Utc::now(),
        strategy: strategy.to_string(),
        instrument_id: p.instrument_id.clone(),
        label: p.label.clone(),
        detected_price: closed.exit_price,
        side: p.side.opposite(),
        outcome: p.outcome.clone(),
        size: p.size,
        reference_size: None,
        action: closed.kind.action(),
        reason: format!("{}, P&L ${}", reason, closed.realized_pnl.round_dp(2)),
    })
}

fn decision(
    strategy: &str,
    candidate: &Candidate,
    size: Decimal,
    action: DecisionAction,
    reason: impl Into<String>,
) -> DecisionRecord {
    DecisionRecord {
        timestamp: Utc::now(),
        strategy: strategy.to_string(),
        instrument_id: candidate.instrument_id.clone(),
        label: candidate.label.clone(),
        detected_price: candidate.detected_price,
        side: candidate.side,
        outcome: candidate.outcome.clone(),
        size,
        reference_size: candidate.reference_size,
        action,
        reason: reason.into(),
    }
}

fn open_position(
    candidate: &Candidate,
    entry: Decimal,
    size: Decimal,
    order_ref: OrderRef,
) -> Position {
    let stop_loss_price = match candidate.side {
        TradeSide::Buy => entry * (Decimal::ONE - candidate.stop_loss_pct),
        TradeSide::Sell => entry * (Decimal::ONE + candidate.stop_loss_pct),
    }
    .round_dp(4);
    let take_profit_price = candidate
        .take_profit_pct
        .map(|tp| (entry * (Decimal::ONE + tp)).min(MAX_TAKE_PROFIT).round_dp(4));

    Position {
        instrument_id: candidate.instrument_id.clone(),
        market_id: candidate.market_id.clone(),
        label: candidate.label.clone(),
        outcome: candidate.outcome.clone(),
        side: candidate.side,
        entry_price: entry,
        size,
        opened_at: Utc::now(),
        current_price: entry,
        unrealized_pnl: Decimal::ZERO,
        stop_loss_price,
        take_profit_price,
        trigger_price: candidate.detected_price,
        order_ref: order_ref.0,
    }
}
