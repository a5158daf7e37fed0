//! Mirror strategy: copy new entries made by a target trader.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info};

use crate::api::with_timeout;
use crate::error::EngineError;
use crate::models::{ActivityEvent, ActivityKind, DecisionAction, TradeSide};
use crate::trading::MirrorConfig;

use super::{Candidate, OrderPlan, ScanContext, ScanReport, SignalSource, SizeRequest, StrategyKind};

pub struct MirrorSource {
    config: MirrorConfig,
    /// Trade IDs already processed; never pruned
    seen: HashSet<String>,
}

impl MirrorSource {
    pub fn new(config: MirrorConfig) -> Self {
        Self {
            config,
            seen: HashSet::new(),
        }
    }

    #[cfg(test)]
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    fn candidate(&self, event: &ActivityEvent, label: String) -> Candidate {
        Candidate {
            instrument_id: event.instrument_id.clone(),
            market_id: event.market_id.clone(),
            label,
            outcome: event.outcome.clone(),
            side: TradeSide::Buy,
            detected_price: event.price,
            entry_price: event.price,
            size: SizeRequest::Mirror {
                target_notional: event.notional,
            },
            order: OrderPlan::Marketable,
            rationale: format!("Copied from target trader (${} @ {})", event.notional, event.price),
            stop_loss_pct: self.config.stop_loss_pct,
            take_profit_pct: None,
            reference_size: Some(event.notional),
        }
    }
}

#[async_trait]
impl SignalSource for MirrorSource {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Mirror
    }

    fn describe(&self) -> String {
        format!("Mirroring {}", self.config.target)
    }

    fn validate(&self) -> Result<(), EngineError> {
        self.config.validate()
    }

    fn denial_action(&self) -> DecisionAction {
        DecisionAction::Skipped
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.config.poll_interval_secs)
    }

    async fn scan(&mut self, ctx: &ScanContext<'_>) -> Result<ScanReport> {
        let target = self.config.target.as_str();

        let activity = with_timeout(
            ctx.call_timeout,
            "activity fetch",
            ctx.feed.recent_activity(target, self.config.activity_limit),
        )
        .await?;

        if activity.is_empty() {
            return Ok(ScanReport::default());
        }

        // Only used to fill in missing titles
        let titles: HashMap<String, String> = match with_timeout(
            ctx.call_timeout,
            "position snapshot",
            ctx.feed.actor_positions(target),
        )
        .await
        {
            Ok(positions) => positions
                .into_iter()
                .filter(|p| !p.title.is_empty())
                .flat_map(|p| {
                    [
                        (p.market_id.clone(), p.title.clone()),
                        (p.instrument_id, p.title),
                    ]
                })
                .collect(),
            Err(e) => {
                debug!(error = %e, "Target position snapshot unavailable");
                HashMap::new()
            }
        };

        let mut report = ScanReport {
            scanned: activity.len(),
            ..Default::default()
        };

        // Feed returns newest first; copy in the order the trades happened
        for event in activity.iter().rev() {
            if !self.seen.insert(event.id.clone()) {
                continue;
            }
            if !event.is_actionable() {
                debug!(trade_id = %event.id, "Ignoring activity with missing price, size or token");
                continue;
            }
            if event.kind != ActivityKind::Entry {
                continue;
            }

            let label = if !event.title.is_empty() {
                event.title.clone()
            } else {
                titles
                    .get(&event.market_id)
                    .or_else(|| titles.get(&event.instrument_id))
                    .cloned()
                    .unwrap_or_else(|| "Unknown".to_string())
            };

            info!(
                trade_id = %event.id,
                market = %label,
                price = %event.price,
                notional = %event.notional,
                "New target entry"
            );
            report.candidates.push(self.candidate(event, label));
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{activity, FakeFeed};
    use crate::trading::EntryGuard;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn source() -> MirrorSource {
        MirrorSource::new(MirrorConfig {
            target: "0xtarget".to_string(),
            ..Default::default()
        })
    }

    async fn scan(source: &mut MirrorSource, feed: &FakeFeed) -> ScanReport {
        let guard = EntryGuard::new();
        let ctx = ScanContext {
            feed,
            guard: &guard,
            now: Utc::now(),
            call_timeout: Duration::from_secs(1),
        };
        source.scan(&ctx).await.unwrap()
    }

    #[tokio::test]
    async fn test_entries_only_and_dedup() {
        let feed = FakeFeed::default();
        feed.set_activity(vec![
            activity("t3", "tok-c", "SELL", dec!(0.4), dec!(30)),
            activity("t2", "tok-b", "BUY", dec!(0.6), dec!(0)),
            activity("t1", "tok-a", "BUY", dec!(0.5), dec!(100)),
        ]);

        let mut source = source();
        let report = scan(&mut source, &feed).await;
        assert_eq!(report.scanned, 3);
        assert_eq!(report.candidates.len(), 1);

        let candidate = &report.candidates[0];
        assert_eq!(candidate.instrument_id, "tok-a");
        assert_eq!(
            candidate.size,
            SizeRequest::Mirror {
                target_notional: dec!(100)
            }
        );
        assert_eq!(candidate.reference_size, Some(dec!(100)));
        assert_eq!(candidate.order, OrderPlan::Marketable);
        assert_eq!(candidate.take_profit_pct, None);

        // Every ID was marked seen, including the unusable ones
        assert_eq!(source.seen_count(), 3);
        let report = scan(&mut source, &feed).await;
        assert!(report.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_title_from_position_snapshot() {
        let feed = FakeFeed::default();
        let mut event = activity("t1", "tok-a", "BUY", dec!(0.5), dec!(100));
        event.title.clear();
        feed.set_activity(vec![event]);
        feed.set_actor_positions(vec![crate::models::ActorPosition {
            instrument_id: "tok-a".to_string(),
            market_id: "0xcond".to_string(),
            title: "Will it snow?".to_string(),
            outcome: "Yes".to_string(),
            size: dec!(10),
            avg_price: dec!(0.5),
        }]);

        let report = scan(&mut source(), &feed).await;
        assert_eq!(report.candidates[0].label, "Will it snow?");
    }

    #[tokio::test]
    async fn test_activity_failure_is_an_error() {
        let feed = FakeFeed::default();
        feed.fail_activity(true);

        let guard = EntryGuard::new();
        let ctx = ScanContext {
            feed: &feed,
            guard: &guard,
            now: Utc::now(),
            call_timeout: Duration::from_secs(1),
        };
        assert!(source().scan(&ctx).await.is_err());
    }

    #[test]
    fn test_requires_target() {
        let source = MirrorSource::new(MirrorConfig::default());
        assert!(matches!(source.validate(), Err(EngineError::MissingTarget)));
    }
}
