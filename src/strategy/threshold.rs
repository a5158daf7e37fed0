//! Threshold strategy: enter when an outcome price sits inside a probability band.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::with_timeout;
use crate::error::EngineError;
use crate::models::{DecisionAction, Market, OutcomeToken, TradeSide};
use crate::trading::{OrderStyle, ThresholdConfig};

use super::{Candidate, OrderPlan, ScanContext, ScanReport, SignalSource, SizeRequest, StrategyKind};

const MIN_LIMIT_PRICE: Decimal = dec!(0.01);
const MAX_LIMIT_PRICE: Decimal = dec!(0.99);

pub struct ThresholdSource {
    config: ThresholdConfig,
    universe: Vec<Market>,
    last_refresh: Option<DateTime<Utc>>,
}

impl ThresholdSource {
    pub fn new(config: ThresholdConfig) -> Self {
        Self {
            config,
            universe: Vec::new(),
            last_refresh: None,
        }
    }

    fn refresh_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_refresh {
            None => true,
            Some(_) if self.config.universe_refresh_secs == 0 => true,
            Some(last) => {
                now - last >= ChronoDuration::seconds(self.config.universe_refresh_secs as i64)
            }
        }
    }

    async fn refresh_universe(&mut self, ctx: &ScanContext<'_>) -> Result<()> {
        if !self.refresh_due(ctx.now) {
            return Ok(());
        }

        let listing = ctx.feed.list_active_markets();
        match with_timeout(ctx.call_timeout, "market listing", listing).await {
            Ok(markets) => {
                debug!(count = markets.len(), "Market universe refreshed");
                self.universe = markets;
                self.last_refresh = Some(ctx.now);
                Ok(())
            }
            Err(e) if self.last_refresh.is_some() => {
                warn!(
                    error = %e,
                    cached = self.universe.len(),
                    "Market refresh failed, using cached universe"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Volume, liquidity and time-to-close filters.
    fn passes_filters(&self, market: &Market, now: DateTime<Utc>) -> bool {
        let cfg = &self.config;
        if cfg.min_volume > Decimal::ZERO && market.volume < cfg.min_volume {
            return false;
        }
        if cfg.min_liquidity > Decimal::ZERO && market.liquidity < cfg.min_liquidity {
            return false;
        }
        if cfg.max_hours_to_close > Decimal::ZERO
            && !market.closes_within(now, cfg.max_hours_to_close)
        {
            return false;
        }
        true
    }

    fn in_band(&self, price: Decimal) -> bool {
        price >= self.config.entry_min && price <= self.config.entry_max
    }

    /// Instrument, outcome and expected entry price for a trigger.
    fn select_side<'m>(
        &self,
        market: &'m Market,
        trigger: &'m OutcomeToken,
        price: Decimal,
    ) -> Option<(&'m OutcomeToken, Decimal)> {
        if self.config.mean_reversion {
            if !market.is_binary() {
                return None;
            }
            let complement = market.complement_of(&trigger.token_id)?;
            Some((complement, (Decimal::ONE - price).round_dp(4)))
        } else {
            Some((trigger, price))
        }
    }

    fn order_plan(&self) -> OrderPlan {
        match self.config.order_style {
            OrderStyle::Marketable => OrderPlan::Marketable,
            OrderStyle::Resting => {
                let midpoint = self.config.band_midpoint();
                let price = if self.config.mean_reversion {
                    Decimal::ONE - midpoint
                } else {
                    midpoint
                };
                OrderPlan::Resting {
                    price: price.max(MIN_LIMIT_PRICE).min(MAX_LIMIT_PRICE).round_dp(4),
                }
            }
        }
    }

    fn rationale(&self) -> String {
        let mode = if self.config.mean_reversion {
            "Mean-reversion"
        } else {
            "Momentum"
        };
        format!(
            "{} entry, trigger in band [{}, {}]",
            mode, self.config.entry_min, self.config.entry_max
        )
    }
}

#[async_trait]
impl SignalSource for ThresholdSource {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Threshold
    }

    fn describe(&self) -> String {
        format!(
            "Band [{}, {}] ({})",
            self.config.entry_min,
            self.config.entry_max,
            if self.config.mean_reversion {
                "mean-reversion"
            } else {
                "momentum"
            }
        )
    }

    fn validate(&self) -> Result<(), EngineError> {
        self.config.validate()
    }

    fn denial_action(&self) -> DecisionAction {
        DecisionAction::RiskBlocked
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.config.scan_interval_secs)
    }

    async fn scan(&mut self, ctx: &ScanContext<'_>) -> Result<ScanReport> {
        self.refresh_universe(ctx).await?;

        let mut report = ScanReport {
            scanned: self.universe.len(),
            ..Default::default()
        };
        let mut emitted: HashSet<String> = HashSet::new();
        let order = self.order_plan();

        for market in self.universe.iter().filter(|m| self.passes_filters(m, ctx.now)) {
            for token in &market.tokens {
                if token.token_id.is_empty() {
                    continue;
                }

                let price = match token.price {
                    Some(p) => Some(p),
                    None => with_timeout(
                        ctx.call_timeout,
                        "price lookup",
                        ctx.feed.current_price(&token.token_id),
                    )
                    .await
                    .unwrap_or_else(|e| {
                        debug!(token_id = %token.token_id, error = %e, "No price this tick");
                        None
                    }),
                };
                let Some(price) = price else { continue };

                if !self.in_band(price) {
                    continue;
                }

                let Some((traded, entry_price)) = self.select_side(market, token, price) else {
                    continue;
                };
                if ctx.guard.blocked(&traded.token_id, ctx.now)
                    || emitted.contains(&traded.token_id)
                {
                    continue;
                }
                emitted.insert(traded.token_id.clone());

                info!(
                    market = %market.question,
                    trigger = %token.outcome,
                    %price,
                    traded = %traded.outcome,
                    %entry_price,
                    "Price in entry band"
                );

                report.candidates.push(Candidate {
                    instrument_id: traded.token_id.clone(),
                    market_id: market.id.clone(),
                    label: market.question.clone(),
                    outcome: traded.outcome.clone(),
                    side: TradeSide::Buy,
                    detected_price: price,
                    entry_price,
                    size: SizeRequest::Fixed(self.config.entry_size()),
                    order,
                    rationale: self.rationale(),
                    stop_loss_pct: self.config.stop_loss_pct,
                    take_profit_pct: Some(self.config.take_profit_pct),
                    reference_size: None,
                });
            }
        }

        Ok(report)
    }
}
