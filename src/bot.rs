//! Bot manager: builds strategy engines from configuration and owns them.
//!
//! Engines are immutable with respect to their config. Replacing a strategy's
//! config stops the old engine and builds a fresh one; no state carries over.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Result;
use tracing::{info, warn};

use crate::api::{ClobClient, FixedBalance, PaperExecutor, PolymarketFeed, WalletBalance};
use crate::engine::{Collaborators, DecisionEngine, EngineOptions, EngineStatus, EventListener};
use crate::error::EngineError;
use crate::strategy::{MirrorSource, StrategyKind, ThresholdSource};
use crate::trading::{AppConfig, ClosedPosition, MirrorConfig, RiskLedger, ThresholdConfig};

/// Suppression window after a failed mirror order.
const MIRROR_COOLDOWN_SECS: i64 = 300;

/// Owns at most one engine per strategy.
pub struct BotManager {
    config: AppConfig,
    collab: Collaborators,
    listeners: Vec<Arc<dyn EventListener>>,
    /// Whether orders go to the paper executor
    paper: bool,
    mirror: Option<DecisionEngine<MirrorSource>>,
    threshold: Option<DecisionEngine<ThresholdSource>>,
}

impl BotManager {
    /// Create a manager talking to the live Polymarket APIs.
    ///
    /// Falls back to paper trading when `dry_run` is set or no CLOB
    /// credentials are configured.
    pub fn new(config: AppConfig, listeners: Vec<Arc<dyn EventListener>>) -> Result<Self> {
        let feed = Arc::new(PolymarketFeed::new()?);

        let clob = if config.engine.dry_run {
            None
        } else {
            match ClobClient::from_env() {
                Ok(client) => {
                    info!(address = ?client.address(), "CLOB client initialized");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    warn!("CLOB client not configured: {}. Running in dry-run mode.", e);
                    None
                }
            }
        };

        let (collab, paper) = match clob {
            Some(clob) => (
                Collaborators {
                    feed,
                    executor: clob.clone(),
                    balance: Arc::new(WalletBalance::new(clob)?),
                },
                false,
            ),
            None => (
                Collaborators {
                    feed,
                    executor: Arc::new(PaperExecutor::new()),
                    balance: Arc::new(FixedBalance(config.mirror.total_capital)),
                },
                true,
            ),
        };

        Ok(Self::with_collaborators(config, collab, paper, listeners))
    }

    pub fn with_collaborators(
        config: AppConfig,
        collab: Collaborators,
        paper: bool,
        listeners: Vec<Arc<dyn EventListener>>,
    ) -> Self {
        Self {
            config,
            collab,
            listeners,
            paper,
            mirror: None,
            threshold: None,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn is_paper(&self) -> bool {
        self.paper
    }

    fn options(&self, cooldown_secs: i64) -> EngineOptions {
        EngineOptions {
            settings: self.config.engine.clone(),
            fallback_capital: self.config.mirror.total_capital,
            cooldown: chrono::Duration::seconds(cooldown_secs),
        }
    }

    fn build_mirror(&self) -> Result<DecisionEngine<MirrorSource>, EngineError> {
        let cfg = &self.config.mirror;
        DecisionEngine::new(
            MirrorSource::new(cfg.clone()),
            RiskLedger::new(cfg.risk.clone(), cfg.sizing.clone()),
            self.collab.clone(),
            self.options(MIRROR_COOLDOWN_SECS),
            self.listeners.clone(),
        )
    }

    fn build_threshold(&self) -> Result<DecisionEngine<ThresholdSource>, EngineError> {
        let cfg = &self.config.threshold;
        DecisionEngine::new(
            ThresholdSource::new(cfg.clone()),
            RiskLedger::new(cfg.risk.clone(), Default::default()),
            self.collab.clone(),
            self.options(cfg.cooldown_secs as i64),
            self.listeners.clone(),
        )
    }

    /// Build (if needed) and start the mirror engine.
    pub fn start_mirror(&mut self) -> Result<(), EngineError> {
        if self.mirror.is_none() {
            self.mirror = Some(self.build_mirror()?);
        }
        match &self.mirror {
            Some(engine) => engine.start(),
            None => Ok(()),
        }
    }

    /// Build (if needed) and start the threshold engine.
    pub fn start_threshold(&mut self) -> Result<(), EngineError> {
        if self.threshold.is_none() {
            self.threshold = Some(self.build_threshold()?);
        }
        match &self.threshold {
            Some(engine) => engine.start(),
            None => Ok(()),
        }
    }

    /// Start every strategy enabled in the config. Returns how many started.
    pub fn start_enabled(&mut self) -> Result<usize, EngineError> {
        let mut started = 0;
        if self.config.mirror.enabled {
            self.start_mirror()?;
            started += 1;
        }
        if self.config.threshold.enabled {
            self.start_threshold()?;
            started += 1;
        }
        Ok(started)
    }

    pub fn mirror(&self) -> Option<&DecisionEngine<MirrorSource>> {
        self.mirror.as_ref()
    }

    pub fn threshold(&self) -> Option<&DecisionEngine<ThresholdSource>> {
        self.threshold.as_ref()
    }

    /// Swap the mirror config. A running engine is replaced by a new running
    /// one; the old engine's positions and counters are dropped.
    pub fn replace_mirror_config(&mut self, config: MirrorConfig) -> Result<(), EngineError> {
        config.validate()?;
        let was_running = self.mirror.take().map(|old| {
            let running = old.is_running();
            old.stop();
            running
        });

        self.config.mirror = config;
        info!(trader = %self.config.mirror.target, "Mirror config replaced");

        if was_running == Some(true) {
            self.start_mirror()?;
        }
        Ok(())
    }

    /// Swap the threshold config, restarting the engine if it was running.
    pub fn replace_threshold_config(&mut self, config: ThresholdConfig) -> Result<(), EngineError> {
        config.validate()?;
        let was_running = self.threshold.take().map(|old| {
            let running = old.is_running();
            old.stop();
            running
        });

        self.config.threshold = config;
        info!(
            entry_min = %self.config.threshold.entry_min,
            entry_max = %self.config.threshold.entry_max,
            "Threshold config replaced"
        );

        if was_running == Some(true) {
            self.start_threshold()?;
        }
        Ok(())
    }

    /// Apply a reloaded config file. Only strategies whose section changed
    /// are rebuilt; `[engine]` settings are kept until the process restarts.
    pub fn apply_config(&mut self, config: AppConfig) -> Result<Vec<StrategyKind>, EngineError> {
        let mirror_changed = config.mirror != self.config.mirror;
        let threshold_changed = config.threshold != self.config.threshold;
        if mirror_changed {
            config.mirror.validate()?;
        }
        if threshold_changed {
            config.threshold.validate()?;
        }

        let mut changed = Vec::new();
        if mirror_changed {
            self.replace_mirror_config(config.mirror)?;
            changed.push(StrategyKind::Mirror);
        }
        if threshold_changed {
            self.replace_threshold_config(config.threshold)?;
            changed.push(StrategyKind::Threshold);
        }
        Ok(changed)
    }

    pub fn stop_all(&self) {
        if let Some(engine) = &self.mirror {
            engine.stop();
        }
        if let Some(engine) = &self.threshold {
            engine.stop();
        }
    }

    pub async fn emergency_stop_all(&self) {
        if let Some(engine) = &self.mirror {
            engine.emergency_stop().await;
        }
        if let Some(engine) = &self.threshold {
            engine.emergency_stop().await;
        }
    }

    /// Close every open position at its last known price (accounting only).
    pub async fn close_all_positions(&self) -> Vec<ClosedPosition> {
        let mut closed = Vec::new();
        if let Some(engine) = &self.mirror {
            for position in engine.positions().await {
                closed.extend(engine.close_position(&position.instrument_id).await);
            }
        }
        if let Some(engine) = &self.threshold {
            for position in engine.positions().await {
                closed.extend(engine.close_position(&position.instrument_id).await);
            }
        }
        closed
    }

    /// Status of every engine built so far.
    pub async fn statuses(&self) -> Vec<EngineStatus> {
        let mut statuses = Vec::new();
        if let Some(engine) = &self.mirror {
            statuses.push(engine.status().await);
        }
        if let Some(engine) = &self.threshold {
            statuses.push(engine.status().await);
        }
        statuses
    }
}

/// File-based operator controls polled by the run loop: a kill switch and
/// config hot reload.
pub struct OperatorControls {
    config_path: PathBuf,
    config_modified: Option<SystemTime>,
    kill_switch: Option<PathBuf>,
    reload: bool,
    halted: bool,
}

impl OperatorControls {
    pub fn new(config_path: impl Into<PathBuf>, config: &AppConfig) -> Self {
        let config_path = config_path.into();
        Self {
            config_modified: modified(&config_path),
            config_path,
            kill_switch: config.engine.kill_switch_file.clone(),
            reload: config.engine.reload_config,
            halted: false,
        }
    }

    /// Whether the kill switch has fired.
    pub fn halted(&self) -> bool {
        self.halted
    }

    /// Run one round of checks against `bot`.
    pub async fn poll(&mut self, bot: &mut BotManager) {
        if self.halted {
            return;
        }

        if let Some(path) = &self.kill_switch {
            if path.exists() {
                warn!(file = %path.display(), "Kill switch file found, emergency stopping");
                self.halted = true;
                bot.emergency_stop_all().await;
                return;
            }
        }

        if self.reload {
            let current = modified(&self.config_path);
            if current.is_some() && current != self.config_modified {
                self.config_modified = current;
                self.reload_into(bot);
            }
        }
    }

    fn reload_into(&self, bot: &mut BotManager) {
        let config = match AppConfig::load(&self.config_path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Config reload failed, keeping current config: {:#}", e);
                return;
            }
        };
        match bot.apply_config(config) {
            Ok(changed) if changed.is_empty() => {
                info!("Config file changed; no strategy settings differ");
            }
            Ok(changed) => {
                for strategy in changed {
                    info!(%strategy, "Strategy rebuilt from reloaded config");
                }
            }
            Err(e) => warn!(error = %e, "Reloaded config rejected"),
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
