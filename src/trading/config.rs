//! Trading configuration.
//!
//! Loaded from TOML; every field has a default so a partial file (or no file)
//! works. Percentages are stored as fractions (`0.05` = 5%).

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::EngineError;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineSettings,
    pub mirror: MirrorConfig,
    pub threshold: ThresholdConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config")
    }

    /// Load from `path` when it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

/// Settings shared by every engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Never send real orders, even when credentials are present
    pub dry_run: bool,

    /// Timeout applied to every collaborator call
    pub call_timeout_secs: u64,

    /// Number of decision records kept in memory
    pub audit_capacity: usize,

    /// Number of decision records returned to observers by default
    pub display_limit: usize,

    /// Close all positions in accounting when the emergency stop fires
    pub liquidate_on_emergency_stop: bool,

    /// Emergency-stop every engine once this file exists
    pub kill_switch_file: Option<PathBuf>,

    /// Rebuild strategies whose config section changed on disk
    pub reload_config: bool,

    /// How often the kill switch and config file are checked
    pub control_interval_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            dry_run: false,
            call_timeout_secs: 15,
            audit_capacity: 500,
            display_limit: 100,
            liquidate_on_emergency_stop: true,
            kill_switch_file: None,
            reload_config: true,
            control_interval_secs: 5,
        }
    }
}

/// Portfolio-level and trade-level limits enforced by the risk ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Realized loss per local day that halts new entries
    pub daily_loss_limit: Decimal,

    /// Realized loss per ISO week that halts new entries
    pub weekly_loss_limit: Decimal,

    pub max_open_positions: usize,

    /// Smallest trade worth placing; `None` disables the check
    pub min_trade_size: Option<Decimal>,
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.daily_loss_limit <= Decimal::ZERO {
            return Err(EngineError::invalid("daily_loss_limit", "must be positive"));
        }
        if self.weekly_loss_limit <= Decimal::ZERO {
            return Err(EngineError::invalid("weekly_loss_limit", "must be positive"));
        }
        if self.max_open_positions == 0 {
            return Err(EngineError::invalid("max_open_positions", "must be at least 1"));
        }
        if self.min_trade_size.is_some_and(|m| m < Decimal::ZERO) {
            return Err(EngineError::invalid("min_trade_size", "must not be negative"));
        }
        Ok(())
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            daily_loss_limit: dec!(100),   // $100/day
            weekly_loss_limit: dec!(300),  // $300/week
            max_open_positions: 10,
            min_trade_size: None,
        }
    }
}

/// How the mirror strategy sizes a copied trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizingMode {
    /// A fixed fraction of the mirrored trade's notional
    Proportional,
    /// A fixed fraction of our available capital
    Allocation,
}

/// Position sizing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub mode: SizingMode,

    /// Fraction of the target's notional (proportional mode)
    pub copy_ratio: Decimal,

    /// Fraction of available capital (allocation mode)
    pub allocation_pct: Decimal,

    /// Maximum trade size in USDC
    pub max_trade_size: Decimal,

    /// Maximum fraction of available capital risked on one trade
    pub max_risk_per_trade_pct: Decimal,
}

impl SizingConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        for (field, value) in [
            ("copy_ratio", self.copy_ratio),
            ("allocation_pct", self.allocation_pct),
            ("max_risk_per_trade_pct", self.max_risk_per_trade_pct),
        ] {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(EngineError::invalid(field, "must be between 0 and 1"));
            }
        }
        if self.max_trade_size <= Decimal::ZERO {
            return Err(EngineError::invalid("max_trade_size", "must be positive"));
        }
        Ok(())
    }
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            mode: SizingMode::Proportional,
            copy_ratio: dec!(0.10),              // Copy 10% of the target's size
            allocation_pct: dec!(0.50),          // 50% of capital
            max_trade_size: dec!(200),           // Max $200
            max_risk_per_trade_pct: dec!(0.05),  // 5% of capital per trade
        }
    }
}

/// Mirror (copy-trading) strategy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub enabled: bool,

    /// Wallet address of the trader to mirror
    pub target: String,

    /// Capital assumed when the live balance is unavailable
    pub total_capital: Decimal,

    /// Stop-loss distance from entry (fraction)
    pub stop_loss_pct: Decimal,

    pub poll_interval_secs: u64,

    /// Number of recent activity events fetched per poll
    pub activity_limit: usize,

    pub sizing: SizingConfig,

    pub risk: RiskConfig,
}

impl MirrorConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.target.trim().is_empty() {
            return Err(EngineError::MissingTarget);
        }
        if self.poll_interval_secs == 0 {
            return Err(EngineError::invalid("poll_interval_secs", "must be at least 1"));
        }
        if self.activity_limit == 0 {
            return Err(EngineError::invalid("activity_limit", "must be at least 1"));
        }
        if self.stop_loss_pct <= Decimal::ZERO || self.stop_loss_pct >= Decimal::ONE {
            return Err(EngineError::invalid("stop_loss_pct", "must be between 0 and 1"));
        }
        self.sizing.validate()?;
        self.risk.validate()
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target: String::new(),
            total_capital: dec!(1000),  // $1000
            stop_loss_pct: dec!(0.20),  // 20% stop
            poll_interval_secs: 5,
            activity_limit: 20,
            sizing: SizingConfig::default(),
            risk: RiskConfig {
                min_trade_size: Some(dec!(5)), // Min $5
                ..RiskConfig::default()
            },
        }
    }
}

/// How the threshold strategy places entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStyle {
    /// Fill-or-kill for a USDC amount
    Marketable,
    /// Good-til-cancelled limit at the band midpoint
    Resting,
}

/// Threshold (probability band) strategy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub enabled: bool,

    /// Lower bound of the entry band (inclusive)
    pub entry_min: Decimal,

    /// Upper bound of the entry band (inclusive)
    pub entry_max: Decimal,

    pub order_style: OrderStyle,

    /// Desired size per entry in USDC
    pub position_size: Decimal,

    /// Hard cap per entry in USDC
    pub max_position_size: Decimal,

    pub stop_loss_pct: Decimal,

    pub take_profit_pct: Decimal,

    /// Minimum 24h volume; 0 disables the filter
    pub min_volume: Decimal,

    /// Minimum liquidity; 0 disables the filter
    pub min_liquidity: Decimal,

    /// Only consider markets closing within this many hours; 0 disables
    pub max_hours_to_close: Decimal,

    /// Trade the complementary outcome instead of the triggering one
    pub mean_reversion: bool,

    pub scan_interval_secs: u64,

    /// How often the market universe is re-fetched; 0 = every scan
    pub universe_refresh_secs: u64,

    /// Suppression window after a failed order
    pub cooldown_secs: u64,

    pub risk: RiskConfig,
}

impl ThresholdConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.entry_min <= Decimal::ZERO
            || self.entry_max >= Decimal::ONE
            || self.entry_min > self.entry_max
        {
            return Err(EngineError::InvalidBand {
                min: self.entry_min,
                max: self.entry_max,
            });
        }
        if self.scan_interval_secs == 0 {
            return Err(EngineError::invalid("scan_interval_secs", "must be at least 1"));
        }
        if self.position_size <= Decimal::ZERO || self.max_position_size <= Decimal::ZERO {
            return Err(EngineError::invalid("position_size", "must be positive"));
        }
        if self.stop_loss_pct <= Decimal::ZERO || self.stop_loss_pct >= Decimal::ONE {
            return Err(EngineError::invalid("stop_loss_pct", "must be between 0 and 1"));
        }
        if self.take_profit_pct <= Decimal::ZERO {
            return Err(EngineError::invalid("take_profit_pct", "must be positive"));
        }
        self.risk.validate()
    }

    /// Per-entry size before risk gating.
    pub fn entry_size(&self) -> Decimal {
        self.position_size.min(self.max_position_size)
    }

    /// Midpoint of the entry band, used as the resting limit price.
    pub fn band_midpoint(&self) -> Decimal {
        (self.entry_min + self.entry_max) / dec!(2)
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            entry_min: dec!(0.88),
            entry_max: dec!(0.91),
            order_style: OrderStyle::Marketable,
            position_size: dec!(50),       // $50 per entry
            max_position_size: dec!(200),  // Never more than $200
            stop_loss_pct: dec!(0.15),     // 15% stop
            take_profit_pct: dec!(0.05),   // 5% target
            min_volume: dec!(100),
            min_liquidity: dec!(500),
            max_hours_to_close: Decimal::ZERO,
            mean_reversion: true,
            scan_interval_secs: 30,
            universe_refresh_secs: 300,
            cooldown_secs: 300,            // 5 minutes after a failed order
            risk: RiskConfig {
                daily_loss_limit: dec!(150),
                weekly_loss_limit: dec!(400),
                max_open_positions: 5,
                min_trade_size: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.engine.call_timeout_secs, 15);
        assert_eq!(config.engine.audit_capacity, 500);
        assert_eq!(config.mirror.activity_limit, 20);
        assert_eq!(config.mirror.sizing.copy_ratio, dec!(0.10));
        assert_eq!(config.threshold.entry_size(), dec!(50));
        assert_eq!(config.threshold.band_midpoint(), dec!(0.895));
        assert_eq!(config.threshold.risk.min_trade_size, None);
    }

    #[test]
    fn test_partial_toml() {
        let toml = r#"
            [engine]
            dry_run = true
            kill_switch_file = "/tmp/polybot.halt"

            [mirror]
            target = "0xabc"
            poll_interval_secs = 10

            [mirror.sizing]
            mode = "allocation"

            [threshold]
            entry_min = "0.80"
            entry_max = "0.85"
            order_style = "resting"
        "#;

        let config = AppConfig::from_toml(toml).unwrap();
        assert!(config.engine.dry_run);
        assert_eq!(
            config.engine.kill_switch_file.as_deref(),
            Some(Path::new("/tmp/polybot.halt"))
        );
        assert!(config.engine.reload_config);
        assert_eq!(config.mirror.target, "0xabc");
        assert_eq!(config.mirror.poll_interval_secs, 10);
        assert_eq!(config.mirror.sizing.mode, SizingMode::Allocation);
        assert_eq!(config.mirror.risk.daily_loss_limit, dec!(100));
        assert_eq!(config.threshold.entry_min, dec!(0.80));
        assert_eq!(config.threshold.order_style, OrderStyle::Resting);
        assert!(config.mirror.validate().is_ok());
        assert!(config.threshold.validate().is_ok());
    }

    #[test]
    fn test_toml_roundtrip_of_defaults() {
        let text = AppConfig::default().to_toml().unwrap();
        let parsed = AppConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.threshold.entry_max, dec!(0.91));
        assert_eq!(parsed.mirror.sizing.max_trade_size, dec!(200));
    }

    #[test]
    fn test_validation() {
        let mirror = MirrorConfig::default();
        assert!(matches!(mirror.validate(), Err(EngineError::MissingTarget)));

        let threshold = ThresholdConfig {
            entry_min: dec!(0.95),
            entry_max: dec!(0.90),
            ..Default::default()
        };
        assert!(matches!(
            threshold.validate(),
            Err(EngineError::InvalidBand { .. })
        ));

        let threshold = ThresholdConfig {
            scan_interval_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            threshold.validate(),
            Err(EngineError::InvalidConfig { field: "scan_interval_secs", .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(AppConfig::load("/nonexistent/path/polybot.toml").is_err());
        assert!(AppConfig::load_or_default("/nonexistent/path/polybot.toml").is_ok());
    }
}
