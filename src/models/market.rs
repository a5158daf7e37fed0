//! Market model representing a binary Polymarket prediction market.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One tradeable outcome of a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeToken {
    /// CLOB token ID
    pub token_id: String,

    /// Outcome label, upper-cased (e.g. "YES", "NO")
    pub outcome: String,

    /// Price embedded in the market listing, if any (0.0 to 1.0)
    pub price: Option<Decimal>,
}

/// Prediction market information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    /// Market ID (gamma id, falls back to condition ID)
    pub id: String,

    /// Condition ID (0x-prefixed)
    #[serde(default)]
    pub condition_id: String,

    /// Human-readable question
    pub question: String,

    /// Outcome tokens in listing order
    pub tokens: Vec<OutcomeToken>,

    /// 24h (or total, when 24h is unavailable) volume in USDC
    #[serde(default)]
    pub volume: Decimal,

    /// Liquidity in USDC
    #[serde(default)]
    pub liquidity: Decimal,

    /// When the market closes; `None` when unknown or unparseable
    pub end_date: Option<DateTime<Utc>>,
}

impl Market {
    /// Check if this is a two-outcome market.
    pub fn is_binary(&self) -> bool {
        self.tokens.len() == 2
    }

    /// Find the complementary token of a two-outcome market.
    pub fn complement_of(&self, token_id: &str) -> Option<&OutcomeToken> {
        self.tokens
            .iter()
            .find(|t| !t.token_id.is_empty() && t.token_id != token_id)
    }

    /// Whether the closing time passes a max-time-to-close filter.
    ///
    /// Markets with an unknown closing time are allowed; markets that already
    /// closed or close beyond the horizon are not.
    pub fn closes_within(&self, now: DateTime<Utc>, max_hours: Decimal) -> bool {
        let Some(end) = self.end_date else {
            return true;
        };
        if end <= now {
            return false;
        }
        let horizon_secs = (max_hours * Decimal::from(3600)).trunc();
        let horizon_secs: i64 = horizon_secs.try_into().unwrap_or(i64::MAX);
        end - now <= Duration::seconds(horizon_secs)
    }
}

#[cfg(test)]
impl Market {
    /// Market with no tokens, for building fixtures.
    pub fn new(id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            condition_id: String::new(),
            question: question.into(),
            tokens: Vec::new(),
            volume: Decimal::ZERO,
            liquidity: Decimal::ZERO,
            end_date: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn binary_market() -> Market {
        Market {
            tokens: vec![
                OutcomeToken {
                    token_id: "yes-token".to_string(),
                    outcome: "YES".to_string(),
                    price: Some(dec!(0.9)),
                },
                OutcomeToken {
                    token_id: "no-token".to_string(),
                    outcome: "NO".to_string(),
                    price: Some(dec!(0.1)),
                },
            ],
            ..Market::new("1", "Will it rain?")
        }
    }

    #[test]
    fn test_complement() {
        let market = binary_market();
        assert!(market.is_binary());
        assert_eq!(market.complement_of("yes-token").unwrap().token_id, "no-token");
        assert_eq!(market.complement_of("no-token").unwrap().outcome, "YES");
    }

    #[test]
    fn test_closes_within() {
        let now = Utc::now();
        let mut market = binary_market();

        // Unknown close time is allowed
        assert!(market.closes_within(now, dec!(24)));

        market.end_date = Some(now + Duration::hours(2));
        assert!(market.closes_within(now, dec!(24)));
        assert!(!market.closes_within(now, dec!(1)));

        market.end_date = Some(now - Duration::minutes(1));
        assert!(!market.closes_within(now, dec!(24)));
    }
}
