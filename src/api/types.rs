//! Adapters from raw Polymarket API payloads to strict model types.
//!
//! The Gamma and Data APIs are loose about types: numbers arrive as JSON
//! numbers or strings, arrays are sometimes JSON-encoded inside a string, and
//! field names differ between API versions. Everything loose is handled here
//! so the rest of the crate only sees `Market`, `ActivityEvent` and
//! `ActorPosition`.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

use crate::models::{ActivityEvent, ActivityKind, ActorPosition, Market, OutcomeToken, TradeSide};

/// Parse a decimal from a JSON number or numeric string.
pub fn decimal_from(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(s) => {
            let s = s.trim();
            Decimal::from_str(s)
                .or_else(|_| Decimal::from_scientific(s))
                .ok()
        }
        _ => None,
    }
}

/// First non-zero decimal among `keys`.
fn first_decimal(raw: &Value, keys: &[&str]) -> Option<Decimal> {
    keys.iter()
        .filter_map(|k| raw.get(*k).and_then(decimal_from))
        .find(|d| !d.is_zero())
}

/// First non-empty string among `keys`.
fn first_str(raw: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| raw.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Read a list that may be a JSON array or a JSON-encoded array in a string.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    let items = match value {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(s)) => serde_json::from_str::<Vec<Value>>(s).unwrap_or_default(),
        _ => Vec::new(),
    };

    items
        .into_iter()
        .map(|v| match v {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        })
        .collect()
}

/// Unwrap a response that is either a bare list or an object wrapping one.
pub fn list_payload(data: Value, keys: &[&str]) -> Vec<Value> {
    let items = match data {
        Value::Array(items) => items,
        Value::Object(mut map) => keys
            .iter()
            .find_map(|k| match map.remove(*k) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    items.into_iter().filter(Value::is_object).collect()
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::Number(n) => {
            let secs = n.as_i64()?;
            // Millisecond timestamps
            let secs = if secs > 10_000_000_000 { secs / 1000 } else { secs };
            Utc.timestamp_opt(secs, 0).single()
        }
        Value::String(s) => {
            if let Ok(secs) = s.parse::<i64>() {
                return Utc.timestamp_opt(secs, 0).single();
            }
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        }
        _ => None,
    }
}

/// Convert a Gamma `/markets` item into a `Market`.
///
/// Returns `None` when the item has no usable identifier or no token IDs.
pub fn market_from_gamma(raw: &Value) -> Option<Market> {
    let condition_id = first_str(raw, &["conditionId"]).unwrap_or_default();
    let id = first_str(raw, &["id"])
        .or_else(|| raw.get("id").and_then(Value::as_i64).map(|n| n.to_string()))
        .or_else(|| (!condition_id.is_empty()).then(|| condition_id.clone()))?;

    let token_ids = string_list(raw.get("clobTokenIds"));
    let labels = string_list(raw.get("outcomes"));
    let prices = string_list(raw.get("outcomePrices"));

    let tokens: Vec<OutcomeToken> = token_ids
        .iter()
        .enumerate()
        .filter(|(_, token_id)| !token_id.is_empty())
        .map(|(i, token_id)| {
            let outcome = labels
                .get(i)
                .cloned()
                .unwrap_or_else(|| if i == 0 { "YES" } else { "NO" }.to_string())
                .to_uppercase();
            let price = prices.get(i).and_then(|p| Decimal::from_str(p.trim()).ok());
            OutcomeToken {
                token_id: token_id.clone(),
                outcome,
                price,
            }
        })
        .collect();

    if tokens.is_empty() {
        return None;
    }

    Some(Market {
        id,
        condition_id,
        question: first_str(raw, &["question"]).unwrap_or_else(|| "Unknown".to_string()),
        tokens,
        volume: first_decimal(raw, &["volumeNum", "volume24hr", "volume"]).unwrap_or_default(),
        liquidity: first_decimal(raw, &["liquidityNum", "liquidityTotal", "liquidity"])
            .unwrap_or_default(),
        end_date: raw
            .get("endDate")
            .or_else(|| raw.get("endDateIso"))
            .and_then(|v| v.as_str())
            .and_then(parse_end_date),
    })
}

fn parse_end_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Convert a Data API `/activity` item into an `ActivityEvent`.
///
/// Only a missing trade ID yields `None`; events with unusable fields are still
/// returned (so they can be marked seen) and fail `is_actionable`.
pub fn activity_from_data(raw: &Value, actor: &str) -> Option<ActivityEvent> {
    let id = first_str(raw, &["id", "transactionHash"])?;

    let side_label = first_str(raw, &["side", "type"])
        .unwrap_or_else(|| "BUY".to_string())
        .to_uppercase();
    let kind = ActivityKind::classify(&side_label);
    let side = if kind == ActivityKind::Exit {
        TradeSide::Sell
    } else {
        TradeSide::Buy
    };

    let title = match raw.get("market") {
        Some(market @ Value::Object(_)) => first_str(market, &["question"]),
        _ => first_str(raw, &["marketQuestion", "title"]),
    }
    .unwrap_or_default();

    Some(ActivityEvent {
        id,
        actor: actor.to_string(),
        instrument_id: first_str(raw, &["asset", "token_id", "conditionId"]).unwrap_or_default(),
        market_id: first_str(raw, &["conditionId"]).unwrap_or_default(),
        title,
        outcome: first_str(raw, &["outcome"]).unwrap_or_default(),
        kind,
        side,
        price: first_decimal(raw, &["price", "usdcSize"]).unwrap_or_default(),
        notional: first_decimal(raw, &["usdcSize", "size", "amount"]).unwrap_or_default(),
        timestamp: parse_timestamp(raw.get("timestamp")).unwrap_or_else(Utc::now),
    })
}

/// Convert a Data API `/positions` item into an `ActorPosition`.
pub fn actor_position_from_data(raw: &Value) -> Option<ActorPosition> {
    let market_id = first_str(raw, &["conditionId", "market_id"])?;
    Some(ActorPosition {
        instrument_id: first_str(raw, &["asset", "token_id"]).unwrap_or_default(),
        market_id,
        title: first_str(raw, &["title", "question"]).unwrap_or_default(),
        outcome: first_str(raw, &["outcome"]).unwrap_or_default(),
        size: first_decimal(raw, &["size"]).unwrap_or_default(),
        avg_price: first_decimal(raw, &["avgPrice"]).unwrap_or_default(),
    })
}

/// Midpoint response from the CLOB `/midpoint` endpoint.
pub fn midpoint_from(raw: &Value) -> Option<Decimal> {
    first_decimal(raw, &["mid", "price"])
}

/// Balance response: `{"balance": ".."}` or `{"USDC": {"balance": ..}}`.
pub fn balance_from(raw: &Value) -> Option<Decimal> {
    for key in ["balance", "USDC", "usdc", "amount", "value"] {
        match raw.get(key) {
            Some(nested @ Value::Object(_)) => {
                if let Some(v) = nested.get("balance").and_then(decimal_from) {
                    return Some(v);
                }
            }
            Some(v) => {
                if let Some(d) = decimal_from(v) {
                    return Some(d);
                }
            }
            None => {}
        }
    }
    None
}

/// Response from order placement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    #[serde(default, alias = "orderID")]
    pub order_id: Option<String>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error_msg: String,
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_decimal_from_number_or_string() {
        assert_eq!(decimal_from(&json!(0.42)), Some(dec!(0.42)));
        assert_eq!(decimal_from(&json!("0.42")), Some(dec!(0.42)));
        assert_eq!(decimal_from(&json!(12)), Some(dec!(12)));
        assert_eq!(decimal_from(&json!("abc")), None);
        assert_eq!(decimal_from(&json!(null)), None);
    }

    #[test]
    fn test_gamma_market_with_encoded_arrays() {
        let raw = json!({
            "id": "512",
            "conditionId": "0xcond",
            "question": "Will BTC close above 100k?",
            "clobTokenIds": "[\"111\", \"222\"]",
            "outcomes": "[\"Yes\", \"No\"]",
            "outcomePrices": "[\"0.9\", \"0.1\"]",
            "volumeNum": 0,
            "volume24hr": "1500.5",
            "liquidityNum": 800,
            "endDate": "2030-01-01T00:00:00Z"
        });

        let market = market_from_gamma(&raw).unwrap();
        assert_eq!(market.id, "512");
        assert_eq!(market.tokens.len(), 2);
        assert_eq!(market.tokens[0].token_id, "111");
        assert_eq!(market.tokens[0].outcome, "YES");
        assert_eq!(market.tokens[1].price, Some(dec!(0.1)));
        // volumeNum of 0 falls through to volume24hr
        assert_eq!(market.volume, dec!(1500.5));
        assert_eq!(market.liquidity, dec!(800));
        assert!(market.end_date.is_some());
    }

    #[test]
    fn test_gamma_market_plain_arrays_and_bad_date() {
        let raw = json!({
            "id": 7,
            "clobTokenIds": ["a", "b"],
            "outcomePrices": ["0.3", "oops"],
            "endDate": "sometime soon"
        });

        let market = market_from_gamma(&raw).unwrap();
        assert_eq!(market.id, "7");
        assert_eq!(market.tokens[0].outcome, "YES");
        assert_eq!(market.tokens[1].outcome, "NO");
        assert_eq!(market.tokens[1].price, None);
        assert_eq!(market.end_date, None);
    }

    #[test]
    fn test_gamma_market_without_tokens() {
        assert!(market_from_gamma(&json!({"id": "1", "question": "?"})).is_none());
    }

    #[test]
    fn test_activity_alternate_fields() {
        let raw = json!({
            "transactionHash": "0xhash",
            "type": "TRADE",
            "side": "buy",
            "asset": "tok",
            "conditionId": "0xcond",
            "price": "0.55",
            "usdcSize": 120,
            "market": {"question": "Will it rain?"},
            "timestamp": 1718000000
        });

        let event = activity_from_data(&raw, "0xactor").unwrap();
        assert_eq!(event.id, "0xhash");
        assert_eq!(event.kind, ActivityKind::Entry);
        assert_eq!(event.instrument_id, "tok");
        assert_eq!(event.price, dec!(0.55));
        assert_eq!(event.notional, dec!(120));
        assert_eq!(event.title, "Will it rain?");
        assert!(event.is_actionable());
    }

    #[test]
    fn test_activity_without_id_is_dropped() {
        assert!(activity_from_data(&json!({"asset": "tok"}), "0x").is_none());

        let unusable = activity_from_data(&json!({"id": "x", "side": "SELL"}), "0x").unwrap();
        assert_eq!(unusable.kind, ActivityKind::Exit);
        assert!(!unusable.is_actionable());
    }

    #[test]
    fn test_balance_shapes() {
        assert_eq!(balance_from(&json!({"balance": "123.45"})), Some(dec!(123.45)));
        assert_eq!(balance_from(&json!({"USDC": {"balance": 10}})), Some(dec!(10)));
        assert_eq!(balance_from(&json!({})), None);
    }

    #[test]
    fn test_list_payload() {
        let wrapped = json!({"markets": [{"id": "1"}, "junk", {"id": "2"}]});
        assert_eq!(list_payload(wrapped, &["markets", "data"]).len(), 2);
        assert_eq!(list_payload(json!([{"id": "1"}]), &[]).len(), 1);
    }
}
