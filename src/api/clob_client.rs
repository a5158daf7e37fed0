//! Polymarket CLOB (Central Limit Order Book) client for prices and order execution.
//!
//! The CLOB is Polymarket's off-chain order matching engine that settles on Polygon.
//! This client handles:
//! - Public price endpoints (midpoint, best price)
//! - Collateral balance lookup
//! - Order signing using EIP-712 typed data
//! - L2 request authentication (HMAC-SHA256 with the API secret)
//! - Fill-or-kill "market" orders and good-til-cancelled limit orders

use alloy_primitives::{Address, U256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::models::TradeSide;

use super::types::{balance_from, decimal_from, midpoint_from, OrderResponse};

/// CLOB API base URL
pub const CLOB_URL: &str = "https://clob.polymarket.com";

/// Polymarket CTF Exchange contract on Polygon
pub const CTF_EXCHANGE: &str = "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E";

/// Limit price used to make a BUY cross the whole book
const MARKETABLE_BUY_PRICE: Decimal = dec!(0.999);
/// Limit price used to make a SELL cross the whole book
const MARKETABLE_SELL_PRICE: Decimal = dec!(0.001);

type HmacSha256 = Hmac<Sha256>;

/// CLOB API client for executing trades on Polymarket.
pub struct ClobClient {
    http: Client,
    signer: PrivateKeySigner,
    api_key: String,
    /// Decoded API secret used to sign L2 requests
    api_secret: Vec<u8>,
    api_passphrase: String,
    chain_id: u64,
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    /// Good-til-cancelled limit order
    Gtc,
    /// Fill-or-kill market order
    Fok,
}

/// Signature type for CLOB orders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureType {
    /// EOA signature
    Eoa = 0,
}

/// Signed order ready for submission
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrder {
    pub salt: String,
    pub maker: String,
    pub signer: String,
    pub taker: String,
    pub token_id: String,
    pub maker_amount: String,
    pub taker_amount: String,
    pub side: String,
    pub expiration: String,
    pub nonce: String,
    pub fee_rate_bps: String,
    pub signature_type: u8,
    pub signature: String,
}

/// Order submission request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub order: SignedOrder,
    pub owner: String,
    pub order_type: OrderType,
}

/// Public (unauthenticated) CLOB price endpoints.
pub struct ClobPrices {
    http: Client,
}

impl ClobPrices {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("polybot/0.1")
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { http })
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}{}", CLOB_URL, path);
        let resp = self.http.get(&url).query(query).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("CLOB {} failed: {} - {}", path, status, text));
        }

        resp.json().await.context("Failed to parse CLOB response")
    }

    /// Current mid price for a token, if the book has one.
    pub async fn midpoint(&self, token_id: &str) -> Result<Option<Decimal>> {
        let data = self.get("/midpoint", &[("token_id", token_id)]).await?;
        Ok(midpoint_from(&data))
    }

    /// Best price on one side of the book.
    pub async fn best_price(&self, token_id: &str, side: TradeSide) -> Result<Option<Decimal>> {
        let data = self
            .get("/price", &[("token_id", token_id), ("side", side.as_str())])
            .await?;
        Ok(data.get("price").and_then(decimal_from).filter(|p| !p.is_zero()))
    }
}

fn side_code(side: TradeSide) -> u8 {
    match side {
        TradeSide::Buy => 0,
        TradeSide::Sell => 1,
    }
}

/// Limit price and share count for a marketable order of `usdc_amount`.
pub fn marketable_terms(side: TradeSide, usdc_amount: Decimal) -> (Decimal, Decimal) {
    let price = match side {
        TradeSide::Buy => MARKETABLE_BUY_PRICE,
        TradeSide::Sell => MARKETABLE_SELL_PRICE,
    };
    (price, (usdc_amount / price).round_dp(4))
}

/// L2 request signature: base64url(HMAC-SHA256(secret, timestamp + method + path + body)).
pub fn l2_signature(
    secret: &[u8],
    timestamp: &str,
    method: &str,
    path: &str,
    body: &str,
) -> Result<String> {
    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|e| anyhow!("Invalid API secret: {}", e))?;
    mac.update(timestamp.as_bytes());
    mac.update(method.as_bytes());
    mac.update(path.as_bytes());
    mac.update(body.as_bytes());
    Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
}

impl ClobClient {
    /// Create a new CLOB client.
    ///
    /// # Arguments
    /// * `private_key` - Ethereum private key (hex string, with or without 0x prefix)
    /// * `api_key` - Polymarket API key
    /// * `api_secret` - Polymarket API secret (URL-safe base64)
    /// * `api_passphrase` - Polymarket API passphrase
    /// * `chain_id` - Polygon chain ID (137 for mainnet, 80002 for Amoy testnet)
    pub fn new(
        private_key: &str,
        api_key: &str,
        api_secret: &str,
        api_passphrase: &str,
        chain_id: u64,
    ) -> Result<Self> {
        let pk = private_key.strip_prefix("0x").unwrap_or(private_key);
        let signer = PrivateKeySigner::from_str(pk).context("Invalid private key")?;
        let api_secret = URL_SAFE
            .decode(api_secret.trim())
            .context("API secret is not URL-safe base64")?;

        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("polybot/0.1")
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            signer,
            api_key: api_key.to_string(),
            api_secret,
            api_passphrase: api_passphrase.to_string(),
            chain_id,
        })
    }

    /// Create from environment variables:
    /// - POLYMARKET_PRIVATE_KEY
    /// - POLYMARKET_API_KEY
    /// - POLYMARKET_API_SECRET
    /// - POLYMARKET_API_PASSPHRASE
    /// - POLYMARKET_CHAIN_ID (defaults to 137)
    pub fn from_env() -> Result<Self> {
        let private_key = std::env::var("POLYMARKET_PRIVATE_KEY")
            .context("POLYMARKET_PRIVATE_KEY not set")?;
        let api_key = std::env::var("POLYMARKET_API_KEY")
            .context("POLYMARKET_API_KEY not set")?;
        let api_secret = std::env::var("POLYMARKET_API_SECRET")
            .context("POLYMARKET_API_SECRET not set")?;
        let api_passphrase = std::env::var("POLYMARKET_API_PASSPHRASE")
            .context("POLYMARKET_API_PASSPHRASE not set")?;
        let chain_id: u64 = std::env::var("POLYMARKET_CHAIN_ID")
            .unwrap_or_else(|_| "137".to_string())
            .parse()
            .context("Invalid POLYMARKET_CHAIN_ID")?;

        Self::new(&private_key, &api_key, &api_secret, &api_passphrase, chain_id)
    }

    /// Get the wallet address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Available USDC collateral.
    pub async fn get_balance(&self) -> Result<Decimal> {
        let path = "/balance-allowance";
        let url = format!("{}{}", CLOB_URL, path);
        let resp = self
            .http
            .get(&url)
            .query(&[("asset_type", "COLLATERAL"), ("signature_type", "0")])
            .headers(self.build_auth_headers("GET", path, "")?)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Balance request failed: {} - {}", status, text));
        }

        let data: Value = resp.json().await.context("Failed to parse balance response")?;
        let raw = balance_from(&data).context("Balance response has no balance field")?;

        // Collateral is reported in 6-decimal base units
        Ok(raw / Decimal::from(1_000_000u64))
    }

    /// Place a marketable order for a USDC amount (fill-or-kill at an
    /// aggressive limit price).
    pub async fn market_order(
        &self,
        token_id: &str,
        side: TradeSide,
        usdc_amount: Decimal,
    ) -> Result<OrderResponse> {
        let (price, shares) = marketable_terms(side, usdc_amount);
        self.place_order(token_id, side, shares, price, OrderType::Fok).await
    }

    /// Place a good-til-cancelled limit order.
    ///
    /// # Arguments
    /// * `token_id` - The token to trade
    /// * `side` - Buy or Sell
    /// * `price` - Limit price (0 to 1)
    /// * `size` - Size in shares
    pub async fn limit_order(
        &self,
        token_id: &str,
        side: TradeSide,
        price: Decimal,
        size: Decimal,
    ) -> Result<OrderResponse> {
        self.place_order(token_id, side, size, price, OrderType::Gtc).await
    }

    async fn place_order(
        &self,
        token_id: &str,
        side: TradeSide,
        size: Decimal,
        price: Decimal,
        order_type: OrderType,
    ) -> Result<OrderResponse> {
        let signed_order = self.build_signed_order(token_id, side, size, price).await?;

        let payload = OrderPayload {
            order: signed_order,
            owner: self.api_key.clone(),
            order_type,
        };

        debug!(token_id, side = %side, %size, %price, ?order_type, "Submitting order");

        // The signed body must be byte-identical to the one sent
        let body = serde_json::to_string(&payload).context("Failed to serialize order")?;
        let path = "/order";
        let url = format!("{}{}", CLOB_URL, path);
        let resp = self
            .http
            .post(&url)
            .headers(self.build_auth_headers("POST", path, &body)?)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Order placement failed: {} - {}", status, text));
        }

        let response: OrderResponse = resp.json().await.context("Failed to parse order response")?;
        if !response.success {
            return Err(anyhow!("Order rejected: {}", response.error_msg));
        }

        info!(token_id, order_id = ?response.order_id, status = ?response.status, "Order placed");
        Ok(response)
    }

    /// Build a signed order for submission.
    async fn build_signed_order(
        &self,
        token_id: &str,
        side: TradeSide,
        size: Decimal,
        price: Decimal,
    ) -> Result<SignedOrder> {
        let maker = format!("{:?}", self.address());
        let signer = maker.clone();
        let taker = "0x0000000000000000000000000000000000000000".to_string();

        // BUY: maker gives USDC, receives shares
        // SELL: maker gives shares, receives USDC
        let usdc_amount = size * price;
        let (maker_amount, taker_amount) = match side {
            TradeSide::Buy => (Self::to_base_units(usdc_amount), Self::to_base_units(size)),
            TradeSide::Sell => (Self::to_base_units(size), Self::to_base_units(usdc_amount)),
        };

        let nonce = "0".to_string();
        // 0 = no expiration
        let expiration = "0".to_string();
        let salt = Self::generate_salt()?;
        let fee_rate_bps = "0".to_string();

        let signature = self
            .sign_order(
                &salt,
                &maker,
                &signer,
                &taker,
                token_id,
                &maker_amount,
                &taker_amount,
                &expiration,
                &nonce,
                &fee_rate_bps,
                side_code(side),
            )
            .await?;

        Ok(SignedOrder {
            salt,
            maker,
            signer,
            taker,
            token_id: token_id.to_string(),
            maker_amount,
            taker_amount,
            side: side.as_str().to_string(),
            expiration,
            nonce,
            fee_rate_bps,
            signature_type: SignatureType::Eoa as u8,
            signature,
        })
    }

    /// Sign an order using EIP-712 typed data.
    #[allow(clippy::too_many_arguments)]
    async fn sign_order(
        &self,
        salt: &str,
        maker: &str,
        signer: &str,
        taker: &str,
        token_id: &str,
        maker_amount: &str,
        taker_amount: &str,
        expiration: &str,
        nonce: &str,
        fee_rate_bps: &str,
        side: u8,
    ) -> Result<String> {
        // Order(uint256 salt,address maker,address signer,address taker,uint256 tokenId,
        //       uint256 makerAmount,uint256 takerAmount,uint256 expiration,uint256 nonce,
        //       uint256 feeRateBps,uint8 side,uint8 signatureType)
        let type_hash = alloy_primitives::keccak256(
            b"Order(uint256 salt,address maker,address signer,address taker,uint256 tokenId,uint256 makerAmount,uint256 takerAmount,uint256 expiration,uint256 nonce,uint256 feeRateBps,uint8 side,uint8 signatureType)"
        );

        let mut encoded = Vec::with_capacity(13 * 32);
        encoded.extend_from_slice(type_hash.as_slice());
        encoded.extend_from_slice(&Self::encode_uint256(salt)?);
        encoded.extend_from_slice(&Self::encode_address(maker)?);
        encoded.extend_from_slice(&Self::encode_address(signer)?);
        encoded.extend_from_slice(&Self::encode_address(taker)?);
        encoded.extend_from_slice(&Self::encode_uint256(token_id)?);
        encoded.extend_from_slice(&Self::encode_uint256(maker_amount)?);
        encoded.extend_from_slice(&Self::encode_uint256(taker_amount)?);
        encoded.extend_from_slice(&Self::encode_uint256(expiration)?);
        encoded.extend_from_slice(&Self::encode_uint256(nonce)?);
        encoded.extend_from_slice(&Self::encode_uint256(fee_rate_bps)?);
        encoded.extend_from_slice(&Self::encode_uint8(side));
        encoded.extend_from_slice(&Self::encode_uint8(SignatureType::Eoa as u8));
        let order_hash = alloy_primitives::keccak256(&encoded);

        let domain_hash = self.compute_domain_separator()?;

        // keccak256("\x19\x01" || domainSeparator || orderHash)
        let mut message = vec![0x19, 0x01];
        message.extend_from_slice(&domain_hash);
        message.extend_from_slice(order_hash.as_slice());
        let final_hash = alloy_primitives::keccak256(&message);

        let signature = self
            .signer
            .sign_hash(&final_hash)
            .await
            .context("Failed to sign order")?;

        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }

    /// Compute the EIP-712 domain separator.
    fn compute_domain_separator(&self) -> Result<[u8; 32]> {
        let type_hash = alloy_primitives::keccak256(
            b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
        );
        let name_hash = alloy_primitives::keccak256(b"Polymarket CTF Exchange");
        let version_hash = alloy_primitives::keccak256(b"1");

        let mut encoded = Vec::with_capacity(5 * 32);
        encoded.extend_from_slice(type_hash.as_slice());
        encoded.extend_from_slice(name_hash.as_slice());
        encoded.extend_from_slice(version_hash.as_slice());
        encoded.extend_from_slice(&Self::encode_uint256(&self.chain_id.to_string())?);
        encoded.extend_from_slice(&Self::encode_address(CTF_EXCHANGE)?);

        Ok(alloy_primitives::keccak256(&encoded).0)
    }

    /// L2 authentication headers for private endpoints.
    fn build_auth_headers(
        &self,
        method: &str,
        path: &str,
        body: &str,
    ) -> Result<reqwest::header::HeaderMap> {
        use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

        let timestamp = Utc::now().timestamp().to_string();
        let signature = l2_signature(&self.api_secret, &timestamp, method, path, body)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("poly_address"),
            HeaderValue::from_str(&format!("{:?}", self.address()))?,
        );
        headers.insert(
            HeaderName::from_static("poly_signature"),
            HeaderValue::from_str(&signature)?,
        );
        headers.insert(
            HeaderName::from_static("poly_timestamp"),
            HeaderValue::from_str(&timestamp)?,
        );
        headers.insert(
            HeaderName::from_static("poly_api_key"),
            HeaderValue::from_str(&self.api_key)?,
        );
        headers.insert(
            HeaderName::from_static("poly_passphrase"),
            HeaderValue::from_str(&self.api_passphrase)?,
        );

        Ok(headers)
    }

    /// Convert a decimal amount to 6-decimal base units (USDC and outcome shares).
    fn to_base_units(amount: Decimal) -> String {
        (amount * Decimal::from(1_000_000u64)).trunc().to_string()
    }

    /// Encode address to 32-byte padded format.
    fn encode_address(addr: &str) -> Result<[u8; 32]> {
        let addr = Address::from_str(addr).context("Invalid address")?;
        let mut buf = [0u8; 32];
        buf[12..].copy_from_slice(addr.as_slice());
        Ok(buf)
    }

    /// Encode uint256 from a decimal string.
    fn encode_uint256(value: &str) -> Result<[u8; 32]> {
        let n = U256::from_str_radix(value, 10)
            .map_err(|e| anyhow!("Invalid uint256 {}: {}", value, e))?;
        Ok(n.to_be_bytes())
    }

    /// Encode uint8 to 32-byte padded format.
    fn encode_uint8(value: u8) -> [u8; 32] {
        let mut buf = [0u8; 32];
        buf[31] = value;
        buf
    }

    /// Random salt, seeded from a UUID and the clock.
    fn generate_salt() -> Result<String> {
        let millis = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis();
        let random = uuid::Uuid::new_v4().as_u128() >> 80;
        Ok((random ^ millis).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_base_units() {
        assert_eq!(ClobClient::to_base_units(dec!(100.5)), "100500000");
        assert_eq!(ClobClient::to_base_units(dec!(0.0000001)), "0");
    }

    #[test]
    fn test_encode_uint8() {
        let encoded = ClobClient::encode_uint8(1);
        assert_eq!(encoded[31], 1);
        assert!(encoded[..31].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_encode_uint256_rejects_garbage() {
        assert!(ClobClient::encode_uint256("12345").is_ok());
        assert!(ClobClient::encode_uint256("not-a-number").is_err());
    }

    #[test]
    fn test_marketable_terms() {
        let (price, shares) = marketable_terms(TradeSide::Buy, dec!(50));
        assert_eq!(price, dec!(0.999));
        assert_eq!(shares, dec!(50.0501));

        let (price, shares) = marketable_terms(TradeSide::Sell, dec!(1));
        assert_eq!(price, dec!(0.001));
        assert_eq!(shares, dec!(1000));
    }

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    // URL-safe base64 of "polybot-test-secret-0123456789ab"
    const SECRET: &str = "cG9seWJvdC10ZXN0LXNlY3JldC0wMTIzNDU2Nzg5YWI=";

    #[test]
    fn test_signer_from_key() {
        let client = ClobClient::new(KEY, "key", SECRET, "pass", 137).unwrap();
        let address = format!("{:?}", client.address());
        assert!(address.starts_with("0x"));
        assert_eq!(address.len(), 42);
        assert_eq!(client.api_secret, b"polybot-test-secret-0123456789ab");
    }

    #[test]
    fn test_rejects_malformed_secret() {
        assert!(ClobClient::new(KEY, "key", "not base64!", "pass", 137).is_err());
    }

    #[test]
    fn test_l2_signature_vectors() {
        let secret = URL_SAFE.decode(SECRET).unwrap();

        let body = r#"{"owner":"key"}"#;
        let sig = l2_signature(&secret, "1700000000", "POST", "/order", body).unwrap();
        assert_eq!(sig, "sKInlII84nMLYqzqFYd-WOol-GWQRlB5vjJmxMyoHvc=");

        let sig = l2_signature(&secret, "1700000000", "GET", "/balance-allowance", "").unwrap();
        assert_eq!(sig, "N5HSd6akAbCMFJSXFiaYasRJ3ytoYG-Dwjir_3IDgu4=");
    }

    #[test]
    fn test_auth_headers() {
        let client = ClobClient::new(KEY, "key", SECRET, "pass", 137).unwrap();
        let headers = client.build_auth_headers("GET", "/balance-allowance", "").unwrap();

        let timestamp = headers["poly_timestamp"].to_str().unwrap();
        let expected =
            l2_signature(&client.api_secret, timestamp, "GET", "/balance-allowance", "").unwrap();
        assert_eq!(headers["poly_signature"].to_str().unwrap(), expected);
        assert_eq!(headers["poly_api_key"], "key");
        assert_eq!(headers["poly_passphrase"], "pass");
    }
}
