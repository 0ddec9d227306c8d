//! Binance public API client for market data (no authentication required)

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::provider::MarketDataProvider;
use crate::types::Candle;

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";
const MAX_KLINES_PER_REQUEST: u32 = 1000;

/// Binance public market data client
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    history_bars: u32,
}

/// Raw kline data from Binance API (array of arrays)
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct RawKline(
    i64,    // 0: Open time
    String, // 1: Open
    String, // 2: High
    String, // 3: Low
    String, // 4: Close
    String, // 5: Volume
    i64,    // 6: Close time
    String, // 7: Quote asset volume
    u64,    // 8: Number of trades
    String, // 9: Taker buy base
    String, // 10: Taker buy quote
    String, // 11: Ignore
);

impl RawKline {
    fn is_closed(&self, now_ms: i64) -> bool {
        self.6 < now_ms
    }

    fn into_candle(self) -> Option<Candle> {
        Some(Candle {
            timestamp: self.0,
            open: self.1.parse().ok()?,
            high: self.2.parse().ok()?,
            low: self.3.parse().ok()?,
            close: self.4.parse().ok()?,
            volume: self.5.parse().ok()?,
        })
    }
}

/// Binance ticker price response
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct TickerPrice {
    symbol: String,
    price: String,
}

/// Binance interval code for a candle length in minutes
pub fn interval_code(minutes: u32) -> Option<&'static str> {
    match minutes {
        1 => Some("1m"),
        5 => Some("5m"),
        15 => Some("15m"),
        30 => Some("30m"),
        60 => Some("1h"),
        240 => Some("4h"),
        1440 => Some("1d"),
        _ => None,
    }
}

impl BinanceClient {
    /// Create a client that fetches `history_bars` candles per request
    pub fn new(base_url: &str, timeout: Duration, history_bars: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            history_bars,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance API error {}: {}", status, body);
        }

        Ok(response.json().await?)
    }

    /// Fetch up to 1000 klines ending at `end_time` (or now)
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        end_time: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let mut url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol,
            interval,
            limit.min(MAX_KLINES_PER_REQUEST)
        );
        if let Some(end) = end_time {
            url.push_str(&format!("&endTime={}", end));
        }

        debug!(symbol, interval, "Fetching klines from Binance");
        let raw_klines: Vec<RawKline> = self.get_json(&url).await?;
        let candles = closed_candles(raw_klines, Utc::now().timestamp_millis());

        debug!(count = candles.len(), "Fetched klines");
        Ok(candles)
    }

    /// Fetch the most recent `bars` klines, paging backwards past the
    /// per-request limit
    pub async fn get_recent_klines(&self, symbol: &str, interval: &str, bars: u32) -> Result<Vec<Candle>> {
        let mut pages: Vec<Vec<Candle>> = Vec::new();
        let mut remaining = bars;
        let mut end_time: Option<i64> = None;

        while remaining > 0 {
            let requested = remaining.min(MAX_KLINES_PER_REQUEST);
            // Only the newest page can lose its forming bar
            let forming = u32::from(end_time.is_none());
            let page = self.get_klines(symbol, interval, end_time, requested).await?;
            let Some(first) = page.first() else {
                break;
            };
            end_time = Some(first.timestamp - 1);
            remaining = remaining.saturating_sub(page.len() as u32);
            let short_page = (page.len() as u32) + forming < requested;
            pages.push(page);
            if short_page {
                break;
            }

            // Small delay to respect rate limits
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let candles: Vec<Candle> = pages.into_iter().rev().flatten().collect();
        if bars > MAX_KLINES_PER_REQUEST {
            info!(symbol, total = candles.len(), "Paginated kline fetch complete");
        }
        Ok(candles)
    }

    /// Get current price for a symbol
    pub async fn get_price(&self, symbol: &str) -> Result<f64> {
        let url = format!("{}/api/v3/ticker/price?symbol={}", self.base_url, symbol);
        let ticker: TickerPrice = self.get_json(&url).await?;
        ticker
            .price
            .parse()
            .with_context(|| format!("Invalid price for {symbol}: {}", ticker.price))
    }
}

/// Parsed klines whose close time has passed; the still-forming bar is dropped
fn closed_candles(raw: Vec<RawKline>, now_ms: i64) -> Vec<Candle> {
    raw.into_iter()
        .filter(|k| k.is_closed(now_ms))
        .filter_map(RawKline::into_candle)
        .collect()
}

#[async_trait]
impl MarketDataProvider for BinanceClient {
    async fn get_candles(&self, pair: &str, interval_minutes: u32) -> Result<Vec<Candle>> {
        let interval = interval_code(interval_minutes)
            .with_context(|| format!("Unsupported interval: {interval_minutes}m"))?;
        self.get_recent_klines(pair, interval, self.history_bars).await
    }

    async fn get_latest_price(&self, pair: &str) -> Result<f64> {
        self.get_price(pair).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_codes() {
        assert_eq!(interval_code(15), Some("15m"));
        assert_eq!(interval_code(60), Some("1h"));
        assert_eq!(interval_code(240), Some("4h"));
        assert_eq!(interval_code(1440), Some("1d"));
        assert_eq!(interval_code(7), None);
    }

    #[test]
    fn test_raw_kline_parsing() {
        let json = r#"[[1700000000000,"100.5","101.0","99.5","100.8","12.3",1700003599999,"0",10,"0","0","0"]]"#;
        let raw: Vec<RawKline> = serde_json::from_str(json).unwrap();
        let candle = raw.into_iter().next().unwrap().into_candle().unwrap();
        assert_eq!(candle.timestamp, 1_700_000_000_000);
        assert_eq!(candle.close, 100.8);
        assert_eq!(candle.volume, 12.3);
    }

    #[test]
    fn test_forming_kline_dropped() {
        let json = r#"[
            [1700000000000,"100","101","99","100.5","1",1700003599999,"0",1,"0","0","0"],
            [1700003600000,"100.5","102","100","101.5","1",1700007199999,"0",1,"0","0","0"]
        ]"#;
        let raw: Vec<RawKline> = serde_json::from_str(json).unwrap();
        let candles = closed_candles(raw, 1_700_005_000_000);
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].timestamp, 1_700_000_000_000);

        let raw: Vec<RawKline> = serde_json::from_str(json).unwrap();
        assert_eq!(closed_candles(raw, 1_700_007_200_000).len(), 2);
    }

    #[test]
    fn test_malformed_kline_dropped() {
        let json = r#"[[1,"x","1","1","1","1",2,"0",0,"0","0","0"]]"#;
        let raw: Vec<RawKline> = serde_json::from_str(json).unwrap();
        assert!(raw.into_iter().next().unwrap().into_candle().is_none());
    }

    #[tokio::test]
    async fn test_unsupported_interval_is_error() {
        let client = BinanceClient::new("http://127.0.0.1:9", Duration::from_secs(1), 10).unwrap();
        let err = client.get_candles("BTCUSDT", 7).await.unwrap_err();
        assert!(err.to_string().contains("Unsupported interval"));
    }
}
