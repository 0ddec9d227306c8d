//! Market data provider abstraction and bounded fan-out fetching

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

use crate::error::EngineError;
use crate::types::Candle;

/// Source of candles and spot prices
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Chronologically ordered candles for `pair` at `interval_minutes`
    async fn get_candles(&self, pair: &str, interval_minutes: u32) -> Result<Vec<Candle>>;

    async fn get_latest_price(&self, pair: &str) -> Result<f64>;
}

// ============================================================================
// Fan-out
// ============================================================================

/// Fetch candles for every pair, at most `max_concurrent` requests in flight.
/// Results keep the order of `pairs`; a failed, timed-out or empty fetch
/// only affects its own pair.
pub async fn fetch_candles_all(
    provider: &dyn MarketDataProvider,
    pairs: &[String],
    interval_minutes: u32,
    max_concurrent: usize,
    timeout: Duration,
) -> Vec<(String, Result<Vec<Candle>, EngineError>)> {
    stream::iter(pairs.iter().cloned())
        .map(|pair| async move {
            let result = match tokio::time::timeout(timeout, provider.get_candles(&pair, interval_minutes)).await {
                Ok(Ok(candles)) if candles.is_empty() => Err(unavailable(&pair, "no candles returned")),
                Ok(Ok(candles)) => Ok(candles),
                Ok(Err(e)) => Err(unavailable(&pair, &format!("{e:#}"))),
                Err(_) => Err(unavailable(&pair, "request timed out")),
            };
            if let Err(e) = &result {
                warn!(pair = %pair, error = %e, "Candle fetch failed");
            }
            (pair, result)
        })
        .buffered(max_concurrent.max(1))
        .collect()
        .await
}

/// Fetch the latest price for every pair with the same bounds as candles
pub async fn fetch_prices_all(
    provider: &dyn MarketDataProvider,
    pairs: &[String],
    max_concurrent: usize,
    timeout: Duration,
) -> Vec<(String, Result<f64, EngineError>)> {
    stream::iter(pairs.iter().cloned())
        .map(|pair| async move {
            let result = match tokio::time::timeout(timeout, provider.get_latest_price(&pair)).await {
                Ok(Ok(price)) if price.is_finite() && price > 0.0 => Ok(price),
                Ok(Ok(price)) => Err(unavailable(&pair, &format!("invalid price {price}"))),
                Ok(Err(e)) => Err(unavailable(&pair, &format!("{e:#}"))),
                Err(_) => Err(unavailable(&pair, "request timed out")),
            };
            if let Err(e) = &result {
                warn!(pair = %pair, error = %e, "Price fetch failed");
            }
            (pair, result)
        })
        .buffered(max_concurrent.max(1))
        .collect()
        .await
}

fn unavailable(pair: &str, reason: &str) -> EngineError {
    EngineError::DataUnavailable {
        pair: pair.to_string(),
        reason: reason.to_string(),
    }
}

// ============================================================================
// Static provider
// ============================================================================

/// In-memory provider over fixed candle histories and prices
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    candles: HashMap<String, Vec<Candle>>,
    prices: HashMap<String, f64>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_candles(mut self, pair: &str, candles: Vec<Candle>) -> Self {
        self.candles.insert(pair.to_string(), candles);
        self
    }

    pub fn with_price(mut self, pair: &str, price: f64) -> Self {
        self.prices.insert(pair.to_string(), price);
        self
    }
}

#[async_trait]
impl MarketDataProvider for StaticProvider {
    async fn get_candles(&self, pair: &str, _interval_minutes: u32) -> Result<Vec<Candle>> {
        self.candles
            .get(pair)
            .cloned()
            .with_context(|| format!("no candles for {pair}"))
    }

    async fn get_latest_price(&self, pair: &str) -> Result<f64> {
        if let Some(price) = self.prices.get(pair) {
            return Ok(*price);
        }
        self.candles
            .get(pair)
            .and_then(|c| c.last())
            .map(|c| c.close)
            .with_context(|| format!("no price for {pair}"))
    }
}

// ============================================================================
// Synthetic provider
// ============================================================================

/// Seeded random-walk market for offline runs. The same seed, pair and
/// interval always produce the same history; each price query advances a
/// per-provider tick so monitoring sees movement.
#[derive(Debug)]
pub struct SyntheticProvider {
    seed: u64,
    bars: usize,
    /// Open time of the final candle, epoch ms
    anchor_ms: i64,
    ticks: AtomicU64,
}

impl SyntheticProvider {
    pub fn new(seed: u64, bars: usize, anchor_ms: i64) -> Self {
        Self {
            seed,
            bars,
            anchor_ms,
            ticks: AtomicU64::new(0),
        }
    }

    fn rng_for(&self, pair: &str, salt: u64) -> StdRng {
        let mut hasher = DefaultHasher::new();
        pair.hash(&mut hasher);
        salt.hash(&mut hasher);
        StdRng::seed_from_u64(self.seed ^ hasher.finish())
    }

    fn start_price(&self, pair: &str) -> f64 {
        self.rng_for(pair, 0).gen_range(20.0..2_000.0)
    }

    pub fn generate(&self, pair: &str, interval_minutes: u32) -> Vec<Candle> {
        let mut rng = self.rng_for(pair, interval_minutes as u64);
        let step_ms = interval_minutes as i64 * 60_000;
        let first_ms = self.anchor_ms - step_ms * (self.bars as i64 - 1);
        let mut price = self.start_price(pair);
        // Slowly rotating drift gives the walk trending and ranging phases
        let cycle = rng.gen_range(80.0..200.0);

        (0..self.bars)
            .map(|i| {
                let drift = (i as f64 / cycle * std::f64::consts::TAU).sin() * 0.002;
                let shock: f64 = rng.gen_range(-0.012..0.012);
                let open = price;
                price = (price * (1.0 + drift + shock)).max(0.01);
                let wick_up = price.max(open) * rng.gen_range(0.0..0.006);
                let wick_down = price.min(open) * rng.gen_range(0.0..0.006);
                let volume = rng.gen_range(500.0..1_500.0) * (1.0 + shock.abs() * 50.0);
                Candle::new(
                    first_ms + step_ms * i as i64,
                    open,
                    price.max(open) + wick_up,
                    price.min(open) - wick_down,
                    price,
                    volume,
                )
            })
            .collect()
    }
}

#[async_trait]
impl MarketDataProvider for SyntheticProvider {
    async fn get_candles(&self, pair: &str, interval_minutes: u32) -> Result<Vec<Candle>> {
        if interval_minutes == 0 {
            anyhow::bail!("interval must be positive");
        }
        Ok(self.generate(pair, interval_minutes))
    }

    async fn get_latest_price(&self, pair: &str) -> Result<f64> {
        let last = self
            .generate(pair, 60)
            .last()
            .map(|c| c.close)
            .context("empty synthetic history")?;
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let shock: f64 = self.rng_for(pair, 1_000_000 + tick).gen_range(-0.03..0.03);
        Ok(last * (1.0 + shock))
    }
}
