//! Technical indicator library
//!
//! Pure, walk-forward-safe transforms from OHLCV slices to full-length
//! series. Every function follows the same warm-up policy: the output has
//! the same length as the input, and positions before the first fully
//! defined value hold the indicator's seed (first input for price-level
//! series, the neutral value for oscillators). Nothing is ever NaN and a
//! value at index `i` only ever depends on inputs `0..=i`.
//!
//! The `ta` crate provides the streaming SMA, Bollinger, stochastic, CCI
//! and MFI calculations. Wilder-smoothed and SMA-seeded series are computed here.

use serde::Serialize;
use ta::indicators::{
    BollingerBands, CommodityChannelIndex, FastStochastic, MoneyFlowIndex, SimpleMovingAverage,
};
use ta::{DataItem, Next};

use crate::types::Candle;

pub const RSI_NEUTRAL: f64 = 50.0;
pub const ADX_NEUTRAL: f64 = 25.0;
pub const STOCH_NEUTRAL: f64 = 50.0;
pub const MFI_NEUTRAL: f64 = 50.0;

// ============================================================================
// Output groups
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Bollinger {
    pub mid: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
    /// (upper - lower) / mid
    pub bandwidth: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Macd {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stochastic {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Adx {
    pub adx: Vec<f64>,
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Donchian {
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
    pub mid: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Supertrend {
    pub line: Vec<f64>,
    /// +1.0 while the trend is up, -1.0 while down
    pub direction: Vec<f64>,
}

// ============================================================================
// Helpers
// ============================================================================

/// Build a `ta` data item, falling back to a flat bar when the OHLC values
/// are inconsistent (the builder rejects low > high and negative volume).
fn data_item(high: f64, low: f64, close: f64, volume: f64) -> Option<DataItem> {
    DataItem::builder()
        .open(close)
        .high(high)
        .low(low)
        .close(close)
        .volume(volume)
        .build()
        .or_else(|_| {
            DataItem::builder()
                .open(close)
                .high(close)
                .low(close)
                .close(close)
                .volume(volume.max(0.0))
                .build()
        })
        .ok()
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

fn window_max(values: &[f64], end: usize, len: usize) -> f64 {
    values[end + 1 - len..=end]
        .iter()
        .fold(f64::MIN, |acc, &v| acc.max(v))
}

fn window_min(values: &[f64], end: usize, len: usize) -> f64 {
    values[end + 1 - len..=end]
        .iter()
        .fold(f64::MAX, |acc, &v| acc.min(v))
}

// ============================================================================
// Moving averages
// ============================================================================

/// Simple moving average
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let Some(&seed) = values.first() else {
        return Vec::new();
    };
    let mut out = vec![seed; values.len()];
    let Ok(mut indicator) = SimpleMovingAverage::new(period) else {
        return out;
    };

    for (i, &value) in values.iter().enumerate() {
        let avg = indicator.next(value);
        if i + 1 >= period {
            out[i] = avg;
        }
    }
    out
}

/// Exponential moving average seeded with the SMA of the first `period` inputs
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let Some(&seed) = values.first() else {
        return Vec::new();
    };
    let mut out = vec![seed; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut current = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = current;

    for i in period..values.len() {
        current += alpha * (values[i] - current);
        out[i] = current;
    }
    out
}

/// Kaufman adaptive moving average
pub fn kama(values: &[f64], er_period: usize, fast: usize, slow: usize) -> Vec<f64> {
    let Some(&seed) = values.first() else {
        return Vec::new();
    };
    let mut out = vec![seed; values.len()];
    if er_period == 0 || values.len() <= er_period {
        return out;
    }

    let fast_sc = 2.0 / (fast as f64 + 1.0);
    let slow_sc = 2.0 / (slow as f64 + 1.0);
    let mut current = values[er_period - 1];
    out[er_period - 1] = current;

    for i in er_period..values.len() {
        let change = (values[i] - values[i - er_period]).abs();
        let volatility: f64 = (i + 1 - er_period..=i)
            .map(|j| (values[j] - values[j - 1]).abs())
            .sum();
        let efficiency = if volatility > 0.0 {
            change / volatility
        } else {
            0.0
        };
        let sc = (efficiency * (fast_sc - slow_sc) + slow_sc).powi(2);
        current += sc * (values[i] - current);
        out[i] = current;
    }
    out
}

// ============================================================================
// Momentum
// ============================================================================

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss <= 0.0 {
        if avg_gain <= 0.0 {
            RSI_NEUTRAL
        } else {
            100.0
        }
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

/// Relative Strength Index with Wilder smoothing
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![RSI_NEUTRAL; values.len()];
    if period == 0 || values.len() <= period {
        return out;
    }

    let p = period as f64;
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = values[i] - values[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= p;
    avg_loss /= p;
    out[period] = rsi_from_averages(avg_gain, avg_loss);

    for i in period + 1..values.len() {
        let change = values[i] - values[i - 1];
        avg_gain = (avg_gain * (p - 1.0) + change.max(0.0)) / p;
        avg_loss = (avg_loss * (p - 1.0) + (-change).max(0.0)) / p;
        out[i] = rsi_from_averages(avg_gain, avg_loss);
    }
    out
}

/// MACD line, signal line and histogram
pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let n = values.len();
    let mut out = Macd {
        line: vec![0.0; n],
        signal: vec![0.0; n],
        histogram: vec![0.0; n],
    };
    if fast == 0 || slow == 0 || signal == 0 || n < slow {
        return out;
    }

    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);
    let start = slow - 1;
    for i in start..n {
        out.line[i] = fast_ema[i] - slow_ema[i];
    }

    let signal_ema = ema(&out.line[start..], signal);
    let signal_start = start + signal - 1;
    for i in signal_start..n {
        out.signal[i] = signal_ema[i - start];
        out.histogram[i] = out.line[i] - out.signal[i];
    }
    out
}

/// Stochastic oscillator: raw %K and its SMA %D
pub fn stochastic(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    k_period: usize,
    d_period: usize,
) -> Stochastic {
    let n = close.len();
    let mut out = Stochastic {
        k: vec![STOCH_NEUTRAL; n],
        d: vec![STOCH_NEUTRAL; n],
    };
    let (Ok(mut fast), Ok(mut smooth)) = (
        FastStochastic::new(k_period),
        SimpleMovingAverage::new(d_period),
    ) else {
        return out;
    };
    if n < k_period {
        return out;
    }

    for i in 0..n {
        let k = data_item(high[i], low[i], close[i], 0.0)
            .map(|item| finite_or(fast.next(&item), STOCH_NEUTRAL).clamp(0.0, 100.0))
            .unwrap_or(STOCH_NEUTRAL);
        if i + 1 < k_period {
            continue;
        }
        out.k[i] = k;
        let d = smooth.next(k);
        if i + 2 >= k_period + d_period {
            out.d[i] = d;
        }
    }
    out
}

/// Commodity Channel Index
pub fn cci(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![0.0; n];
    let Ok(mut indicator) = CommodityChannelIndex::new(period) else {
        return out;
    };

    for i in 0..n {
        let Some(item) = data_item(high[i], low[i], close[i], 0.0) else {
            continue;
        };
        let value = indicator.next(&item);
        if i + 1 >= period {
            out[i] = finite_or(value, 0.0);
        }
    }
    out
}

/// Rate of change in percent over `period` bars
pub fn rate_of_change(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![0.0; values.len()];
    if period == 0 {
        return out;
    }
    for i in period..values.len() {
        let base = values[i - period];
        if base != 0.0 {
            out[i] = (values[i] / base - 1.0) * 100.0;
        }
    }
    out
}

// ============================================================================
// Volatility
// ============================================================================

/// True range; the first bar uses high - low
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    (0..close.len())
        .map(|i| {
            let hl = high[i] - low[i];
            if i == 0 {
                hl
            } else {
                let hc = (high[i] - close[i - 1]).abs();
                let lc = (low[i] - close[i - 1]).abs();
                hl.max(hc).max(lc)
            }
        })
        .collect()
}

/// Average True Range with Wilder smoothing, seeded by the SMA of the first
/// `period` true ranges
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let tr = true_range(high, low, close);
    let Some(&seed) = tr.first() else {
        return Vec::new();
    };
    let mut out = vec![seed; tr.len()];
    if period == 0 || tr.len() < period {
        return out;
    }

    let p = period as f64;
    let mut current = tr[..period].iter().sum::<f64>() / p;
    out[period - 1] = current;
    for i in period..tr.len() {
        current = (current * (p - 1.0) + tr[i]) / p;
        out[i] = current;
    }
    out
}

/// Bollinger bands (population standard deviation)
pub fn bollinger(values: &[f64], period: usize, multiplier: f64) -> Bollinger {
    let Some(&seed) = values.first() else {
        return Bollinger::default();
    };
    let n = values.len();
    let mut out = Bollinger {
        mid: vec![seed; n],
        upper: vec![seed; n],
        lower: vec![seed; n],
        bandwidth: vec![0.0; n],
    };
    let Ok(mut indicator) = BollingerBands::new(period, multiplier) else {
        return out;
    };

    for (i, &value) in values.iter().enumerate() {
        let bands = indicator.next(value);
        if i + 1 >= period {
            out.mid[i] = bands.average;
            out.upper[i] = bands.upper;
            out.lower[i] = bands.lower;
            out.bandwidth[i] = if bands.average != 0.0 {
                finite_or((bands.upper - bands.lower) / bands.average, 0.0)
            } else {
                0.0
            };
        }
    }
    out
}

/// Donchian channel over `period` bars, current bar included
pub fn donchian(high: &[f64], low: &[f64], period: usize) -> Donchian {
    let n = high.len();
    if n == 0 {
        return Donchian::default();
    }
    let mut out = Donchian {
        upper: vec![high[0]; n],
        lower: vec![low[0]; n],
        mid: vec![(high[0] + low[0]) / 2.0; n],
    };
    if period == 0 || n < period {
        return out;
    }

    for i in period - 1..n {
        out.upper[i] = window_max(high, i, period);
        out.lower[i] = window_min(low, i, period);
        out.mid[i] = (out.upper[i] + out.lower[i]) / 2.0;
    }
    out
}

/// Supertrend over ATR(`period`) bands
pub fn supertrend(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
    multiplier: f64,
) -> Supertrend {
    let n = close.len();
    if n == 0 {
        return Supertrend::default();
    }
    let mut out = Supertrend {
        line: vec![close[0]; n],
        direction: vec![1.0; n],
    };
    if period == 0 || n < period {
        return out;
    }

    let atr = atr(high, low, close, period);
    let hl2 = |i: usize| (high[i] + low[i]) / 2.0;

    let w = period - 1;
    let mut final_upper = hl2(w) + multiplier * atr[w];
    let mut final_lower = hl2(w) - multiplier * atr[w];
    let mut is_up = close[w] >= hl2(w);
    out.line[w] = if is_up { final_lower } else { final_upper };
    out.direction[w] = if is_up { 1.0 } else { -1.0 };

    for i in w + 1..n {
        let basic_upper = hl2(i) + multiplier * atr[i];
        let basic_lower = hl2(i) - multiplier * atr[i];

        if basic_upper < final_upper || close[i - 1] > final_upper {
            final_upper = basic_upper;
        }
        if basic_lower > final_lower || close[i - 1] < final_lower {
            final_lower = basic_lower;
        }

        is_up = if is_up {
            close[i] >= final_lower
        } else {
            close[i] > final_upper
        };
        out.line[i] = if is_up { final_lower } else { final_upper };
        out.direction[i] = if is_up { 1.0 } else { -1.0 };
    }
    out
}

// ============================================================================
// Trend strength
// ============================================================================

/// ADX with +DI / -DI, Wilder smoothing
pub fn adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Adx {
    let n = close.len();
    let mut out = Adx {
        adx: vec![ADX_NEUTRAL; n],
        plus_di: vec![0.0; n],
        minus_di: vec![0.0; n],
    };
    if period == 0 || n <= period {
        return out;
    }

    let directional = |i: usize| {
        let tr = (high[i] - low[i])
            .max((high[i] - close[i - 1]).abs())
            .max((low[i] - close[i - 1]).abs());
        let up_move = high[i] - high[i - 1];
        let down_move = low[i - 1] - low[i];
        let plus_dm = if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        };
        let minus_dm = if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        };
        (tr, plus_dm, minus_dm)
    };

    let p = period as f64;
    let (mut tr_s, mut plus_s, mut minus_s) = (0.0, 0.0, 0.0);
    for i in 1..=period {
        let (tr, pdm, mdm) = directional(i);
        tr_s += tr;
        plus_s += pdm;
        minus_s += mdm;
    }

    let mut dx = vec![0.0; n];
    for i in period..n {
        if i > period {
            let (tr, pdm, mdm) = directional(i);
            tr_s = tr_s - tr_s / p + tr;
            plus_s = plus_s - plus_s / p + pdm;
            minus_s = minus_s - minus_s / p + mdm;
        }
        let (pdi, mdi) = if tr_s > 0.0 {
            (plus_s / tr_s * 100.0, minus_s / tr_s * 100.0)
        } else {
            (0.0, 0.0)
        };
        out.plus_di[i] = pdi;
        out.minus_di[i] = mdi;
        dx[i] = if pdi + mdi > 0.0 {
            (pdi - mdi).abs() / (pdi + mdi) * 100.0
        } else {
            0.0
        };
    }

    let first = 2 * period - 1;
    if n > first {
        let mut current = dx[period..=first].iter().sum::<f64>() / p;
        out.adx[first] = current;
        for i in first + 1..n {
            current = (current * (p - 1.0) + dx[i]) / p;
            out.adx[i] = current;
        }
    }
    out
}

// ============================================================================
// Volume
// ============================================================================

/// On-balance volume, starting at zero
pub fn obv(close: &[f64], volume: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; close.len()];
    for i in 1..close.len() {
        out[i] = if close[i] > close[i - 1] {
            out[i - 1] + volume[i]
        } else if close[i] < close[i - 1] {
            out[i - 1] - volume[i]
        } else {
            out[i - 1]
        };
    }
    out
}

/// Money Flow Index
pub fn mfi(high: &[f64], low: &[f64], close: &[f64], volume: &[f64], period: usize) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![MFI_NEUTRAL; n];
    let Ok(mut indicator) = MoneyFlowIndex::new(period) else {
        return out;
    };

    for i in 0..n {
        let Some(item) = data_item(high[i], low[i], close[i], volume[i]) else {
            continue;
        };
        let value = indicator.next(&item);
        if i >= period {
            out[i] = finite_or(value, MFI_NEUTRAL).clamp(0.0, 100.0);
        }
    }
    out
}

// ============================================================================
// Indicator bundle
// ============================================================================

/// Every series the strategy catalog reads, computed once per candle sequence
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndicatorBundle {
    pub timestamps: Vec<i64>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,

    pub sma10: Vec<f64>,
    pub sma20: Vec<f64>,
    pub sma50: Vec<f64>,
    pub ema9: Vec<f64>,
    pub ema12: Vec<f64>,
    pub ema21: Vec<f64>,
    pub ema26: Vec<f64>,
    pub ema50: Vec<f64>,
    pub kama: Vec<f64>,

    pub rsi7: Vec<f64>,
    pub rsi14: Vec<f64>,
    pub macd: Macd,
    pub stoch: Stochastic,
    pub cci20: Vec<f64>,
    pub roc5: Vec<f64>,
    pub roc10: Vec<f64>,

    pub atr14: Vec<f64>,
    pub bb: Bollinger,
    pub donchian20: Donchian,
    pub donchian55: Donchian,
    pub supertrend: Supertrend,
    pub adx: Adx,

    pub obv: Vec<f64>,
    pub obv_ema20: Vec<f64>,
    pub mfi14: Vec<f64>,
    pub volume_sma20: Vec<f64>,
}

impl IndicatorBundle {
    /// Longest lookback in the bundle (Donchian 55)
    pub const WARMUP: usize = 55;

    pub fn new(candles: &[Candle]) -> Self {
        let timestamps: Vec<i64> = candles.iter().map(|c| c.timestamp).collect();
        let open: Vec<f64> = candles.iter().map(|c| c.open).collect();
        let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let low: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let volume: Vec<f64> = candles.iter().map(|c| c.volume).collect();

        let obv = obv(&close, &volume);
        let obv_ema20 = ema(&obv, 20);

        Self {
            sma10: sma(&close, 10),
            sma20: sma(&close, 20),
            sma50: sma(&close, 50),
            ema9: ema(&close, 9),
            ema12: ema(&close, 12),
            ema21: ema(&close, 21),
            ema26: ema(&close, 26),
            ema50: ema(&close, 50),
            kama: kama(&close, 10, 2, 30),

            rsi7: rsi(&close, 7),
            rsi14: rsi(&close, 14),
            macd: macd(&close, 12, 26, 9),
            stoch: stochastic(&high, &low, &close, 14, 3),
            cci20: cci(&high, &low, &close, 20),
            roc5: rate_of_change(&close, 5),
            roc10: rate_of_change(&close, 10),

            atr14: atr(&high, &low, &close, 14),
            bb: bollinger(&close, 20, 2.0),
            donchian20: donchian(&high, &low, 20),
            donchian55: donchian(&high, &low, 55),
            supertrend: supertrend(&high, &low, &close, 10, 3.0),
            adx: adx(&high, &low, &close, 14),

            obv,
            obv_ema20,
            mfi14: mfi(&high, &low, &close, &volume, 14),
            volume_sma20: sma(&volume, 20),

            timestamps,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// Every derived series by name, for inspection and export
    pub fn series(&self) -> Vec<(&'static str, &[f64])> {
        vec![
            ("sma10", &self.sma10),
            ("sma20", &self.sma20),
            ("sma50", &self.sma50),
            ("ema9", &self.ema9),
            ("ema12", &self.ema12),
            ("ema21", &self.ema21),
            ("ema26", &self.ema26),
            ("ema50", &self.ema50),
            ("kama", &self.kama),
            ("rsi7", &self.rsi7),
            ("rsi14", &self.rsi14),
            ("macd_line", &self.macd.line),
            ("macd_signal", &self.macd.signal),
            ("macd_histogram", &self.macd.histogram),
            ("stoch_k", &self.stoch.k),
            ("stoch_d", &self.stoch.d),
            ("cci20", &self.cci20),
            ("roc5", &self.roc5),
            ("roc10", &self.roc10),
            ("atr14", &self.atr14),
            ("bb_mid", &self.bb.mid),
            ("bb_upper", &self.bb.upper),
            ("bb_lower", &self.bb.lower),
            ("bb_bandwidth", &self.bb.bandwidth),
            ("donchian20_upper", &self.donchian20.upper),
            ("donchian20_lower", &self.donchian20.lower),
            ("donchian20_mid", &self.donchian20.mid),
            ("donchian55_upper", &self.donchian55.upper),
            ("donchian55_lower", &self.donchian55.lower),
            ("supertrend", &self.supertrend.line),
            ("supertrend_direction", &self.supertrend.direction),
            ("adx", &self.adx.adx),
            ("plus_di", &self.adx.plus_di),
            ("minus_di", &self.adx.minus_di),
            ("obv", &self.obv),
            ("obv_ema20", &self.obv_ema20),
            ("mfi14", &self.mfi14),
            ("volume_sma20", &self.volume_sma20),
        ]
    }
}
