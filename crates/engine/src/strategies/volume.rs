//! Volume rules: OBV, money flow and participation spikes

use super::{Bar, Category, StrategyDef};

fn def(
    id: &'static str,
    name: &'static str,
    tp: f64,
    sl: f64,
    rule: fn(&Bar) -> bool,
) -> StrategyDef {
    StrategyDef::new(id, name, Category::Volume, tp, sl, rule)
}

fn volume_ratio(b: &Bar) -> f64 {
    let avg = b.now(&b.ind.volume_sma20);
    if avg > 0.0 {
        b.volume() / avg
    } else {
        0.0
    }
}

pub(super) fn catalog() -> Vec<StrategyDef> {
    vec![
        def("obv_ema_cross", "OBV EMA Cross", 2.5, 1.5, |b| {
            b.cross_above(&b.ind.obv, &b.ind.obv_ema20)
        }),
        def("volume_spike_up", "Volume Spike Up", 2.5, 1.5, |b| {
            volume_ratio(b) > 2.0 && b.is_bullish() && b.close() > b.at(&b.ind.close, 1)
        }),
        def("obv_new_high", "OBV New High", 3.0, 1.5, |b| {
            b.now(&b.ind.obv) > b.highest_prior(&b.ind.obv, 20) && b.close() > b.now(&b.ind.ema21)
        }),
        def("mfi_50_cross", "MFI 50 Cross", 2.5, 1.5, |b| {
            b.cross_above_level(&b.ind.mfi14, 50.0)
        }),
        def("volume_breakout", "Volume-Confirmed Breakout", 3.0, 1.5, |b| {
            b.close() > b.highest_prior(&b.ind.high, 20) && volume_ratio(b) > 1.5
        }),
        def("accumulation_bar", "Accumulation Bar", 2.0, 1.5, |b| {
            b.close_location() > 0.75 && volume_ratio(b) > 1.5 && b.close() > b.now(&b.ind.sma20)
        }),
        def("obv_divergence", "OBV Bullish Divergence", 2.5, 1.5, |b| {
            b.close() < b.at(&b.ind.close, 10) && b.now(&b.ind.obv) > b.at(&b.ind.obv, 10) && b.is_bullish()
        }),
        def("volume_dry_up_breakout", "Volume Dry-up Breakout", 2.5, 1.5, |b| {
            let avg = &b.ind.volume_sma20;
            let quiet = (1..=3).all(|k| b.at(&b.ind.volume, k) < b.at(avg, k));
            quiet && volume_ratio(b) > 1.5 && b.close() > b.at(&b.ind.high, 1)
        }),
        def("mfi_oversold_volume", "MFI Oversold on Volume", 2.0, 1.5, |b| {
            b.now(&b.ind.mfi14) < 25.0 && volume_ratio(b) > 1.0 && b.is_bullish()
        }),
        def("selling_climax", "Selling Climax Reversal", 2.0, 1.5, |b| {
            volume_ratio(b) > 3.0 && b.lower_wick() > 2.0 * b.body() && b.is_bullish()
        }),
        def("obv_trend_confirm", "OBV Trend Confirmation", 2.5, 1.5, |b| {
            b.cross_above(&b.ind.close, &b.ind.sma20) && b.now(&b.ind.obv) > b.now(&b.ind.obv_ema20)
        }),
        def("volume_macd", "Volume-Backed MACD Cross", 2.5, 1.5, |b| {
            b.cross_above(&b.ind.macd.line, &b.ind.macd.signal) && volume_ratio(b) > 1.0
        }),
    ]
}
