//! Composite rules combining several indicator families

use super::{Bar, Category, StrategyDef};

fn def(
    id: &'static str,
    name: &'static str,
    tp: f64,
    sl: f64,
    rule: fn(&Bar) -> bool,
) -> StrategyDef {
    StrategyDef::new(id, name, Category::Composite, tp, sl, rule)
}

fn above_average_volume(b: &Bar, factor: f64) -> bool {
    b.volume() > factor * b.now(&b.ind.volume_sma20)
}

pub(super) fn catalog() -> Vec<StrategyDef> {
    vec![
        def("macd_rsi_confirm", "MACD + RSI Confirmation", 2.5, 1.5, |b| {
            let rsi = b.now(&b.ind.rsi14);
            b.cross_above(&b.ind.macd.line, &b.ind.macd.signal) && rsi > 50.0 && rsi < 70.0
        }),
        def("ema_adx_volume", "EMA Cross + ADX + Volume", 3.0, 1.5, |b| {
            b.cross_above(&b.ind.ema9, &b.ind.ema21)
                && b.now(&b.ind.adx.adx) > 20.0
                && above_average_volume(b, 1.0)
        }),
        def("bb_rsi_stoch", "Bollinger + RSI + Stochastic", 2.0, 1.5, |b| {
            b.close() < b.now(&b.ind.bb.lower)
                && b.now(&b.ind.rsi14) < 30.0
                && b.now(&b.ind.stoch.k) > b.now(&b.ind.stoch.d)
        }),
        def("supertrend_macd", "Supertrend + MACD", 3.0, 1.5, |b| {
            b.now(&b.ind.supertrend.direction) > 0.0
                && b.cross_above(&b.ind.macd.line, &b.ind.macd.signal)
        }),
        def("triple_confirmation", "Triple Confirmation", 2.5, 1.5, |b| {
            b.close() > b.now(&b.ind.ema50)
                && b.now(&b.ind.macd.histogram) > 0.0
                && b.cross_above_level(&b.ind.rsi14, 55.0)
        }),
        def("donchian_adx_volume", "Donchian + ADX + Volume", 3.5, 1.5, |b| {
            b.close() > b.highest_prior(&b.ind.high, 20)
                && b.now(&b.ind.adx.adx) > 25.0
                && above_average_volume(b, 1.5)
        }),
        def("mfi_obv_confirm", "MFI + OBV Confirmation", 2.5, 1.5, |b| {
            b.cross_above_level(&b.ind.mfi14, 50.0)
                && b.now(&b.ind.obv) > b.now(&b.ind.obv_ema20)
                && b.close() > b.now(&b.ind.sma20)
        }),
        def("kama_stoch", "KAMA + Stochastic", 2.0, 1.5, |b| {
            b.close() > b.now(&b.ind.kama)
                && b.cross_above(&b.ind.stoch.k, &b.ind.stoch.d)
                && b.now(&b.ind.stoch.k) < 50.0
        }),
        def("cci_macd", "CCI + MACD", 2.5, 1.5, |b| {
            b.cross_above_level(&b.ind.cci20, 0.0) && b.now(&b.ind.macd.line) > b.now(&b.ind.macd.signal)
        }),
        def("trend_momentum_volume", "Trend + Momentum + Volume", 2.5, 1.5, |b| {
            b.now(&b.ind.ema21) > b.now(&b.ind.ema50)
                && b.now(&b.ind.roc5) > 1.0
                && above_average_volume(b, 1.5)
                && b.is_bullish()
        }),
        def("reversal_cluster", "Reversal Cluster", 2.0, 1.5, |b| {
            b.now(&b.ind.rsi7) < 30.0
                && b.now(&b.ind.stoch.k) < 20.0
                && b.is_bullish()
                && b.low() <= b.now(&b.ind.bb.lower)
        }),
        def("all_systems_go", "All Systems Go", 3.0, 1.5, |b| {
            b.now(&b.ind.supertrend.direction) > 0.0
                && b.now(&b.ind.adx.adx) > 25.0
                && b.now(&b.ind.adx.plus_di) > b.now(&b.ind.adx.minus_di)
                && b.now(&b.ind.macd.line) > 0.0
                && b.cross_above(&b.ind.close, &b.ind.ema9)
        }),
    ]
}
