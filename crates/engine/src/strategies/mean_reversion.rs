//! Mean-reversion rules: oversold oscillators and band excursions

use super::{Bar, Category, StrategyDef};

fn def(
    id: &'static str,
    name: &'static str,
    tp: f64,
    sl: f64,
    rule: fn(&Bar) -> bool,
) -> StrategyDef {
    StrategyDef::new(id, name, Category::MeanReversion, tp, sl, rule)
}

pub(super) fn catalog() -> Vec<StrategyDef> {
    vec![
        def("rsi_oversold_bounce", "RSI Oversold Bounce", 2.0, 1.5, |b| {
            b.cross_above_level(&b.ind.rsi14, 30.0)
        }),
        def("rsi7_extreme", "RSI7 Extreme Reversal", 1.5, 1.0, |b| {
            b.cross_above_level(&b.ind.rsi7, 20.0)
        }),
        def("bb_lower_reentry", "Bollinger Lower Re-entry", 2.0, 1.5, |b| {
            b.cross_above(&b.ind.close, &b.ind.bb.lower)
        }),
        def("bb_lower_touch", "Bollinger Lower Touch", 2.0, 1.5, |b| {
            b.low() <= b.now(&b.ind.bb.lower) && b.is_bullish() && b.now(&b.ind.rsi14) < 40.0
        }),
        def("stoch_oversold_cross", "Stochastic Oversold Cross", 2.0, 1.5, |b| {
            b.cross_above(&b.ind.stoch.k, &b.ind.stoch.d) && b.now(&b.ind.stoch.k) < 30.0
        }),
        def("cci_oversold", "CCI Oversold Reversal", 2.0, 1.5, |b| {
            b.cross_above_level(&b.ind.cci20, -100.0)
        }),
        def("mfi_oversold", "MFI Oversold", 2.0, 1.5, |b| {
            b.cross_above_level(&b.ind.mfi14, 20.0)
        }),
        def("sma20_deviation", "SMA20 Deviation", 2.0, 1.5, |b| {
            b.close() < b.now(&b.ind.sma20) * 0.97 && b.is_bullish()
        }),
        def("donchian_low_reject", "Donchian Low Rejection", 2.0, 1.25, |b| {
            b.low() <= b.now(&b.ind.donchian20.lower) && b.close_location() > 0.6
        }),
        def("rsi_bb_combo", "RSI + Bollinger Oversold", 2.0, 1.5, |b| {
            b.now(&b.ind.rsi14) < 35.0 && b.close() < b.now(&b.ind.bb.lower)
        }),
        def("roc_snapback", "ROC Snapback", 2.0, 1.5, |b| {
            b.now(&b.ind.roc5) < -4.0 && b.close() > b.at(&b.ind.close, 1)
        }),
        def("kama_deviation", "KAMA Deviation", 2.0, 1.5, |b| {
            b.close() < b.now(&b.ind.kama) * 0.98 && b.is_bullish() && b.now(&b.ind.rsi7) < 30.0
        }),
        def("stoch_floor_release", "Stochastic Floor Release", 2.0, 1.5, |b| {
            b.at(&b.ind.stoch.k, 1) < 10.0 && b.now(&b.ind.stoch.k) > 20.0
        }),
    ]
}
