//! Volatility and breakout rules: channels, bands and range expansion

use super::{Bar, Category, StrategyDef};

fn def(
    id: &'static str,
    name: &'static str,
    tp: f64,
    sl: f64,
    rule: fn(&Bar) -> bool,
) -> StrategyDef {
    StrategyDef::new(id, name, Category::Volatility, tp, sl, rule)
}

fn keltner_upper(b: &Bar, back: usize) -> f64 {
    b.at(&b.ind.ema21, back) + 2.0 * b.at(&b.ind.atr14, back)
}

pub(super) fn catalog() -> Vec<StrategyDef> {
    vec![
        def("donchian20_breakout", "Donchian 20 Breakout", 3.0, 1.5, |b| {
            b.close() > b.highest_prior(&b.ind.high, 20)
        }),
        def("donchian55_breakout", "Donchian 55 Breakout", 4.0, 2.0, |b| {
            b.close() > b.highest_prior(&b.ind.high, 55)
        }),
        def("bb_upper_breakout", "Bollinger Upper Breakout", 3.0, 1.5, |b| {
            b.cross_above(&b.ind.close, &b.ind.bb.upper)
        }),
        def("bb_squeeze_release", "Bollinger Squeeze Release", 3.0, 1.5, |b| {
            let bw = &b.ind.bb.bandwidth;
            let squeezed = b.at(bw, 1) <= b.lowest_prior(bw, 20) * 1.1;
            squeezed && b.close() > b.now(&b.ind.bb.mid) && b.close() > b.at(&b.ind.high, 1)
        }),
        def("atr_expansion", "ATR Expansion Up", 3.0, 2.0, |b| {
            b.atr() > 1.3 * b.at(&b.ind.atr14, 5) && b.is_bullish() && b.close() > b.now(&b.ind.ema21)
        }),
        def("keltner_breakout", "Keltner Breakout", 3.0, 1.5, |b| {
            b.close() > keltner_upper(b, 0) && b.at(&b.ind.close, 1) <= keltner_upper(b, 1)
        }),
        def("range_expansion_bar", "Range Expansion Bar", 2.5, 1.5, |b| {
            b.range() > 2.0 * b.atr() && b.close_location() > 0.7
        }),
        def("nr7_breakout", "NR7 Breakout", 2.5, 1.25, |b| {
            let narrow = (2..=7).all(|k| b.range_at(1) <= b.range_at(k));
            narrow && b.close() > b.at(&b.ind.high, 1)
        }),
        def("contraction_pullback", "Volatility Contraction Pullback", 2.5, 1.5, |b| {
            b.atr() < b.at(&b.ind.atr14, 10) * 0.8
                && b.close() > b.now(&b.ind.sma50)
                && b.cross_above(&b.ind.close, &b.ind.ema9)
        }),
        def("bb_band_walk", "Bollinger Band Walk", 2.5, 1.5, |b| {
            b.close() > b.now(&b.ind.bb.upper) && b.at(&b.ind.close, 1) > b.at(&b.ind.bb.upper, 1)
        }),
        def("donchian_mid_reclaim", "Donchian Mid Reclaim", 2.5, 1.5, |b| {
            b.cross_above(&b.ind.close, &b.ind.donchian20.mid) && b.now(&b.ind.adx.adx) < 20.0
        }),
        def("atr_channel_bounce", "ATR Channel Bounce", 2.0, 1.5, |b| {
            let ema = b.now(&b.ind.ema21);
            b.low() <= ema - b.atr() && b.close() > ema - 0.5 * b.atr()
        }),
        def("supertrend_expansion", "Supertrend Expansion Breakout", 3.0, 1.5, |b| {
            b.now(&b.ind.supertrend.direction) > 0.0
                && b.close() > b.highest_prior(&b.ind.high, 10)
                && b.atr() > b.at(&b.ind.atr14, 1)
        }),
    ]
}
