//! Momentum rules: oscillator crosses and rate-of-change thrusts

use super::{Bar, Category, StrategyDef};

fn def(
    id: &'static str,
    name: &'static str,
    tp: f64,
    sl: f64,
    rule: fn(&Bar) -> bool,
) -> StrategyDef {
    StrategyDef::new(id, name, Category::Momentum, tp, sl, rule)
}

pub(super) fn catalog() -> Vec<StrategyDef> {
    vec![
        def("macd_signal_cross", "MACD Signal Cross", 2.5, 1.5, |b| {
            b.cross_above(&b.ind.macd.line, &b.ind.macd.signal)
        }),
        def("macd_histogram_turn", "MACD Histogram Turn", 2.5, 1.5, |b| {
            let h = &b.ind.macd.histogram;
            b.now(h) < 0.0 && b.now(h) > b.at(h, 1) && b.at(h, 1) < b.at(h, 2)
        }),
        def("rsi_50_cross", "RSI 50 Cross", 2.5, 1.5, |b| {
            b.cross_above_level(&b.ind.rsi14, 50.0)
        }),
        def("rsi7_thrust", "RSI7 Thrust", 2.0, 1.25, |b| {
            b.cross_above_level(&b.ind.rsi7, 60.0) && b.now(&b.ind.rsi14) > 50.0
        }),
        def("roc10_breakout", "ROC10 Breakout", 3.0, 1.5, |b| {
            b.cross_above_level(&b.ind.roc10, 3.0)
        }),
        def("roc5_thrust", "ROC5 Thrust", 2.5, 1.5, |b| {
            b.cross_above_level(&b.ind.roc5, 2.0) && b.now(&b.ind.roc10) > 0.0
        }),
        def("stoch_midrange_cross", "Stochastic Mid-range Cross", 2.0, 1.5, |b| {
            let k = b.now(&b.ind.stoch.k);
            b.cross_above(&b.ind.stoch.k, &b.ind.stoch.d) && (40.0..=80.0).contains(&k)
        }),
        def("cci_zero_cross", "CCI Zero Cross", 2.5, 1.5, |b| {
            b.cross_above_level(&b.ind.cci20, 0.0)
        }),
        def("cci_100_breakout", "CCI 100 Breakout", 3.0, 1.5, |b| {
            b.cross_above_level(&b.ind.cci20, 100.0)
        }),
        def("macd_bull_zone_cross", "MACD Cross Above Zero", 3.0, 1.5, |b| {
            b.cross_above(&b.ind.macd.line, &b.ind.macd.signal) && b.now(&b.ind.macd.line) > 0.0
        }),
        def("adx_25_breakout", "ADX 25 Breakout", 3.0, 1.5, |b| {
            b.cross_above_level(&b.ind.adx.adx, 25.0)
                && b.now(&b.ind.adx.plus_di) > b.now(&b.ind.adx.minus_di)
        }),
        def("three_higher_closes", "Three Higher Closes", 2.0, 1.5, |b| {
            let c = &b.ind.close;
            b.now(c) > b.at(c, 1)
                && b.at(c, 1) > b.at(c, 2)
                && b.at(c, 2) > b.at(c, 3)
                && b.at(c, 3) <= b.at(c, 4)
        }),
        def("kama_slope_up", "KAMA Slope Up", 2.5, 1.5, |b| {
            let k = &b.ind.kama;
            b.now(k) > b.at(k, 1) && b.at(k, 1) <= b.at(k, 2) && b.close() > b.now(k)
        }),
    ]
}
