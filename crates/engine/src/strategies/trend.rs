//! Trend-following rules: moving-average crosses and trend alignment

use super::{Bar, Category, StrategyDef};

fn def(
    id: &'static str,
    name: &'static str,
    tp: f64,
    sl: f64,
    rule: fn(&Bar) -> bool,
) -> StrategyDef {
    StrategyDef::new(id, name, Category::Trend, tp, sl, rule)
}

fn ema_stack(b: &Bar, back: usize) -> bool {
    let ind = b.ind;
    b.at(&ind.ema9, back) > b.at(&ind.ema21, back) && b.at(&ind.ema21, back) > b.at(&ind.ema50, back)
}

pub(super) fn catalog() -> Vec<StrategyDef> {
    vec![
        def("ema_cross_9_21", "EMA 9/21 Cross", 3.0, 1.5, |b| {
            b.cross_above(&b.ind.ema9, &b.ind.ema21)
        }),
        def("ema_cross_12_26", "EMA 12/26 Cross", 3.0, 1.5, |b| {
            b.cross_above(&b.ind.ema12, &b.ind.ema26)
        }),
        def("sma_cross_10_20", "SMA 10/20 Cross", 2.5, 1.5, |b| {
            b.cross_above(&b.ind.sma10, &b.ind.sma20)
        }),
        def("golden_cross_20_50", "Golden Cross 20/50", 4.0, 2.0, |b| {
            b.cross_above(&b.ind.sma20, &b.ind.sma50)
        }),
        def("ema_stack_bull", "Bullish EMA Stack", 3.0, 1.5, |b| {
            ema_stack(b, 0) && !ema_stack(b, 1)
        }),
        def("ema50_pullback", "EMA50 Trend Pullback", 2.5, 1.5, |b| {
            let ind = b.ind;
            b.close() > b.now(&ind.ema50)
                && b.low() <= b.now(&ind.ema21)
                && b.close() > b.now(&ind.ema21)
                && b.is_bullish()
        }),
        def("supertrend_flip", "Supertrend Flip Up", 3.0, 1.5, |b| {
            b.now(&b.ind.supertrend.direction) > 0.0 && b.at(&b.ind.supertrend.direction, 1) < 0.0
        }),
        def("di_cross_adx", "DI Cross with ADX", 3.0, 1.5, |b| {
            b.cross_above(&b.ind.adx.plus_di, &b.ind.adx.minus_di) && b.now(&b.ind.adx.adx) > 20.0
        }),
        def("kama_cross", "KAMA Cross", 2.5, 1.5, |b| {
            b.cross_above(&b.ind.close, &b.ind.kama)
        }),
        def("macd_zero_cross", "MACD Zero Cross", 3.0, 1.5, |b| {
            b.cross_above_level(&b.ind.macd.line, 0.0)
        }),
        def("ema21_slope_turn", "EMA21 Slope Turn", 2.5, 1.5, |b| {
            let ema = &b.ind.ema21;
            b.now(ema) > b.at(ema, 1) && b.at(ema, 1) <= b.at(ema, 2) && b.close() > b.now(ema)
        }),
        def("sma50_reclaim", "SMA50 Reclaim", 3.0, 2.0, |b| {
            b.cross_above(&b.ind.close, &b.ind.sma50)
        }),
        def("triple_ema_pullback", "Triple EMA Pullback", 2.5, 1.25, |b| {
            b.cross_above(&b.ind.close, &b.ind.ema9) && ema_stack(b, 0)
        }),
    ]
}
