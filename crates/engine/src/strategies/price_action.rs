//! Candlestick and market-structure rules

use super::{Bar, Category, StrategyDef};

fn def(
    id: &'static str,
    name: &'static str,
    tp: f64,
    sl: f64,
    rule: fn(&Bar) -> bool,
) -> StrategyDef {
    StrategyDef::new(id, name, Category::PriceAction, tp, sl, rule)
}

/// Open/high/low/close `back` bars ago
fn ohlc(b: &Bar, back: usize) -> (f64, f64, f64, f64) {
    let ind = b.ind;
    (
        b.at(&ind.open, back),
        b.at(&ind.high, back),
        b.at(&ind.low, back),
        b.at(&ind.close, back),
    )
}

pub(super) fn catalog() -> Vec<StrategyDef> {
    vec![
        def("bullish_engulfing", "Bullish Engulfing", 2.0, 1.5, |b| {
            let (po, _, _, pc) = ohlc(b, 1);
            pc < po && b.is_bullish() && b.open() <= pc && b.close() >= po
        }),
        def("hammer", "Hammer", 2.0, 1.5, |b| {
            let body = b.body();
            body > 0.0
                && b.lower_wick() >= 2.0 * body
                && b.upper_wick() <= body
                && b.close() < b.now(&b.ind.sma20)
        }),
        def("inside_bar_breakout", "Inside Bar Breakout", 2.5, 1.25, |b| {
            let (_, h1, l1, _) = ohlc(b, 1);
            let (_, h2, l2, _) = ohlc(b, 2);
            h1 < h2 && l1 > l2 && b.close() > h1
        }),
        def("higher_low_structure", "Higher Low Structure", 2.0, 1.5, |b| {
            let (_, h1, l1, _) = ohlc(b, 1);
            let (_, _, l2, _) = ohlc(b, 2);
            b.low() > l1 && l1 > l2 && b.close() > h1
        }),
        def("morning_star", "Morning Star", 2.5, 1.5, |b| {
            let (o2, h2, l2, c2) = ohlc(b, 2);
            let (o1, _, _, c1) = ohlc(b, 1);
            let body2 = o2 - c2;
            body2 > 0.6 * (h2 - l2)
                && (c1 - o1).abs() < 0.3 * body2
                && b.is_bullish()
                && b.close() > (o2 + c2) / 2.0
        }),
        def("piercing_line", "Piercing Line", 2.0, 1.5, |b| {
            let (po, _, pl, pc) = ohlc(b, 1);
            pc < po && b.open() < pl && b.close() > (po + pc) / 2.0 && b.close() < po
        }),
        def("three_white_soldiers", "Three White Soldiers", 2.5, 1.5, |b| {
            (0..3).all(|k| {
                let (o, _, _, c) = ohlc(b, k);
                let (po, _, _, pc) = ohlc(b, k + 1);
                c > o && c > pc && o >= po.min(pc) && o <= po.max(pc)
            })
        }),
        def("gap_up_hold", "Gap Up Hold", 2.5, 1.5, |b| {
            b.open() > b.at(&b.ind.high, 1) && b.is_bullish()
        }),
        def("pin_bar_support", "Pin Bar at Support", 2.0, 1.25, |b| {
            b.lower_wick() > 0.6 * b.range() && b.low() <= b.lowest_prior(&b.ind.low, 10)
        }),
        def("outside_bar_reversal", "Outside Bar Reversal", 2.5, 1.5, |b| {
            let (_, h1, l1, _) = ohlc(b, 1);
            b.high() > h1 && b.low() < l1 && b.close() > h1
        }),
        def("double_bottom", "Double Bottom", 2.5, 1.5, |b| {
            let prior_low = b.lowest_between(&b.ind.low, 20, 5);
            (b.low() - prior_low).abs() <= 0.5 * b.atr()
                && b.is_bullish()
                && b.close() > b.at(&b.ind.close, 1)
        }),
        def("breakout_retest", "Breakout Retest", 2.5, 1.5, |b| {
            let level = b.highest_between(&b.ind.high, 20, 5);
            b.close() > level && b.low() <= level + 0.25 * b.atr() && b.is_bullish()
        }),
    ]
}
