//! Regime-adaptive rules: the entry condition depends on trend strength or
//! volatility state

use super::{Bar, Category, StrategyDef};

fn def(
    id: &'static str,
    name: &'static str,
    tp: f64,
    sl: f64,
    rule: fn(&Bar) -> bool,
) -> StrategyDef {
    StrategyDef::new(id, name, Category::Regime, tp, sl, rule)
}

fn trending(b: &Bar) -> bool {
    b.now(&b.ind.adx.adx) > 25.0
}

fn ranging(b: &Bar) -> bool {
    b.now(&b.ind.adx.adx) < 20.0
}

pub(super) fn catalog() -> Vec<StrategyDef> {
    vec![
        def("trend_regime_pullback", "Trend Regime Pullback", 2.5, 1.5, |b| {
            let ema = b.now(&b.ind.ema21);
            trending(b)
                && b.now(&b.ind.adx.plus_di) > b.now(&b.ind.adx.minus_di)
                && b.low() <= ema
                && b.close() > ema
        }),
        def("range_regime_rsi", "Range Regime RSI", 2.0, 1.5, |b| {
            ranging(b) && b.cross_above_level(&b.ind.rsi14, 35.0)
        }),
        def("range_regime_band_fade", "Range Regime Band Fade", 1.5, 1.0, |b| {
            ranging(b) && b.close() < b.now(&b.ind.bb.lower) && b.is_bullish()
        }),
        def("high_vol_supertrend", "High Volatility Supertrend", 3.0, 2.0, |b| {
            let dir = &b.ind.supertrend.direction;
            b.atr() > b.at(&b.ind.atr14, 20) && b.now(dir) > 0.0 && b.at(dir, 1) < 0.0
        }),
        def("bull_regime_breakout", "Bull Regime Breakout", 3.0, 1.5, |b| {
            let sma = &b.ind.sma50;
            b.close() > b.now(sma)
                && b.now(sma) > b.at(sma, 10)
                && b.close() > b.highest_prior(&b.ind.high, 10)
        }),
        def("range_regime_stoch", "Range Regime Stochastic", 1.5, 1.0, |b| {
            ranging(b) && b.cross_above(&b.ind.stoch.k, &b.ind.stoch.d) && b.now(&b.ind.stoch.k) < 30.0
        }),
        def("bull_regime_rsi_dip", "Bull Regime RSI Dip", 2.5, 1.5, |b| {
            let sma = b.now(&b.ind.sma50);
            b.close() > sma && b.now(&b.ind.ema21) > sma && b.cross_above_level(&b.ind.rsi7, 30.0)
        }),
        def("efficient_trend_entry", "Efficient Trend Entry", 2.5, 1.5, |b| {
            b.now(&b.ind.kama) > b.at(&b.ind.kama, 5)
                && b.cross_above(&b.ind.close, &b.ind.ema9)
                && b.now(&b.ind.adx.adx) > 20.0
        }),
        def("regime_shift_sma", "Regime Shift SMA 20/50", 3.5, 1.75, |b| {
            b.cross_above(&b.ind.sma20, &b.ind.sma50) && b.now(&b.ind.adx.adx) > 20.0
        }),
        def("volatility_regime_breakout", "Volatility Regime Breakout", 3.0, 1.5, |b| {
            let bw = &b.ind.bb.bandwidth;
            b.now(bw) > b.at(bw, 5) * 1.5 && b.close() > b.now(&b.ind.bb.upper)
        }),
        def("bear_regime_capitulation", "Bear Regime Capitulation", 2.0, 1.5, |b| {
            let avg_volume = b.now(&b.ind.volume_sma20);
            b.close() < b.now(&b.ind.sma50)
                && b.now(&b.ind.rsi14) < 25.0
                && b.volume() > 2.0 * avg_volume
                && b.is_bullish()
        }),
        def("adaptive_cci", "Adaptive CCI", 2.5, 1.5, |b| {
            let level = if trending(b) { 100.0 } else { -100.0 };
            b.cross_above_level(&b.ind.cci20, level)
        }),
    ]
}
