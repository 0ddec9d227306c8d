//! Strategy registry
//!
//! A strategy is a pure rule over an [`IndicatorBundle`] that may emit an
//! entry at a given bar index. Built-in rules are function tables
//! ([`StrategyDef`]) grouped by category; custom strategies implement
//! [`Strategy`] directly. Everything is registered by stable id.

mod composite;
mod mean_reversion;
mod momentum;
mod price_action;
mod regime;
mod trend;
mod volatility;
mod volume;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::EngineError;
use crate::indicators::IndicatorBundle;
use crate::types::Direction;

// ============================================================================
// Categories
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Trend,
    MeanReversion,
    Momentum,
    Volume,
    Volatility,
    PriceAction,
    Regime,
    Composite,
}

impl Category {
    pub fn all() -> &'static [Category] {
        &[
            Self::Trend,
            Self::MeanReversion,
            Self::Momentum,
            Self::Volume,
            Self::Volatility,
            Self::PriceAction,
            Self::Regime,
            Self::Composite,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trend => "trend",
            Self::MeanReversion => "mean_reversion",
            Self::Momentum => "momentum",
            Self::Volume => "volume",
            Self::Volatility => "volatility",
            Self::PriceAction => "price_action",
            Self::Regime => "regime",
            Self::Composite => "composite",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Strategy contract
// ============================================================================

/// A signal rule with ATR-scaled risk parameters.
///
/// `evaluate` must only read bundle values at indices `<= index`.
pub trait Strategy: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn category(&self) -> Category;
    fn tp_atr_mult(&self) -> f64;
    fn sl_atr_mult(&self) -> f64;
    fn evaluate(&self, index: usize, indicators: &IndicatorBundle) -> Option<Direction>;
}

/// Read-only view of the bundle at one bar, with back-indexing helpers that
/// saturate at the first bar.
#[derive(Clone, Copy)]
pub struct Bar<'a> {
    pub ind: &'a IndicatorBundle,
    pub i: usize,
}

impl<'a> Bar<'a> {
    /// Value `back` bars before the current one
    pub fn at(&self, series: &[f64], back: usize) -> f64 {
        series[self.i.saturating_sub(back)]
    }

    pub fn now(&self, series: &[f64]) -> f64 {
        series[self.i]
    }

    pub fn open(&self) -> f64 {
        self.ind.open[self.i]
    }

    pub fn high(&self) -> f64 {
        self.ind.high[self.i]
    }

    pub fn low(&self) -> f64 {
        self.ind.low[self.i]
    }

    pub fn close(&self) -> f64 {
        self.ind.close[self.i]
    }

    pub fn volume(&self) -> f64 {
        self.ind.volume[self.i]
    }

    pub fn atr(&self) -> f64 {
        self.ind.atr14[self.i]
    }

    pub fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    pub fn range(&self) -> f64 {
        self.high() - self.low()
    }

    /// Bar range `back` bars ago
    pub fn range_at(&self, back: usize) -> f64 {
        self.at(&self.ind.high, back) - self.at(&self.ind.low, back)
    }

    pub fn upper_wick(&self) -> f64 {
        self.high() - self.close().max(self.open())
    }

    pub fn lower_wick(&self) -> f64 {
        self.close().min(self.open()) - self.low()
    }

    pub fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    /// Position of the close within the bar range, 0 at the low, 1 at the high
    pub fn close_location(&self) -> f64 {
        let range = self.range();
        if range > 0.0 {
            (self.close() - self.low()) / range
        } else {
            0.5
        }
    }

    /// `a` crossed above `b` on this bar
    pub fn cross_above(&self, a: &[f64], b: &[f64]) -> bool {
        self.i > 0 && a[self.i - 1] <= b[self.i - 1] && a[self.i] > b[self.i]
    }

    pub fn cross_above_level(&self, series: &[f64], level: f64) -> bool {
        self.i > 0 && series[self.i - 1] <= level && series[self.i] > level
    }

    /// Highest value over the `len` bars before the current one
    pub fn highest_prior(&self, series: &[f64], len: usize) -> f64 {
        self.highest_between(series, len, 1)
    }

    /// Lowest value over the `len` bars before the current one
    pub fn lowest_prior(&self, series: &[f64], len: usize) -> f64 {
        self.lowest_between(series, len, 1)
    }

    /// Highest value from `from` bars back through `to` bars back
    pub fn highest_between(&self, series: &[f64], from: usize, to: usize) -> f64 {
        self.window(series, from, to)
            .iter()
            .fold(f64::MIN, |acc, &v| acc.max(v))
    }

    /// Lowest value from `from` bars back through `to` bars back
    pub fn lowest_between(&self, series: &[f64], from: usize, to: usize) -> f64 {
        self.window(series, from, to)
            .iter()
            .fold(f64::MAX, |acc, &v| acc.min(v))
    }

    fn window<'s>(&self, series: &'s [f64], from: usize, to: usize) -> &'s [f64] {
        let start = self.i.saturating_sub(from);
        let end = self.i.saturating_sub(to);
        if start > end || (start == end && to > 0 && self.i < to) {
            // Not enough history: fall back to the current bar
            &series[self.i..=self.i]
        } else {
            &series[start..=end]
        }
    }
}

// ============================================================================
// Function-table strategies
// ============================================================================

/// Long-entry rule registered under a stable id
#[derive(Clone, Copy)]
pub struct StrategyDef {
    pub id: &'static str,
    pub name: &'static str,
    pub category: Category,
    pub tp_atr_mult: f64,
    pub sl_atr_mult: f64,
    pub rule: fn(&Bar) -> bool,
}

impl StrategyDef {
    pub fn new(
        id: &'static str,
        name: &'static str,
        category: Category,
        tp_atr_mult: f64,
        sl_atr_mult: f64,
        rule: fn(&Bar) -> bool,
    ) -> Self {
        Self {
            id,
            name,
            category,
            tp_atr_mult,
            sl_atr_mult,
            rule,
        }
    }
}

impl fmt::Debug for StrategyDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyDef")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("tp_atr_mult", &self.tp_atr_mult)
            .field("sl_atr_mult", &self.sl_atr_mult)
            .finish()
    }
}

impl Strategy for StrategyDef {
    fn id(&self) -> &str {
        self.id
    }

    fn name(&self) -> &str {
        self.name
    }

    fn category(&self) -> Category {
        self.category
    }

    fn tp_atr_mult(&self) -> f64 {
        self.tp_atr_mult
    }

    fn sl_atr_mult(&self) -> f64 {
        self.sl_atr_mult
    }

    fn evaluate(&self, index: usize, indicators: &IndicatorBundle) -> Option<Direction> {
        if index >= indicators.len() {
            return None;
        }
        let bar = Bar {
            ind: indicators,
            i: index,
        };
        (self.rule)(&bar).then_some(Direction::Long)
    }
}

/// Every built-in rule, in catalog order
pub fn builtin_catalog() -> Vec<StrategyDef> {
    let mut defs = trend::catalog();
    defs.extend(mean_reversion::catalog());
    defs.extend(momentum::catalog());
    defs.extend(volume::catalog());
    defs.extend(volatility::catalog());
    defs.extend(price_action::catalog());
    defs.extend(regime::catalog());
    defs.extend(composite::catalog());
    defs
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the full built-in catalog
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for def in builtin_catalog() {
            if let Err(e) = registry.register(Arc::new(def)) {
                warn!(error = %e, "Skipping built-in strategy");
            }
        }
        registry
    }

    /// Add a strategy; ids must be unique
    pub fn register(&mut self, strategy: Arc<dyn Strategy>) -> Result<(), EngineError> {
        let id = strategy.id().to_string();
        if self.strategies.contains_key(&id) {
            return Err(EngineError::DuplicateStrategy(id));
        }
        self.strategies.insert(id, strategy);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Strategy>> {
        self.strategies.get(id)
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Strategies in id order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Strategy>> {
        self.strategies.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }

    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &Arc<dyn Strategy>> {
        self.iter().filter(move |s| s.category() == category)
    }

    /// Sub-registry restricted to the given ids; unknown ids are ignored
    pub fn subset<'s>(&self, ids: impl IntoIterator<Item = &'s str>) -> Self {
        let strategies = ids
            .into_iter()
            .filter_map(|id| self.strategies.get(id).map(|s| (id.to_string(), s.clone())))
            .collect();
        Self { strategies }
    }
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.strategies.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Candle;
    use std::collections::HashSet;

    fn make_candles(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let open = if i == 0 { c } else { closes[i - 1] };
                Candle::new(
                    i as i64 * 60_000,
                    open,
                    c.max(open) + 0.5,
                    c.min(open) - 0.5,
                    c,
                    100.0 + (i % 7) as f64 * 40.0,
                )
            })
            .collect()
    }

    fn wavy_bundle(n: usize) -> IndicatorBundle {
        let closes: Vec<f64> = (0..n)
            .map(|i| 100.0 + (i as f64 * 0.3).sin() * 8.0 + (i as f64 * 0.05).cos() * 4.0)
            .collect();
        IndicatorBundle::new(&make_candles(&closes))
    }

    struct AlwaysShort;

    impl Strategy for AlwaysShort {
        fn id(&self) -> &str {
            "always_short"
        }
        fn name(&self) -> &str {
            "Always Short"
        }
        fn category(&self) -> Category {
            Category::Composite
        }
        fn tp_atr_mult(&self) -> f64 {
            1.0
        }
        fn sl_atr_mult(&self) -> f64 {
            1.0
        }
        fn evaluate(&self, _index: usize, _indicators: &IndicatorBundle) -> Option<Direction> {
            Some(Direction::Short)
        }
    }

    #[test]
    fn test_builtin_catalog_size_and_unique_ids() {
        let catalog = builtin_catalog();
        assert_eq!(catalog.len(), 100);
        let ids: HashSet<&str> = catalog.iter().map(|d| d.id).collect();
        assert_eq!(ids.len(), 100);
        assert_eq!(StrategyRegistry::builtin().len(), 100);
    }

    #[test]
    fn test_every_category_populated() {
        let registry = StrategyRegistry::builtin();
        for category in Category::all() {
            assert!(
                registry.by_category(*category).count() >= 10,
                "{category} underpopulated"
            );
        }
    }

    #[test]
    fn test_risk_multiples_positive() {
        for def in builtin_catalog() {
            assert!(def.tp_atr_mult > 0.0, "{}", def.id);
            assert!(def.sl_atr_mult > 0.0, "{}", def.id);
        }
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut registry = StrategyRegistry::new();
        registry.register(Arc::new(AlwaysShort)).unwrap();
        let err = registry.register(Arc::new(AlwaysShort)).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateStrategy(id) if id == "always_short"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_iteration_in_id_order() {
        let registry = StrategyRegistry::builtin();
        let ids: Vec<&str> = registry.ids().collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_lookup_and_subset() {
        let registry = StrategyRegistry::builtin();
        let ema = registry.get("ema_cross_9_21").unwrap();
        assert_eq!(ema.category(), Category::Trend);
        assert!(registry.get("nope").is_none());

        let subset = registry.subset(["ema_cross_9_21", "rsi_oversold_bounce", "missing"]);
        assert_eq!(subset.len(), 2);
    }

    #[test]
    fn test_builtin_rules_are_long_only_and_total() {
        let bundle = wavy_bundle(160);
        let registry = StrategyRegistry::builtin();
        let mut fired = 0;
        for strategy in registry.iter() {
            for i in 0..bundle.len() {
                match strategy.evaluate(i, &bundle) {
                    Some(Direction::Long) => fired += 1,
                    Some(Direction::Short) => panic!("{} went short", strategy.id()),
                    None => {}
                }
            }
        }
        assert!(fired > 0);
    }

    #[test]
    fn test_out_of_range_index_is_none() {
        let bundle = wavy_bundle(60);
        for strategy in StrategyRegistry::builtin().iter() {
            assert_eq!(strategy.evaluate(60, &bundle), None);
            assert_eq!(strategy.evaluate(usize::MAX, &bundle), None);
        }
    }

    #[test]
    fn test_custom_strategy_may_short() {
        let mut registry = StrategyRegistry::new();
        registry.register(Arc::new(AlwaysShort)).unwrap();
        let bundle = wavy_bundle(10);
        let s = registry.get("always_short").unwrap();
        assert_eq!(s.evaluate(3, &bundle), Some(Direction::Short));
    }

    #[test]
    fn test_bar_helpers_saturate() {
        let bundle = wavy_bundle(30);
        let bar = Bar { ind: &bundle, i: 0 };
        assert_eq!(bar.at(&bundle.close, 5), bundle.close[0]);
        assert!(!bar.cross_above(&bundle.ema9, &bundle.ema21));
        assert_eq!(bar.highest_prior(&bundle.high, 20), bundle.high[0]);

        let bar = Bar { ind: &bundle, i: 10 };
        let expected = bundle.high[5..=9].iter().cloned().fold(f64::MIN, f64::max);
        assert_eq!(bar.highest_prior(&bundle.high, 5), expected);
        let expected = bundle.low[2..=7].iter().cloned().fold(f64::MAX, f64::min);
        assert_eq!(bar.lowest_between(&bundle.low, 8, 3), expected);
    }

    #[test]
    fn test_ema_cross_fires_on_cross_bar_only() {
        let mut closes = vec![100.0; 60];
        closes.extend((1..=20).map(|k| 100.0 + k as f64));
        let bundle = IndicatorBundle::new(&make_candles(&closes));
        let strategy = StrategyRegistry::builtin();
        let strategy = strategy.get("ema_cross_9_21").unwrap();

        let fires: Vec<usize> = (0..bundle.len())
            .filter(|&i| strategy.evaluate(i, &bundle).is_some())
            .collect();
        assert_eq!(fires, vec![60]);
    }
}
