//! Blend weights and their resolution
//!
//! `ModelWeights` always sums to 1. A provider resolves weights once per
//! ensemble construction: per-symbol store entry with enough samples, then the
//! global per-horizon entry, then equal weights. Store failures never
//! propagate, they fall back to equal weights.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::config::WeightsConfig;
use crate::error::{EnsembleError, Result};
use crate::models::ModelKind;

const SUM_TOLERANCE: f64 = 1e-9;

/// Normalized per-model blend weights
///
/// Deserialization goes through `ModelWeights::new`, so stored or configured
/// weights are normalized on the way in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawModelWeights")]
pub struct ModelWeights {
    weights: BTreeMap<String, f64>,
    /// Models removed by redistribution
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    disabled: BTreeSet<String>,
}

impl ModelWeights {
    /// Normalize `weights` to sum to 1
    pub fn new(weights: BTreeMap<String, f64>) -> Result<Self> {
        if weights.is_empty() {
            return Err(EnsembleError::InvalidWeights("no models given".to_string()));
        }
        if let Some((name, w)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(EnsembleError::InvalidWeights(format!("{} has weight {}", name, w)));
        }
        let sum: f64 = weights.values().sum();
        if sum <= 0.0 {
            return Err(EnsembleError::InvalidWeights("weights sum to zero".to_string()));
        }
        Ok(Self {
            weights: weights.into_iter().map(|(k, w)| (k, w / sum)).collect(),
            disabled: BTreeSet::new(),
        })
    }

    /// Equal weights across `names`; errors on an empty list
    pub fn equal<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(EnsembleError::InvalidWeights("no models given".to_string()));
        }
        let share = 1.0 / names.len() as f64;
        Ok(Self {
            weights: names.into_iter().map(|n| (n, share)).collect(),
            disabled: BTreeSet::new(),
        })
    }

    /// Equal weights over both sub-models
    pub fn default_pair() -> Self {
        let share = 1.0 / ModelKind::ALL.len() as f64;
        Self {
            weights: ModelKind::ALL.iter().map(|k| (k.name().to_string(), share)).collect(),
            disabled: BTreeSet::new(),
        }
    }

    /// Weight for `name`, 0 when unknown
    pub fn get(&self, name: &str) -> f64 {
        self.weights.get(name).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.weights.contains_key(name)
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.contains(name)
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(k, w)| (k.as_str(), *w))
    }

    /// Models still eligible for a share of the blend
    pub fn active(&self) -> impl Iterator<Item = &str> {
        self.names().filter(|n| !self.disabled.contains(*n))
    }

    /// Zero out `failed` and split its share equally among the remaining models
    ///
    /// Errors when `failed` is the last active model. Redistributing a model
    /// that is already disabled is a no-op.
    pub fn redistribute(&mut self, failed: &str) -> Result<()> {
        let Some(share) = self.weights.get(failed).copied() else {
            return Err(EnsembleError::InvalidWeights(format!("unknown model {}", failed)));
        };
        if self.disabled.contains(failed) {
            return Ok(());
        }

        let remaining: Vec<String> = self
            .active()
            .filter(|n| *n != failed)
            .map(str::to_string)
            .collect();
        if remaining.is_empty() {
            return Err(EnsembleError::InvalidWeights(format!(
                "cannot remove {}: no other model remains",
                failed
            )));
        }

        self.weights.insert(failed.to_string(), 0.0);
        self.disabled.insert(failed.to_string());

        let bonus = share / remaining.len() as f64;
        for name in &remaining {
            if let Some(w) = self.weights.get_mut(name) {
                *w += bonus;
            }
        }

        let sum = self.sum();
        if sum > 0.0 {
            for w in self.weights.values_mut() {
                *w /= sum;
            }
        } else {
            let even = 1.0 / remaining.len() as f64;
            for name in &remaining {
                self.weights.insert(name.clone(), even);
            }
        }

        tracing::info!(
            "Redistributed weight of {} ({:.3}) across {} model(s)",
            failed,
            share,
            remaining.len()
        );
        debug_assert!((self.sum() - 1.0).abs() < SUM_TOLERANCE);
        Ok(())
    }
}

impl Default for ModelWeights {
    fn default() -> Self {
        Self::default_pair()
    }
}

/// Wire form of `ModelWeights` before validation
#[derive(Deserialize)]
struct RawModelWeights {
    weights: BTreeMap<String, f64>,
    #[serde(default)]
    disabled: BTreeSet<String>,
}

impl TryFrom<RawModelWeights> for ModelWeights {
    type Error = EnsembleError;

    fn try_from(raw: RawModelWeights) -> Result<Self> {
        let RawModelWeights { mut weights, disabled } = raw;
        for name in &disabled {
            match weights.get_mut(name) {
                Some(w) => *w = 0.0,
                None => {
                    return Err(EnsembleError::InvalidWeights(format!(
                        "disabled model {} has no weight entry",
                        name
                    )))
                }
            }
        }
        let mut normalized = Self::new(weights)?;
        normalized.disabled = disabled;
        Ok(normalized)
    }
}

/// Supplies blend weights for a horizon and optional symbol
pub trait WeightProvider: Send + Sync {
    /// Never fails; falls back to a safe default
    fn get_weights(&self, horizon: &str, symbol: Option<&str>) -> ModelWeights;
}

/// Equal weights for a fixed model list
///
/// An empty list resolves to the default rf/gb pair.
#[derive(Debug, Clone)]
pub struct EqualWeightProvider {
    models: Vec<String>,
}

impl EqualWeightProvider {
    pub fn new<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            models: models.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for EqualWeightProvider {
    fn default() -> Self {
        Self::new(ModelKind::ALL.iter().map(|k| k.name()))
    }
}

impl WeightProvider for EqualWeightProvider {
    fn get_weights(&self, _horizon: &str, _symbol: Option<&str>) -> ModelWeights {
        ModelWeights::equal(self.models.iter().cloned()).unwrap_or_else(|_| ModelWeights::default_pair())
    }
}

/// Always returns the same weights
#[derive(Debug, Clone)]
pub struct FixedWeightProvider(pub ModelWeights);

impl WeightProvider for FixedWeightProvider {
    fn get_weights(&self, _horizon: &str, _symbol: Option<&str>) -> ModelWeights {
        self.0.clone()
    }
}

/// Weights recorded for a symbol, with the sample count behind them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredWeights {
    pub weights: ModelWeights,
    pub samples: usize,
}

/// Read-only source of historically fitted weights
#[cfg_attr(test, mockall::automock)]
pub trait WeightStore: Send + Sync {
    fn symbol_weights(&self, horizon: &str, symbol: &str) -> Result<Option<StoredWeights>>;

    fn global_weights(&self, horizon: &str) -> Result<Option<ModelWeights>>;
}

/// Process-local weight store
#[derive(Default)]
pub struct InMemoryWeightStore {
    symbols: RwLock<HashMap<(String, String), StoredWeights>>,
    global: RwLock<HashMap<String, ModelWeights>>,
}

impl InMemoryWeightStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_symbol_weights(&self, horizon: &str, symbol: &str, weights: ModelWeights, samples: usize) {
        self.symbols
            .write()
            .insert((horizon.to_string(), symbol.to_string()), StoredWeights { weights, samples });
    }

    pub fn set_global_weights(&self, horizon: &str, weights: ModelWeights) {
        self.global.write().insert(horizon.to_string(), weights);
    }
}

impl WeightStore for InMemoryWeightStore {
    fn symbol_weights(&self, horizon: &str, symbol: &str) -> Result<Option<StoredWeights>> {
        Ok(self
            .symbols
            .read()
            .get(&(horizon.to_string(), symbol.to_string()))
            .cloned())
    }

    fn global_weights(&self, horizon: &str) -> Result<Option<ModelWeights>> {
        Ok(self.global.read().get(horizon).cloned())
    }
}

/// Symbol, then global, then equal weights
pub struct StoreWeightProvider<S: WeightStore> {
    store: S,
    min_symbol_samples: usize,
    fallback: EqualWeightProvider,
}

impl<S: WeightStore> StoreWeightProvider<S> {
    pub fn new(store: S, min_symbol_samples: usize) -> Self {
        Self {
            store,
            min_symbol_samples,
            fallback: EqualWeightProvider::default(),
        }
    }

    /// Sample threshold taken from `[weights]`
    pub fn from_config(store: S, config: &WeightsConfig) -> Self {
        Self::new(store, config.min_symbol_samples)
    }

    pub fn with_fallback(mut self, fallback: EqualWeightProvider) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn equal(&self, horizon: &str, symbol: Option<&str>) -> ModelWeights {
        self.fallback.get_weights(horizon, symbol)
    }
}

impl<S: WeightStore> WeightProvider for StoreWeightProvider<S> {
    fn get_weights(&self, horizon: &str, symbol: Option<&str>) -> ModelWeights {
        if let Some(symbol) = symbol {
            match self.store.symbol_weights(horizon, symbol) {
                Ok(Some(stored)) if stored.samples >= self.min_symbol_samples => {
                    tracing::debug!("Using {} weights for {} ({} samples)", horizon, symbol, stored.samples);
                    return stored.weights;
                }
                Ok(Some(stored)) => {
                    tracing::debug!(
                        "Ignoring {} weights for {}: {} samples < {}",
                        horizon,
                        symbol,
                        stored.samples,
                        self.min_symbol_samples
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Weight store unavailable, using equal weights: {}", e);
                    return self.equal(horizon, Some(symbol));
                }
            }
        }

        match self.store.global_weights(horizon) {
            Ok(Some(weights)) => weights,
            Ok(None) => self.equal(horizon, symbol),
            Err(e) => {
                tracing::warn!("Weight store unavailable, using equal weights: {}", e);
                self.equal(horizon, symbol)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    fn weights(pairs: &[(&str, f64)]) -> ModelWeights {
        ModelWeights::new(pairs.iter().map(|(k, w)| (k.to_string(), *w)).collect()).unwrap()
    }

    #[test]
    fn test_new_normalizes() {
        let w = weights(&[("rf", 3.0), ("gb", 1.0)]);
        assert!((w.get("rf") - 0.75).abs() < 1e-12);
        assert!((w.get("gb") - 0.25).abs() < 1e-12);
        assert!((w.sum() - 1.0).abs() < 1e-9);
        assert_eq!(w.get("lstm"), 0.0);
    }

    #[test]
    fn test_new_rejects_bad_input() {
        assert!(ModelWeights::new(BTreeMap::new()).is_err());
        assert!(ModelWeights::new([("rf".to_string(), -0.1)].into_iter().collect()).is_err());
        assert!(ModelWeights::new([("rf".to_string(), 0.0)].into_iter().collect()).is_err());
        assert!(ModelWeights::new([("rf".to_string(), f64::NAN)].into_iter().collect()).is_err());
    }

    #[test]
    fn test_redistribute_pair_gives_exact_split() {
        let mut w = ModelWeights::default_pair();
        w.redistribute("gb").unwrap();
        assert_eq!(w.get("gb"), 0.0);
        assert_eq!(w.get("rf"), 1.0);
        assert!(w.is_disabled("gb"));
        assert_eq!(w.active().collect::<Vec<_>>(), vec!["rf"]);
    }

    #[test]
    fn test_redistribute_splits_equally_then_normalizes() {
        let mut w = weights(&[("a", 0.5), ("b", 0.3), ("c", 0.2)]);
        w.redistribute("a").unwrap();
        assert!((w.get("b") - 0.55).abs() < 1e-12);
        assert!((w.get("c") - 0.45).abs() < 1e-12);
        assert!((w.sum() - 1.0).abs() < 1e-9);

        // Idempotent for an already disabled model
        w.redistribute("a").unwrap();
        assert!((w.get("b") - 0.55).abs() < 1e-12);
    }

    #[test]
    fn test_redistribute_last_model_fails() {
        let mut w = ModelWeights::default_pair();
        w.redistribute("rf").unwrap();
        assert!(w.redistribute("gb").is_err());
        assert!(w.redistribute("xgb").is_err());
        assert!((w.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_symbol_weights_preferred_with_enough_samples() {
        let mut store = MockWeightStore::new();
        store
            .expect_symbol_weights()
            .with(eq("1d"), eq("AAPL"))
            .returning(|_, _| {
                Ok(Some(StoredWeights {
                    weights: ModelWeights::new([("rf".to_string(), 0.8), ("gb".to_string(), 0.2)].into_iter().collect())?,
                    samples: 40,
                }))
            });
        store.expect_global_weights().never();

        let provider = StoreWeightProvider::new(store, 30);
        let w = provider.get_weights("1d", Some("AAPL"));
        assert!((w.get("rf") - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_sparse_symbol_falls_back_to_global() {
        let mut store = MockWeightStore::new();
        store.expect_symbol_weights().returning(|_, _| {
            Ok(Some(StoredWeights {
                weights: ModelWeights::default_pair(),
                samples: 5,
            }))
        });
        store
            .expect_global_weights()
            .with(eq("1d"))
            .times(1)
            .returning(|_| Ok(Some(ModelWeights::new([("rf".to_string(), 0.6), ("gb".to_string(), 0.4)].into_iter().collect())?)));

        let provider = StoreWeightProvider::new(store, 30);
        let w = provider.get_weights("1d", Some("MSFT"));
        assert!((w.get("gb") - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_missing_everything_gives_equal() {
        let mut store = MockWeightStore::new();
        store.expect_symbol_weights().never();
        store.expect_global_weights().returning(|_| Ok(None));

        let provider = StoreWeightProvider::new(store, 30);
        let w = provider.get_weights("5d", None);
        assert_eq!(w, ModelWeights::default_pair());
    }

    #[test]
    fn test_store_error_gives_equal_without_raising() {
        let mut store = MockWeightStore::new();
        store
            .expect_symbol_weights()
            .returning(|_, _| Err(EnsembleError::WeightStore("connection refused".to_string())));
        store.expect_global_weights().never();

        let provider = StoreWeightProvider::new(store, 30);
        let w = provider.get_weights("1d", Some("AAPL"));
        assert_eq!(w.get("rf"), 0.5);
        assert_eq!(w.get("gb"), 0.5);

        let mut store = MockWeightStore::new();
        store
            .expect_global_weights()
            .returning(|_| Err(EnsembleError::WeightStore("timeout".to_string())));
        let provider = StoreWeightProvider::new(store, 30);
        assert_eq!(provider.get_weights("1d", None), ModelWeights::default_pair());
    }

    #[test]
    fn test_in_memory_store_round_trip() {
        let store = InMemoryWeightStore::new();
        store.set_global_weights("1d", weights(&[("rf", 0.7), ("gb", 0.3)]));
        store.set_symbol_weights("1d", "SPY", weights(&[("rf", 0.1), ("gb", 0.9)]), 100);

        let provider = StoreWeightProvider::new(store, 30);
        assert!((provider.get_weights("1d", Some("SPY")).get("gb") - 0.9).abs() < 1e-12);
        assert!((provider.get_weights("1d", Some("QQQ")).get("rf") - 0.7).abs() < 1e-12);
        assert_eq!(provider.get_weights("1h", Some("SPY")), ModelWeights::default_pair());
    }

    #[test]
    fn test_weights_serialize_as_map() {
        let json = serde_json::to_value(ModelWeights::default_pair()).unwrap();
        assert_eq!(json["weights"]["rf"], 0.5);
        assert!(json.get("disabled").is_none());
    }

    #[test]
    fn test_deserialized_weights_are_normalized() {
        let w: ModelWeights = serde_json::from_str(r#"{"weights":{"rf":3.0,"gb":3.0}}"#).unwrap();
        assert!((w.sum() - 1.0).abs() < 1e-9);
        assert_eq!(w.get("rf"), 0.5);

        let fixed = FixedWeightProvider(w);
        assert!((fixed.get_weights("1d", None).sum() - 1.0).abs() < 1e-9);

        assert!(serde_json::from_str::<ModelWeights>(r#"{"weights":{}}"#).is_err());
        assert!(serde_json::from_str::<ModelWeights>(r#"{"weights":{"rf":-1.0,"gb":2.0}}"#).is_err());
        assert!(serde_json::from_str::<ModelWeights>(r#"{"weights":{"rf":0.0,"gb":0.0}}"#).is_err());
    }

    #[test]
    fn test_disabled_models_survive_serialization() {
        let mut w = weights(&[("rf", 0.4), ("gb", 0.6)]);
        w.redistribute("gb").unwrap();
        let back: ModelWeights = serde_json::from_str(&serde_json::to_string(&w).unwrap()).unwrap();
        assert_eq!(back, w);
        assert!(back.is_disabled("gb"));

        // A disabled entry keeps no share even if the stored value says otherwise
        let w: ModelWeights =
            serde_json::from_str(r#"{"weights":{"rf":0.5,"gb":0.5},"disabled":["gb"]}"#).unwrap();
        assert_eq!(w.get("gb"), 0.0);
        assert_eq!(w.get("rf"), 1.0);
        assert!(serde_json::from_str::<ModelWeights>(r#"{"weights":{"rf":1.0},"disabled":["gb"]}"#).is_err());
    }

    #[test]
    fn test_equal_rejects_empty_list() {
        assert!(ModelWeights::equal(Vec::<String>::new()).is_err());
        let w = ModelWeights::equal(["rf", "gb", "lstm"]).unwrap();
        assert!((w.sum() - 1.0).abs() < 1e-9);

        let provider = EqualWeightProvider::new(Vec::<String>::new());
        assert_eq!(provider.get_weights("1d", None), ModelWeights::default_pair());
    }

    #[test]
    fn test_provider_threshold_from_config() {
        let store = InMemoryWeightStore::new();
        store.set_symbol_weights("1d", "SPY", weights(&[("rf", 0.2), ("gb", 0.8)]), 40);
        let config = WeightsConfig {
            min_symbol_samples: 50,
            ..WeightsConfig::default()
        };

        let provider = StoreWeightProvider::from_config(store, &config);
        assert_eq!(provider.get_weights("1d", Some("SPY")), ModelWeights::default_pair());
    }

    #[test]
    fn test_simple_providers() {
        let equal = EqualWeightProvider::new(["rf", "gb", "lstm"]);
        let w = equal.get_weights("1d", Some("AAPL"));
        assert!((w.get("lstm") - 1.0 / 3.0).abs() < 1e-12);

        let fixed = FixedWeightProvider(weights(&[("rf", 0.9), ("gb", 0.1)]));
        assert_eq!(fixed.get_weights("5d", None), fixed.0);
    }
}
