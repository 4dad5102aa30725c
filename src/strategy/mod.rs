// Trading strategy module
pub mod features;
pub mod predictive;
pub mod regression;
pub mod rsi_ma;

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ConfigError, StrategyError};
use crate::models::{Candle, Symbol, SymbolSignal};
use crate::venue::MarketData;

pub use features::FeatureSet;
pub use predictive::PredictiveStrategy;
pub use regression::LinearRegressionPredictor;
pub use rsi_ma::{RsiMaConfig, RsiMaStrategy};

/// Strategy names accepted by `build_signal_source`
pub const STRATEGY_NAMES: [&str; 2] = ["rsi_ma", "ml"];

/// Base trait for all trading strategies
pub trait Strategy: Send + Sync {
    /// Generate a trading signal from one symbol's klines, oldest first
    fn generate_signal(&self, candles: &[Candle]) -> Result<SymbolSignal, StrategyError>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required for this strategy
    fn min_candles_required(&self) -> usize;
}

/// Expected-return model used by the predictive strategy
pub trait Predictor: Send + Sync {
    fn predict(&self, features: &FeatureSet) -> Result<f64, StrategyError>;
}

/// One decision cycle's output
#[derive(Debug, Clone, Default)]
pub struct SignalBatch {
    pub signals: HashMap<Symbol, SymbolSignal>,
    /// Symbols without a signal this cycle, with the error message
    pub failures: Vec<(Symbol, String)>,
}

impl From<HashMap<Symbol, SymbolSignal>> for SignalBatch {
    fn from(signals: HashMap<Symbol, SymbolSignal>) -> Self {
        Self {
            signals,
            failures: Vec::new(),
        }
    }
}

/// Produces one signal per symbol for a decision cycle.
///
/// Symbols that fail are left out of the signal map and reported in `failures`.
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn generate_signals(&self, symbols: &[Symbol]) -> SignalBatch;

    fn name(&self) -> &str;
}

/// Runs a `Strategy` over klines fetched for every symbol
pub struct KlineSignalSource<S> {
    strategy: S,
    market: Arc<dyn MarketData>,
    interval: String,
    limit: usize,
}

impl<S: Strategy> KlineSignalSource<S> {
    pub fn new(strategy: S, market: Arc<dyn MarketData>, interval: impl Into<String>, limit: usize) -> Self {
        if limit < strategy.min_candles_required() {
            tracing::warn!(
                "{} needs {} klines but only {} are fetched",
                strategy.name(),
                strategy.min_candles_required(),
                limit
            );
        }
        Self {
            strategy,
            market,
            interval: interval.into(),
            limit,
        }
    }

    async fn evaluate(&self, symbol: &Symbol) -> Result<SymbolSignal, StrategyError> {
        let candles = self
            .market
            .get_klines(symbol, &self.interval, self.limit)
            .await?;
        self.strategy.generate_signal(&candles)
    }
}

#[async_trait]
impl<S: Strategy> SignalSource for KlineSignalSource<S> {
    async fn generate_signals(&self, symbols: &[Symbol]) -> SignalBatch {
        let evaluations = symbols
            .iter()
            .map(|symbol| async move { (symbol, self.evaluate(symbol).await) });

        let mut batch = SignalBatch::default();
        for (symbol, result) in join_all(evaluations).await {
            match result {
                Ok(signal) => {
                    batch.signals.insert(symbol.clone(), signal);
                }
                Err(e) => {
                    tracing::warn!(symbol = %symbol, "Signal generation failed: {}", e);
                    batch.failures.push((symbol.clone(), e.to_string()));
                }
            }
        }
        batch
    }

    fn name(&self) -> &str {
        self.strategy.name()
    }
}

/// Build the signal source configured by `name` (`rsi_ma` or `ml`)
pub fn build_signal_source(
    name: &str,
    market: Arc<dyn MarketData>,
    interval: &str,
    limit: usize,
) -> Result<Arc<dyn SignalSource>, ConfigError> {
    match name.to_lowercase().as_str() {
        "rsi_ma" => Ok(Arc::new(KlineSignalSource::new(
            RsiMaStrategy::default(),
            market,
            interval,
            limit,
        ))),
        "ml" => Ok(Arc::new(KlineSignalSource::new(
            PredictiveStrategy::new(LinearRegressionPredictor::default()),
            market,
            interval,
            limit,
        ))),
        other => Err(ConfigError::Invalid(format!(
            "Unknown strategy '{}', expected one of {:?}",
            other, STRATEGY_NAMES
        ))),
    }
}
