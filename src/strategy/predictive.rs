use super::features::{FeatureSet, WARMUP_BARS};
use super::{Predictor, Strategy};
use crate::error::StrategyError;
use crate::models::{Candle, Signal, SymbolSignal};

/// Fewer training rows than this and the model is not consulted
pub const MIN_TRAINING_ROWS: usize = 20;
pub const BUY_THRESHOLD: f64 = 0.0005;
pub const SELL_THRESHOLD: f64 = -0.0005;

/// Turns a predicted next-bar return into a signal
#[derive(Debug, Clone)]
pub struct PredictiveStrategy<P> {
    predictor: P,
    buy_threshold: f64,
    sell_threshold: f64,
}

impl<P: Predictor> PredictiveStrategy<P> {
    pub fn new(predictor: P) -> Self {
        Self {
            predictor,
            buy_threshold: BUY_THRESHOLD,
            sell_threshold: SELL_THRESHOLD,
        }
    }

    pub fn with_thresholds(mut self, buy_threshold: f64, sell_threshold: f64) -> Self {
        self.buy_threshold = buy_threshold;
        self.sell_threshold = sell_threshold;
        self
    }

    fn classify(&self, predicted_return: f64) -> Signal {
        if predicted_return > self.buy_threshold {
            Signal::Buy
        } else if predicted_return < self.sell_threshold {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }
}

impl<P: Predictor> Strategy for PredictiveStrategy<P> {
    fn generate_signal(&self, candles: &[Candle]) -> Result<SymbolSignal, StrategyError> {
        let features = FeatureSet::from_candles(candles);
        let volatility = features.latest_volatility();

        if features.len() < MIN_TRAINING_ROWS {
            tracing::debug!(
                rows = features.len(),
                "Not enough feature rows for a prediction, holding"
            );
            return Ok(SymbolSignal::new(Signal::Hold, 0.0, volatility));
        }

        let predicted_return = self.predictor.predict(&features)?;
        let signal = self.classify(predicted_return);

        if let Some(last) = candles.last() {
            tracing::debug!(
                symbol = %last.symbol,
                predicted_return,
                %signal,
                "Prediction evaluated"
            );
        }

        Ok(SymbolSignal::new(signal, predicted_return, volatility))
    }

    fn name(&self) -> &str {
        "ml"
    }

    fn min_candles_required(&self) -> usize {
        // Indicator warmup, the training rows, and the unlabeled latest bar
        WARMUP_BARS + MIN_TRAINING_ROWS + 1
    }
}
