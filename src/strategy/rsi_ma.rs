use super::Strategy;
use crate::error::StrategyError;
use crate::indicators::{calculate_rsi, calculate_sma, return_volatility};
use crate::models::{Candle, Signal, SymbolSignal};

/// Thresholds for the trend-following RSI/MA rule
#[derive(Debug, Clone)]
pub struct RsiMaConfig {
    pub rsi_period: usize,
    pub short_ma_period: usize,
    pub long_ma_period: usize,
    /// Buy only while RSI is below this
    pub rsi_buy_ceiling: f64,
    /// Sell once RSI is above this
    pub rsi_overbought: f64,
    pub volatility_window: usize,
}

impl Default for RsiMaConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            short_ma_period: 5,
            long_ma_period: 10,
            rsi_buy_ceiling: 70.0,
            rsi_overbought: 80.0,
            volatility_window: 5,
        }
    }
}

/// Short MA above long MA with room left on RSI -> Buy; overbought -> Sell.
#[derive(Debug, Clone, Default)]
pub struct RsiMaStrategy {
    config: RsiMaConfig,
}

impl RsiMaStrategy {
    pub fn new(config: RsiMaConfig) -> Self {
        Self { config }
    }
}

impl Strategy for RsiMaStrategy {
    fn generate_signal(&self, candles: &[Candle]) -> Result<SymbolSignal, StrategyError> {
        if candles.len() < self.min_candles_required() {
            return Err(StrategyError::InsufficientData {
                required: self.min_candles_required(),
                available: candles.len(),
            });
        }

        let prices: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let short_ma = calculate_sma(&prices, self.config.short_ma_period);
        let long_ma = calculate_sma(&prices, self.config.long_ma_period);
        let rsi = calculate_rsi(&prices, self.config.rsi_period);
        let volatility = return_volatility(&prices, self.config.volatility_window);

        let signal = match (short_ma, long_ma, rsi) {
            (Some(short), Some(long), Some(rsi))
                if short > long && rsi < self.config.rsi_buy_ceiling =>
            {
                Signal::Buy
            }
            (_, _, Some(rsi)) if rsi > self.config.rsi_overbought => Signal::Sell,
            _ => Signal::Hold,
        };

        tracing::debug!(
            symbol = %candles[candles.len() - 1].symbol,
            ?short_ma,
            ?long_ma,
            ?rsi,
            %signal,
            "RSI/MA evaluated"
        );

        Ok(SymbolSignal::new(signal, 0.0, volatility))
    }

    fn name(&self) -> &str {
        "rsi_ma"
    }

    fn min_candles_required(&self) -> usize {
        (self.config.rsi_period + 1)
            .max(self.config.long_ma_period)
            .max(self.config.volatility_window + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Symbol;
    use chrono::Utc;

    fn candles(prices: &[f64]) -> Vec<Candle> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                symbol: Symbol::new("ETHUSDT"),
                timestamp: Utc::now() + chrono::Duration::minutes(5 * i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn test_uptrend_with_pullbacks_is_buy() {
        // +2 / -1 sawtooth: RSI14 = 66.7, MA5 114.4 over MA10 113
        let prices: Vec<f64> = (0..30)
            .map(|i| {
                let k = (i / 2) as f64;
                if i % 2 == 0 { 100.0 + k } else { 102.0 + k }
            })
            .collect();
        let result = RsiMaStrategy::default().generate_signal(&candles(&prices)).unwrap();

        assert_eq!(result.signal, Signal::Buy);
        assert!(result.volatility.unwrap() > 0.0);
        assert_eq!(result.predicted_return, 0.0);
    }

    #[test]
    fn test_straight_rally_is_sell() {
        // Only gains: RSI 100, MA5 > MA10 but RSI is past the buy ceiling
        let prices: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let result = RsiMaStrategy::default().generate_signal(&candles(&prices)).unwrap();
        assert_eq!(result.signal, Signal::Sell);
    }

    #[test]
    fn test_downtrend_is_hold() {
        let prices: Vec<f64> = (0..30)
            .map(|i| 200.0 - i as f64 + if i % 2 == 0 { 0.5 } else { 0.0 })
            .collect();
        let result = RsiMaStrategy::default().generate_signal(&candles(&prices)).unwrap();
        assert_eq!(result.signal, Signal::Hold);
    }

    #[test]
    fn test_insufficient_data() {
        let result = RsiMaStrategy::default().generate_signal(&candles(&[100.0; 10]));
        assert!(matches!(
            result,
            Err(StrategyError::InsufficientData {
                required: 15,
                available: 10
            })
        ));
    }
}
