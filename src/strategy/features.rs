use crate::indicators::{
    bollinger_series, ema_series, momentum_series, returns, rolling_std, rsi_series, sma_series,
    stochastic_k_series,
};
use crate::models::Candle;

pub const N_FEATURES: usize = 13;
pub const FEATURE_NAMES: [&str; N_FEATURES] = [
    "close",
    "return",
    "ma5",
    "ma10",
    "volatility",
    "rsi14",
    "macd",
    "bb_middle",
    "bb_upper",
    "bb_lower",
    "stoch_k14",
    "ema20",
    "momentum10",
];

const SHORT_MA: usize = 5;
const LONG_MA: usize = 10;
const VOLATILITY_WINDOW: usize = 5;
const RSI_PERIOD: usize = 14;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const BOLLINGER_PERIOD: usize = 20;
const BOLLINGER_STD: f64 = 2.0;
const STOCHASTIC_PERIOD: usize = 14;
const EMA_PERIOD: usize = 20;
const MOMENTUM_PERIOD: usize = 10;

/// Index of the first bar with every feature defined (slow MACD EMA)
pub const WARMUP_BARS: usize = MACD_SLOW - 1;

pub type FeatureRow = [f64; N_FEATURES];

/// Feature matrix built from one symbol's klines.
///
/// Training rows are bars with every feature defined and a known next-bar
/// return. `latest` is the newest bar, which has no target yet.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    pub rows: Vec<FeatureRow>,
    /// Next-bar return for each training row
    pub targets: Vec<f64>,
    pub latest: Option<FeatureRow>,
}

impl FeatureSet {
    pub fn from_candles(candles: &[Candle]) -> Self {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();

        let ret = returns(&closes);
        let ma5 = sma_series(&closes, SHORT_MA);
        let ma10 = sma_series(&closes, LONG_MA);
        let volatility = rolling_std(&ret, VOLATILITY_WINDOW);
        let rsi = rsi_series(&closes, RSI_PERIOD);
        let ema_fast = ema_series(&closes, MACD_FAST);
        let ema_slow = ema_series(&closes, MACD_SLOW);
        let bands = bollinger_series(&closes, BOLLINGER_PERIOD, BOLLINGER_STD);
        let stoch = stochastic_k_series(&highs, &lows, &closes, STOCHASTIC_PERIOD);
        let ema20 = ema_series(&closes, EMA_PERIOD);
        let momentum = momentum_series(&closes, MOMENTUM_PERIOD);

        let row_at = |i: usize| -> Option<FeatureRow> {
            let bb = bands[i]?;
            Some([
                closes[i],
                ret[i]?,
                ma5[i]?,
                ma10[i]?,
                volatility[i]?,
                rsi[i]?,
                ema_fast[i]? - ema_slow[i]?,
                bb.middle,
                bb.upper,
                bb.lower,
                stoch[i]?,
                ema20[i]?,
                momentum[i]?,
            ])
        };

        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for i in 0..closes.len().saturating_sub(1) {
            let (Some(row), Some(target)) = (row_at(i), ret[i + 1]) else {
                continue;
            };
            rows.push(row);
            targets.push(target);
        }

        let latest = closes.len().checked_sub(1).and_then(row_at);

        Self {
            rows,
            targets,
            latest,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Return volatility of the newest bar
    pub fn latest_volatility(&self) -> Option<f64> {
        self.latest.map(|row| row[4])
    }
}
