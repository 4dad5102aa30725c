// Technical indicators module
// Rolling RSI, moving averages, bands and oscillators over kline data

pub mod bollinger;
pub mod momentum;
pub mod moving_average;
pub mod rsi;
pub mod stochastic;
pub mod volatility;

pub use bollinger::{bollinger_series, calculate_bollinger, BollingerBands};
pub use momentum::momentum_series;
pub use moving_average::{calculate_ema, calculate_sma, ema_series, sma_series};
pub use rsi::{calculate_rsi, rsi_series};
pub use stochastic::{calculate_stochastic_k, stochastic_k_series};
pub use volatility::{return_volatility, returns, rolling_std, sample_std};
