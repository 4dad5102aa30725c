use super::moving_average::calculate_sma;
use super::volatility::sample_std;

/// Bollinger Bands around an SMA of closes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub middle: f64,
    pub upper: f64,
    pub lower: f64,
}

/// Calculate Bollinger Bands for the latest `period` prices.
///
/// Band width is `num_std` sample standard deviations of the window.
pub fn calculate_bollinger(prices: &[f64], period: usize, num_std: f64) -> Option<BollingerBands> {
    if period < 2 || prices.len() < period {
        return None;
    }
    let window = &prices[prices.len() - period..];
    let middle = calculate_sma(window, period)?;
    let std = sample_std(window)?;

    Some(BollingerBands {
        middle,
        upper: middle + num_std * std,
        lower: middle - num_std * std,
    })
}

/// Rolling bands; `None` for the first `period - 1` bars
pub fn bollinger_series(prices: &[f64], period: usize, num_std: f64) -> Vec<Option<BollingerBands>> {
    (0..prices.len())
        .map(|i| calculate_bollinger(&prices[..=i], period, num_std))
        .collect()
}
