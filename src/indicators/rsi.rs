/// Calculate Relative Strength Index (RSI) of the latest price
///
/// RSI measures the magnitude of recent price changes to evaluate
/// overbought or oversold conditions. Gains and losses are averaged with a
/// simple mean over `period` changes.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
///
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    rsi_series(prices, period).last().copied().flatten()
}

/// RSI for every bar; `None` until `period` changes are available.
///
/// A window without any movement has no defined RSI and yields `None`.
pub fn rsi_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; prices.len()];
    if period == 0 || prices.len() < period + 1 {
        return out;
    }

    let mut gains = Vec::with_capacity(prices.len() - 1);
    let mut losses = Vec::with_capacity(prices.len() - 1);

    // Calculate price changes
    for i in 1..prices.len() {
        let change = prices[i] - prices[i - 1];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    // changes[i - 1] is the move into bar i
    for end in period..=gains.len() {
        let avg_gain: f64 = gains[end - period..end].iter().sum::<f64>() / period as f64;
        let avg_loss: f64 = losses[end - period..end].iter().sum::<f64>() / period as f64;

        out[end] = if avg_loss == 0.0 {
            (avg_gain > 0.0).then_some(100.0)
        } else {
            let rs = avg_gain / avg_loss;
            Some(100.0 - (100.0 / (1.0 + rs)))
        };
    }

    out
}
