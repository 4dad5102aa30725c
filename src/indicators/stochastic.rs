/// Stochastic %K: where the close sits in the high/low range of the last `period` bars.
///
/// Returns `None` when the range is empty (flat market) or data is short.
pub fn calculate_stochastic_k(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Option<f64> {
    let n = closes.len();
    if period == 0 || n < period || highs.len() != n || lows.len() != n {
        return None;
    }

    let highest = highs[n - period..].iter().copied().fold(f64::MIN, f64::max);
    let lowest = lows[n - period..].iter().copied().fold(f64::MAX, f64::min);
    let range = highest - lowest;
    if range <= 0.0 {
        return None;
    }

    Some(100.0 * (closes[n - 1] - lowest) / range)
}

/// Rolling %K; `None` for the first `period - 1` bars
pub fn stochastic_k_series(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..closes.len())
        .map(|i| calculate_stochastic_k(&highs[..=i], &lows[..=i], &closes[..=i], period))
        .collect()
}
