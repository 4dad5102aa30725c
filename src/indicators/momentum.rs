/// Price change over `period` bars; `None` for the first `period` bars
pub fn momentum_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..prices.len())
        .map(|i| (period > 0 && i >= period).then(|| prices[i] - prices[i - period]))
        .collect()
}
