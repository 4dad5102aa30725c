/// Close-to-close fractional returns; the first bar has none
pub fn returns(prices: &[f64]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(prices.len());
    if prices.is_empty() {
        return out;
    }
    out.push(None);
    for pair in prices.windows(2) {
        let prev = pair[0];
        out.push((prev != 0.0).then(|| (pair[1] - prev) / prev));
    }
    out
}

/// Sample standard deviation (n - 1 denominator)
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}

/// Rolling sample std over `window` defined values.
///
/// A window containing a missing value yields `None`.
pub fn rolling_std(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if window < 2 || i + 1 < window {
                return None;
            }
            let slice: Option<Vec<f64>> = values[i + 1 - window..=i].iter().copied().collect();
            slice.and_then(|s| sample_std(&s))
        })
        .collect()
}

/// Volatility of the latest bar: std of the last `window` returns
pub fn return_volatility(prices: &[f64], window: usize) -> Option<f64> {
    rolling_std(&returns(prices), window).last().copied().flatten()
}
