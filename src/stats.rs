// 📐 Descriptive statistics helpers (population formulas)

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (divides by n)
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

/// Percent change between consecutive values; a zero base yields None
pub fn percent_changes(values: &[f64]) -> Option<Vec<f64>> {
    values
        .windows(2)
        .map(|w| (w[0] != 0.0).then(|| (w[1] - w[0]) / w[0] * 100.0))
        .collect()
}
