use crate::analyzers::types::Summary;

/// Computes the arithmetic mean of a slice of values. Returns 0.0 for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Interpolated quantile of an ascending slice.
///
/// Rank is `p * (n - 1)`; the result interpolates linearly between the
/// values at the floor and ceiling of the rank. Returns `None` for empty
/// input.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = p.clamp(0.0, 1.0) * last as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Summarizes a sample, sorting it in place. Returns `None` for empty input.
pub fn summarize(values: &mut [f64]) -> Option<Summary> {
    values.sort_by(f64::total_cmp);
    let (&min, &max) = (values.first()?, values.last()?);
    Some(Summary {
        count: values.len(),
        min,
        p25: quantile_sorted(values, 0.25)?,
        mean: mean(values),
        p75: quantile_sorted(values, 0.75)?,
        max,
    })
}
