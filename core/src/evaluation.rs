//! Hold-out metrics for quantile predictions.

use crate::error::{PromoError, PromoResult};

fn check_aligned(a: &[f64], b: &[f64]) -> PromoResult<()> {
    if a.is_empty() {
        return Err(PromoError::invalid_input("metric input is empty"));
    }
    if a.len() != b.len() {
        return Err(PromoError::invalid_input(format!(
            "metric inputs differ in length: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(())
}

/// Mean pinball loss of `predicted` against `actual` at level `alpha`.
pub fn pinball_loss(actual: &[f64], predicted: &[f64], alpha: f64) -> PromoResult<f64> {
    check_aligned(actual, predicted)?;
    let total: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(y, p)| {
            let u = y - p;
            if u >= 0.0 {
                alpha * u
            } else {
                (alpha - 1.0) * u
            }
        })
        .sum();
    Ok(total / actual.len() as f64)
}

/// Share of rows with lower <= actual <= upper.
pub fn interval_coverage(actual: &[f64], lower: &[f64], upper: &[f64]) -> PromoResult<f64> {
    check_aligned(actual, lower)?;
    check_aligned(actual, upper)?;
    let inside = actual
        .iter()
        .zip(lower.iter().zip(upper))
        .filter(|(y, (lo, hi))| *lo <= *y && *y <= *hi)
        .count();
    Ok(inside as f64 / actual.len() as f64)
}

/// Share of rows where the upper quantile predicts below the lower one.
pub fn crossing_rate(lower: &[f64], upper: &[f64]) -> PromoResult<f64> {
    check_aligned(lower, upper)?;
    let crossed = lower.iter().zip(upper).filter(|(lo, hi)| hi < lo).count();
    Ok(crossed as f64 / lower.len() as f64)
}

/// Coefficient of determination. 0.0 when the actual values are constant.
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> PromoResult<f64> {
    check_aligned(actual, predicted)?;
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = actual.iter().zip(predicted).map(|(y, p)| (y - p).powi(2)).sum();
    if ss_tot == 0.0 {
        return Ok(0.0);
    }
    Ok(1.0 - ss_res / ss_tot)
}
