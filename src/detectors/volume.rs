//! Rolling average volume used to judge climactic volume

use tracing::warn;

use crate::OHLCV;

/// Trailing simple moving average of volume, one value per bar.
///
/// The window covers `lookback` bars ending at (and including) each bar and
/// needs at least `min_periods` finite volumes. Bars without enough history
/// take the first computable average; with none at all, or when no bar
/// carries volume, every value is 1.0.
pub fn average_volume<T: OHLCV>(bars: &[T], lookback: usize, min_periods: usize) -> Vec<f64> {
    let volumes: Vec<Option<f64>> = bars
        .iter()
        .map(|b| b.volume().filter(|v| v.is_finite()))
        .collect();

    if volumes.iter().all(Option::is_none) {
        if !bars.is_empty() {
            warn!("volume data missing, climax detection degraded");
        }
        return vec![1.0; bars.len()];
    }

    let lookback = lookback.max(1);
    let mut sum = 0.0;
    let mut count = 0usize;
    let mut averages: Vec<Option<f64>> = Vec::with_capacity(bars.len());

    for i in 0..volumes.len() {
        if let Some(v) = volumes[i] {
            sum += v;
            count += 1;
        }
        if i >= lookback {
            if let Some(v) = volumes[i - lookback] {
                sum -= v;
                count -= 1;
            }
        }
        averages.push((count >= min_periods && count > 0).then(|| sum / count as f64));
    }

    let fill = averages.iter().flatten().next().copied().unwrap_or(1.0);
    averages.into_iter().map(|a| a.unwrap_or(fill)).collect()
}
