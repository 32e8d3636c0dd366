//! Windowed scans shared by the event detector
//!
//! All scans walk a half-open bar range forward and keep the first bar that
//! attains the extremum, so ties resolve to the earliest bar. Comparisons are
//! strict. A non-finite value inside the scanned range is a fault, reported
//! as [`EngineError::NonFinite`].

use std::ops::Range;

use crate::{EngineError, Result, OHLCV};

#[inline]
fn finite(value: f64, index: usize, field: &'static str) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EngineError::NonFinite { index, field })
    }
}

/// Clamp `start..start + len` to the series length
#[inline]
pub fn window(start: usize, len: usize, total: usize) -> Range<usize> {
    start.min(total)..start.saturating_add(len).min(total)
}

/// Bar with the lowest Low in `range`
pub fn lowest_low<T: OHLCV>(bars: &[T], range: Range<usize>) -> Result<Option<(usize, f64)>> {
    let mut best: Option<(usize, f64)> = None;
    for i in range {
        let low = finite(bars[i].low(), i, "low")?;
        if best.map_or(true, |(_, b)| low < b) {
            best = Some((i, low));
        }
    }
    Ok(best)
}

/// Bar with the highest High in `range`
pub fn highest_high<T: OHLCV>(bars: &[T], range: Range<usize>) -> Result<Option<(usize, f64)>> {
    let mut best: Option<(usize, f64)> = None;
    for i in range {
        let high = finite(bars[i].high(), i, "high")?;
        if best.map_or(true, |(_, b)| high > b) {
            best = Some((i, high));
        }
    }
    Ok(best)
}

/// Bar with the lowest Low among bars whose Low is strictly below `level`
pub fn lowest_low_below<T: OHLCV>(
    bars: &[T],
    range: Range<usize>,
    level: f64,
) -> Result<Option<(usize, f64)>> {
    Ok(lowest_low(bars, range)?.filter(|&(_, low)| low < level))
}

/// First bar whose Close is strictly above `level`
pub fn first_close_above<T: OHLCV>(
    bars: &[T],
    range: Range<usize>,
    level: f64,
) -> Result<Option<(usize, f64)>> {
    for i in range {
        let close = finite(bars[i].close(), i, "close")?;
        if close > level {
            return Ok(Some((i, close)));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bar;
    use chrono::{TimeZone, Utc};

    fn bars(lows: &[f64]) -> Vec<Bar> {
        lows.iter()
            .enumerate()
            .map(|(i, &l)| {
                let t = Utc.timestamp_opt(i as i64 * 60, 0).unwrap();
                Bar::new(t, l + 1.0, l + 2.0, l, l + 1.5)
            })
            .collect()
    }

    #[test]
    fn test_window_clamps() {
        assert_eq!(window(3, 5, 10), 3..8);
        assert_eq!(window(8, 5, 10), 8..10);
        assert_eq!(window(12, 5, 10), 10..10);
        assert_eq!(window(3, usize::MAX, 10), 3..10);
    }

    #[test]
    fn test_lowest_low_first_on_tie() {
        let b = bars(&[5.0, 3.0, 4.0, 3.0]);
        assert_eq!(lowest_low(&b, 0..4).unwrap(), Some((1, 3.0)));
        assert_eq!(lowest_low(&b, 2..4).unwrap(), Some((3, 3.0)));
        assert_eq!(lowest_low(&b, 2..2).unwrap(), None);
    }

    #[test]
    fn test_highest_high() {
        let b = bars(&[5.0, 7.0, 7.0, 6.0]);
        assert_eq!(highest_high(&b, 0..4).unwrap(), Some((1, 9.0)));
    }

    #[test]
    fn test_lowest_low_below_is_strict() {
        let b = bars(&[5.0, 4.0, 4.5]);
        assert_eq!(lowest_low_below(&b, 0..3, 4.0).unwrap(), None);
        assert_eq!(lowest_low_below(&b, 0..3, 4.1).unwrap(), Some((1, 4.0)));
    }

    #[test]
    fn test_first_close_above() {
        let b = bars(&[5.0, 8.0, 9.0]);
        // closes: 6.5, 9.5, 10.5
        assert_eq!(first_close_above(&b, 0..3, 9.5).unwrap(), Some((2, 10.5)));
        assert_eq!(first_close_above(&b, 0..3, 11.0).unwrap(), None);
    }

    #[test]
    fn test_non_finite_is_fault() {
        let mut b = bars(&[5.0, 4.0, 3.0]);
        b[1].low = f64::NAN;
        assert_eq!(
            lowest_low(&b, 0..3),
            Err(EngineError::NonFinite { index: 1, field: "low" })
        );
        // outside the range is not inspected
        assert!(lowest_low(&b, 2..3).is_ok());
    }
}
