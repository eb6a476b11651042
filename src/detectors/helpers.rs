//! Window helpers shared across the classifiers

use crate::OHLCV;

/// Trailing window of `len` bars that stops `skip` bars before the end.
///
/// `trailing_window(bars, 5, 1)` is the five bars before the last one.
/// Returns `None` if the series is too short to fill the window.
#[inline]
pub fn trailing_window<T>(bars: &[T], len: usize, skip: usize) -> Option<&[T]> {
    let end = bars.len().checked_sub(skip)?;
    let start = end.checked_sub(len)?;
    Some(&bars[start..end])
}

/// Highest high in the slice. `None` when empty.
#[inline]
pub fn highest_high<T: OHLCV>(bars: &[T]) -> Option<f64> {
    bars.iter().map(|b| b.high()).reduce(f64::max)
}

/// Lowest low in the slice. `None` when empty.
#[inline]
pub fn lowest_low<T: OHLCV>(bars: &[T]) -> Option<f64> {
    bars.iter().map(|b| b.low()).reduce(f64::min)
}

/// Arithmetic mean of closes. `None` when empty.
#[inline]
pub fn mean_close<T: OHLCV>(bars: &[T]) -> Option<f64> {
    if bars.is_empty() {
        return None;
    }
    let sum: f64 = bars.iter().map(|b| b.close()).sum();
    Some(sum / bars.len() as f64)
}
