//! Least-squares trendline fitting

use crate::extrema::ExtremumPoint;

/// Denominators below this are treated as a vertical (unreliable) fit
pub const FIT_DENOMINATOR_EPSILON: f64 = 1e-9;

/// `price = slope * index + intercept`
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
}

impl TrendLine {
    #[inline]
    pub fn value_at(&self, index: usize) -> f64 {
        self.slope * index as f64 + self.intercept
    }

    /// Fit a line through swing points using their bar index as x.
    pub fn through(points: &[ExtremumPoint]) -> Option<Self> {
        let xs: Vec<f64> = points.iter().map(|p| p.index as f64).collect();
        let ys: Vec<f64> = points.iter().map(|p| p.value).collect();
        fit(&xs, &ys)
    }
}

/// Ordinary least squares fit.
///
/// Returns `None` for fewer than two points, mismatched lengths, or a
/// near-zero denominator (all x equal).
pub fn fit(xs: &[f64], ys: &[f64]) -> Option<TrendLine> {
    let n = xs.len();
    if n < 2 || n != ys.len() {
        return None;
    }

    let (sum_x, sum_y, sum_xy, sum_xx) = xs.iter().zip(ys).fold(
        (0.0, 0.0, 0.0, 0.0),
        |(sx, sy, sxy, sxx), (&x, &y)| (sx + x, sy + y, sxy + x * y, sxx + x * x),
    );

    let n = n as f64;
    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator.abs() < FIT_DENOMINATOR_EPSILON {
        return None;
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n;
    Some(TrendLine { slope, intercept })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_line() {
        let xs = [0.0, 1.0, 2.0, 5.0, 9.0];
        let ys: Vec<f64> = xs.iter().map(|x| 2.0 * x + 3.0).collect();
        let line = fit(&xs, &ys).unwrap();
        assert!((line.slope - 2.0).abs() < 1e-6);
        assert!((line.intercept - 3.0).abs() < 1e-6);
        assert!((line.value_at(10) - 23.0).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(fit(&[1.0], &[1.0]).is_none());
        assert!(fit(&[], &[]).is_none());
        assert!(fit(&[1.0, 2.0], &[1.0]).is_none());
        // All x equal: vertical line
        assert!(fit(&[3.0, 3.0, 3.0], &[1.0, 2.0, 3.0]).is_none());
    }

    #[test]
    fn test_noisy_points() {
        let line = fit(&[0.0, 1.0, 2.0, 3.0], &[1.0, 2.0, 2.0, 3.0]).unwrap();
        assert!((line.slope - 0.6).abs() < 1e-9);
        assert!((line.intercept - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_through_points() {
        let points = [
            ExtremumPoint { index: 10, value: 100.0, timestamp: None },
            ExtremumPoint { index: 20, value: 90.0, timestamp: None },
        ];
        let line = TrendLine::through(&points).unwrap();
        assert!((line.slope + 1.0).abs() < 1e-9);
        assert!((line.value_at(15) - 95.0).abs() < 1e-9);
    }
}
