//! Measured-move price targets

use crate::{breakout::BreakoutEvent, extrema::ExtremumPoint, Direction, Geometry};

/// Formation height and the target it projects from the breakout
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Projection {
    pub pattern_height: f64,
    /// Absent when the height is not positive
    pub target_price: Option<f64>,
}

/// Distance between the upper and lower boundary of a formation.
///
/// Triangles and wedges are measured at their first support low, a double
/// bottom from the neckline to the lower bottom, an inverse head & shoulders
/// from the neckline to the head.
pub fn pattern_height(geometry: &Geometry) -> f64 {
    match geometry {
        Geometry::AscendingTriangle {
            resistance_level,
            support_line,
            support_points,
            ..
        } => first_index(support_points)
            .map(|x| resistance_level - support_line.value_at(x))
            .unwrap_or(0.0),
        Geometry::DescendingTriangle {
            support_level,
            resistance_line,
            support_points,
            ..
        } => first_index(support_points)
            .map(|x| resistance_line.value_at(x) - support_level)
            .unwrap_or(0.0),
        Geometry::FallingWedge {
            resistance_line,
            support_line,
            support_points,
            ..
        } => first_index(support_points)
            .map(|x| resistance_line.value_at(x) - support_line.value_at(x))
            .unwrap_or(0.0),
        Geometry::DoubleBottom {
            first_bottom,
            neckline_peak,
            second_bottom,
        } => neckline_peak.value - first_bottom.value.min(second_bottom.value),
        Geometry::InverseHeadAndShoulders { head, neckline, .. } => {
            neckline.value_at(head.index) - head.value
        }
    }
}

fn first_index(points: &[ExtremumPoint]) -> Option<usize> {
    points.first().map(|p| p.index)
}

/// Project the formation height from the boundary value at the breakout bar.
pub fn project(geometry: &Geometry, breakout: &BreakoutEvent) -> Projection {
    let height = pattern_height(geometry);
    let target_price = (height > 0.0).then(|| match geometry.direction() {
        Direction::Bullish => breakout.boundary_value + height,
        Direction::Bearish => breakout.boundary_value - height,
    });
    Projection {
        pattern_height: height,
        target_price,
    }
}
