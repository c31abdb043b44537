//! Splits a mirrored frame into bare and coated sub-arcs.

use crate::params::PhysicalParameters;
use crate::sweep::SweepFrame;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ShapeArc {
    pub radial: Vec<f64>,
    pub axial: Vec<f64>,
}

impl ShapeArc {
    fn slice(frame: &SweepFrame, start: usize, end: usize) -> Self {
        Self {
            radial: frame.radial[start..end].to_vec(),
            axial: frame.axial[start..end].to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.radial.len()
    }

    pub fn is_empty(&self) -> bool {
        self.radial.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifiedFrame {
    pub coat_area: f64,
    /// `alpha * 2 pi R0^2` (nm^2).
    pub coated_area: f64,
    /// `sqrt(2 alpha) R0` (nm).
    pub coat_radius: f64,
    pub bare_left: ShapeArc,
    pub coated: ShapeArc,
    pub bare_right: ShapeArc,
}

/// Partitions `frame` at the first radial values not below `-coat_radius`
/// and `coat_radius`. The radial array is assumed sorted ascending; both cut
/// indices are clamped to the array and `left <= right` always holds.
pub fn classify_frame(frame: &SweepFrame, params: &PhysicalParameters) -> ClassifiedFrame {
    let coat_radius = params.coat_radius(frame.coat_area);
    let len = frame.radial.len().min(frame.axial.len());
    let radial = &frame.radial[..len];
    let left = radial.partition_point(|&r| r < -coat_radius).min(len);
    let right = radial.partition_point(|&r| r < coat_radius).clamp(left, len);

    ClassifiedFrame {
        coat_area: frame.coat_area,
        coated_area: params.coated_area(frame.coat_area),
        coat_radius,
        bare_left: ShapeArc::slice(frame, 0, left),
        coated: ShapeArc::slice(frame, left, right),
        bare_right: ShapeArc::slice(frame, right, len),
    }
}
