//! Bounds aggregation
//!
//! Footprint of a set of world-space render bounds, used as a size gate
//! before a subtree is combined.
//!
//! Only the X and Z axes are aggregated. The Y extent is whatever the first
//! render bound carried; this pass-through is kept as observed in the level
//! tooling, so the result is a ground footprint rather than a true bounding
//! box.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::math::Aabb;

/// Axis-aligned extents derived from a set of render bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundsBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundsBox {
    /// Box collapsed to a single point
    pub fn point(position: Vec3) -> Self {
        Self {
            min: position,
            max: position,
        }
    }

    /// Extent along X
    pub fn width(&self) -> f32 {
        (self.max.x - self.min.x).abs()
    }

    /// Extent along Z
    pub fn depth(&self) -> f32 {
        (self.max.z - self.min.z).abs()
    }

    /// True when both ground extents are smaller than `min_size`.
    ///
    /// A strict comparison, so a `min_size` of zero never prunes.
    pub fn is_below_footprint(&self, min_size: f32) -> bool {
        self.width() < min_size && self.depth() < min_size
    }
}

/// Aggregate render bounds into a [`BoundsBox`].
///
/// Empty input collapses to `fallback`. Otherwise the box is seeded from the
/// first bound, X/Z are widened by every bound, and each axis is swapped
/// independently if it ended up inverted. NaN components propagate as-is.
pub fn compute_bounds(render_bounds: &[Aabb], fallback: Vec3) -> BoundsBox {
    let Some(first) = render_bounds.first() else {
        return BoundsBox::point(fallback);
    };

    let mut min = first.min;
    let mut max = first.max;
    for bounds in render_bounds {
        min.x = min.x.min(bounds.min.x);
        min.z = min.z.min(bounds.min.z);
        max.x = max.x.max(bounds.max.x);
        max.z = max.z.max(bounds.max.z);
    }

    if min.x > max.x {
        std::mem::swap(&mut min.x, &mut max.x);
    }
    if min.y > max.y {
        std::mem::swap(&mut min.y, &mut max.y);
    }
    if min.z > max.z {
        std::mem::swap(&mut min.z, &mut max.z);
    }

    BoundsBox { min, max }
}
