//! Fixed-Point Track Position
//!
//! 2D position on the course with fixed-point components: `x` is the
//! distance travelled along the track, `y` is the lateral lane offset.
//! All operations use fixed-point arithmetic.

use std::fmt;
use serde::{Serialize, Deserialize};

use super::fixed::{Fixed, FIXED_SCALE, fixed_mul, to_float};

/// 2D vector with fixed-point components.
///
/// Convention: `x` runs along the track (0 at the gate, increasing
/// toward the finish line), `y` is the lane offset.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FixedVec2 {
    /// Distance along the track (Q16.16)
    pub x: Fixed,
    /// Lane offset (Q16.16)
    pub y: Fixed,
}

impl FixedVec2 {
    /// Zero vector (at the gate, innermost lane).
    pub const ZERO: Self = Self { x: 0, y: 0 };

    /// Create a new vector from fixed-point components.
    #[inline]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Add another vector.
    #[inline]
    pub fn add(self, other: Self) -> Self {
        Self {
            x: self.x.wrapping_add(other.x),
            y: self.y.wrapping_add(other.y),
        }
    }

    /// Subtract another vector.
    #[inline]
    pub fn sub(self, other: Self) -> Self {
        Self {
            x: self.x.wrapping_sub(other.x),
            y: self.y.wrapping_sub(other.y),
        }
    }

    /// Scale by a fixed-point scalar.
    #[inline]
    pub fn scale(self, scalar: Fixed) -> Self {
        Self {
            x: fixed_mul(self.x, scalar),
            y: fixed_mul(self.y, scalar),
        }
    }

    /// Squared distance to another point.
    ///
    /// Proximity checks compare squared distances against squared radii,
    /// avoiding sqrt entirely. Computed wide and saturated: points a
    /// whole track apart must compare farther than any radius, not wrap.
    #[inline]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = (self.x as i64 - other.x as i64).clamp(-(1 << 30), 1 << 30);
        let dy = (self.y as i64 - other.y as i64).clamp(-(1 << 30), 1 << 30);
        let sq = (dx * dx + dy * dy) >> FIXED_SCALE;
        sq.min(i32::MAX as i64) as Fixed
    }

    /// Convert to float tuple for display and logging only.
    pub fn to_floats(self) -> (f32, f32) {
        (to_float(self.x), to_float(self.y))
    }
}

impl fmt::Debug for FixedVec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (x, y) = self.to_floats();
        write!(f, "({x:.4}, {y:.4})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::to_fixed;

    #[test]
    fn test_add_sub() {
        let a = FixedVec2::new(to_fixed(3.0), to_fixed(1.0));
        let b = FixedVec2::new(to_fixed(2.0), to_fixed(4.0));

        assert_eq!(a.add(b), FixedVec2::new(to_fixed(5.0), to_fixed(5.0)));
        assert_eq!(a.sub(b), FixedVec2::new(to_fixed(1.0), to_fixed(-3.0)));
    }

    #[test]
    fn test_scale() {
        let v = FixedVec2::new(to_fixed(3.0), to_fixed(-2.0));
        assert_eq!(v.scale(to_fixed(2.0)), FixedVec2::new(to_fixed(6.0), to_fixed(-4.0)));
    }

    #[test]
    fn test_distance_squared() {
        let a = FixedVec2::ZERO;
        let b = FixedVec2::new(to_fixed(3.0), to_fixed(4.0));
        // 3-4-5 triangle: squared distance 25
        assert_eq!(a.distance_squared(b), to_fixed(25.0));
    }

    #[test]
    fn test_distance_squared_saturates_across_track() {
        // A whole track apart: must read as far, never wrap small
        let a = FixedVec2::ZERO;
        let b = FixedVec2::new(to_fixed(1000.0), 0);
        assert!(a.distance_squared(b) > to_fixed(100.0));
    }
}
