//! Centroid aggregation over a partition image
//!
//! Aggregation runs in three stages per chunk of regions:
//!
//! 1. [`CondenseStage`]: every pixel tile accumulates one partial record per
//!    region of the chunk.
//! 2. [`ReduceStage`]: tile records are combined pairwise with doubling
//!    stride until a single record per region remains.
//! 3. [`CentroidFinalizer`]: the weighted sum is divided by the total weight,
//!    falling back to the previous generator position for empty regions.
//!
//! [`RegionBatcher`] splits the region range into bounded chunks and drives
//! the stages once per chunk. Chunks touch disjoint output slices and run
//! concurrently on the rayon pool.

mod batcher;
mod condense;
mod finalize;
mod reduce;

pub use batcher::{RegionBatcher, DEFAULT_MAX_CHUNK};
pub use condense::{CondenseStage, PartialBuffer, TileGrid, DEFAULT_TILE_SIZE};
pub use finalize::{stipple_radii, Centroid, CentroidFinalizer};
pub use reduce::ReduceStage;

use glam::{DVec2, Vec2};

/// Partial weighted sum for one region over some subset of pixels
///
/// Accumulates in `f64`; very large images with large weights still lose
/// precision eventually, but far later than a single-precision sum would.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PartialRecord {
    /// Σ weight · world position
    pub weighted_sum: DVec2,
    /// Σ weight
    pub total_weight: f64,
}

impl PartialRecord {
    /// The identity record
    pub const ZERO: Self = Self {
        weighted_sum: DVec2::ZERO,
        total_weight: 0.0,
    };

    /// Record for a single pixel
    #[inline]
    pub fn from_pixel(position: Vec2, weight: f32) -> Self {
        let weight = weight as f64;
        Self {
            weighted_sum: position.as_dvec2() * weight,
            total_weight: weight,
        }
    }

    /// Add one weighted pixel to this record
    #[inline]
    pub fn accumulate(&mut self, position: Vec2, weight: f32) {
        let weight = weight as f64;
        self.weighted_sum += position.as_dvec2() * weight;
        self.total_weight += weight;
    }

    /// Combine two records; associative and commutative
    #[inline]
    pub fn combine(&self, other: &Self) -> Self {
        Self {
            weighted_sum: self.weighted_sum + other.weighted_sum,
            total_weight: self.total_weight + other.total_weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_combine() {
        let a = PartialRecord::from_pixel(Vec2::new(0.0, 0.0), 2.0);
        let b = PartialRecord::from_pixel(Vec2::new(2.0, 0.0), 1.0);
        let c = a.combine(&b);
        assert_eq!(c.weighted_sum, DVec2::new(2.0, 0.0));
        assert_eq!(c.total_weight, 3.0);
        assert_eq!(c, b.combine(&a));
        assert_eq!(c.combine(&PartialRecord::ZERO), c);
    }

    #[test]
    fn test_accumulate_matches_combine() {
        let mut record = PartialRecord::ZERO;
        record.accumulate(Vec2::new(1.0, 3.0), 0.5);
        record.accumulate(Vec2::new(-1.0, 1.0), 1.5);
        let expected = PartialRecord::from_pixel(Vec2::new(1.0, 3.0), 0.5)
            .combine(&PartialRecord::from_pixel(Vec2::new(-1.0, 1.0), 1.5));
        assert_eq!(record, expected);
    }
}
