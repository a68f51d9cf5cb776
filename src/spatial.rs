//! Spatial indexing for nearest-generator lookups
//!
//! This module is only available with the `spatial-index` feature.

#[cfg(feature = "spatial-index")]
use kiddo::immutable::float::kdtree::ImmutableKdTree;
#[cfg(feature = "spatial-index")]
use kiddo::SquaredEuclidean;
#[cfg(feature = "spatial-index")]
use glam::Vec2;

/// Wrapper around a 2D KD-tree of generator positions
///
/// The reference rasterizer rebuilds one per iteration and then answers one
/// nearest-neighbour query per pixel.
///
/// # Performance
///
/// - Construction: O(n log n)
/// - Query: O(log n)
#[cfg(feature = "spatial-index")]
#[derive(Clone)]
pub struct SpatialIndex {
    tree: ImmutableKdTree<f32, usize, 2, 32>,
}

#[cfg(feature = "spatial-index")]
impl SpatialIndex {
    /// Build a spatial index from generator positions
    ///
    /// # Example
    ///
    /// ```
    /// use rust_voronoi_stipple::*;
    /// use glam::Vec2;
    ///
    /// # #[cfg(feature = "spatial-index")]
    /// # {
    /// let positions = vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)];
    /// let index = SpatialIndex::new(&positions);
    /// assert_eq!(index.find_nearest(Vec2::new(0.9, 0.2)), 1);
    /// # }
    /// ```
    pub fn new(positions: &[Vec2]) -> Self {
        let points: Vec<[f32; 2]> = positions.iter().map(|p| [p.x, p.y]).collect();

        Self {
            tree: ImmutableKdTree::new_from_slice(&points),
        }
    }

    /// Index of the position nearest to `point`
    pub fn find_nearest(&self, point: Vec2) -> usize {
        let query = [point.x, point.y];
        let result = self.tree.nearest_one::<SquaredEuclidean>(&query);
        result.item as usize
    }
}
