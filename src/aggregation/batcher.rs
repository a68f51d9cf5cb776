//! Region batching: bounded chunks of regions through condense + reduce

use std::ops::Range;
use std::time::Instant;

use glam::Vec2;

use super::condense::{CondenseStage, PartialBuffer};
use super::finalize::{Centroid, CentroidFinalizer};
use super::reduce::ReduceStage;
use super::PartialRecord;
use crate::error::{Result, VoronoiError};
use crate::partition::{Domain, PartitionImage};

/// Default number of regions aggregated per chunk
pub const DEFAULT_MAX_CHUNK: usize = 1024;

/// Drives condense and reduce once per chunk of at most `max_chunk` regions
///
/// Chunking bounds the size of each partial buffer; it never changes the
/// result. Every region is condensed over the same tiles and reduced with
/// the same pairing regardless of which chunk it lands in, so centroids are
/// identical for any chunk size.
///
/// Chunks are processed one after another through a single partial buffer
/// of at most `max_chunk × tiles` records, reused across chunks and
/// iterations. Parallelism comes from the tiles inside each chunk.
#[derive(Debug, Clone)]
pub struct RegionBatcher {
    max_chunk: usize,
    condense: CondenseStage,
    finalizer: CentroidFinalizer,
    buffer: PartialBuffer,
}

impl RegionBatcher {
    /// Create a batcher
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `max_chunk` or `tile_size` is zero.
    pub fn new(max_chunk: usize, tile_size: usize, domain: Domain) -> Result<Self> {
        if max_chunk == 0 {
            return Err(VoronoiError::InvalidConfig(
                "max chunk size must be > 0".to_string(),
            ));
        }
        if tile_size == 0 {
            return Err(VoronoiError::InvalidConfig(
                "tile size must be > 0".to_string(),
            ));
        }
        Ok(Self {
            max_chunk,
            condense: CondenseStage::new(tile_size, domain),
            finalizer: CentroidFinalizer::default(),
            buffer: PartialBuffer::default(),
        })
    }

    /// Replace the centroid finalizer
    pub fn with_finalizer(mut self, finalizer: CentroidFinalizer) -> Self {
        self.finalizer = finalizer;
        self
    }

    /// Maximum regions per chunk
    #[inline]
    pub fn max_chunk(&self) -> usize {
        self.max_chunk
    }

    /// Centroid finalizer in use
    #[inline]
    pub fn finalizer(&self) -> &CentroidFinalizer {
        &self.finalizer
    }

    /// Partial records currently allocated
    #[inline]
    pub fn resident_records(&self) -> usize {
        self.buffer.capacity()
    }

    /// Split `[0, num_regions)` into consecutive chunks of at most `max_chunk`
    pub fn chunk_ranges(&self, num_regions: usize) -> Vec<Range<usize>> {
        (0..num_regions)
            .step_by(self.max_chunk)
            .map(|start| start..(start + self.max_chunk).min(num_regions))
            .collect()
    }

    /// Reduced `(weighted sum, total weight)` record for every region
    pub fn aggregate_records(&mut self, image: &PartitionImage, num_regions: usize) -> Vec<PartialRecord> {
        let mut records = Vec::with_capacity(num_regions);
        for range in self.chunk_ranges(num_regions) {
            let start = Instant::now();
            let first = range.start;
            self.condense.run_into(image, range, &mut self.buffer);
            let passes = ReduceStage::run(&mut self.buffer);
            records.extend_from_slice(self.buffer.totals());
            log::trace!(
                "chunk at {}: {} regions, {} tiles, {} reduce passes, {:?}",
                first,
                self.buffer.regions(),
                self.buffer.tiles(),
                passes,
                start.elapsed()
            );
        }
        records
    }

    /// Weighted centroid of every region
    ///
    /// `previous` holds the current generator positions, one per region; it
    /// fixes the region count and supplies the fallback for empty regions.
    pub fn aggregate(&mut self, image: &PartitionImage, previous: &[Vec2]) -> Vec<Centroid> {
        let records = self.aggregate_records(image, previous.len());
        self.finalizer.finalize(&records, previous)
    }

    /// Drop the partial buffer
    pub fn release(&mut self) {
        self.buffer = PartialBuffer::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::TileGrid;

    fn striped_image(width: usize, height: usize, regions: u32) -> PartitionImage {
        PartitionImage::from_fn(width, height, |x, y| {
            let id = ((x * 7 + y * 13) % regions as usize) as u32;
            (id, 0.5 + ((x + 2 * y) % 5) as f32)
        })
        .unwrap()
    }

    #[test]
    fn test_chunk_ranges() {
        let batcher = RegionBatcher::new(4, 8, Domain::pixel_grid(1, 1)).unwrap();
        assert_eq!(batcher.chunk_ranges(10), vec![0..4, 4..8, 8..10]);
        assert_eq!(batcher.chunk_ranges(4), vec![0..4]);
        assert!(batcher.chunk_ranges(0).is_empty());
    }

    #[test]
    fn test_invalid_batcher() {
        assert!(RegionBatcher::new(0, 8, Domain::pixel_grid(1, 1)).is_err());
        assert!(RegionBatcher::new(8, 0, Domain::pixel_grid(1, 1)).is_err());
    }

    #[test]
    fn test_chunk_invariance() {
        let (width, height, n) = (37, 29, 23u32);
        let image = striped_image(width, height, n);
        let domain = Domain::from_aspect(width, height);
        let previous = vec![Vec2::ZERO; n as usize];

        let single = RegionBatcher::new(n as usize, 8, domain)
            .unwrap()
            .aggregate(&image, &previous);
        let per_region = RegionBatcher::new(1, 8, domain)
            .unwrap()
            .aggregate(&image, &previous);
        let uneven = RegionBatcher::new(5, 8, domain)
            .unwrap()
            .aggregate(&image, &previous);

        assert_eq!(single.len(), n as usize);
        for ((a, b), c) in single.iter().zip(&per_region).zip(&uneven) {
            assert!((a.position - b.position).length() < 1e-6);
            assert!((a.position - c.position).length() < 1e-6);
            assert!((a.total_weight - b.total_weight).abs() < 1e-9);
            assert!((a.total_weight - c.total_weight).abs() < 1e-9);
        }
    }

    #[test]
    fn test_single_region_mean_independent_of_tiling() {
        // One region covering a scattered set of unit-weight pixels.
        let (width, height) = (19, 11);
        let owned = |x: usize, y: usize| (x * y) % 3 == 1;
        let image = PartitionImage::from_fn(width, height, |x, y| (if owned(x, y) { 0 } else { 1 }, 1.0)).unwrap();
        let domain = Domain::pixel_grid(width, height);

        let (mut sx, mut sy, mut k) = (0.0f64, 0.0f64, 0usize);
        for y in 0..height {
            for x in 0..width {
                if owned(x, y) {
                    sx += x as f64;
                    sy += y as f64;
                    k += 1;
                }
            }
        }
        let mean = Vec2::new((sx / k as f64) as f32, (sy / k as f64) as f32);

        for tile in [1, 3, 8, 32] {
            for chunk in [1, 2] {
                let centroids = RegionBatcher::new(chunk, tile, domain)
                    .unwrap()
                    .aggregate(&image, &[Vec2::ZERO, Vec2::ZERO]);
                assert!((centroids[0].position - mean).length() < 1e-4);
                assert_eq!(centroids[0].total_weight, k as f64);
            }
        }
    }

    #[test]
    fn test_weighted_two_pixel_region() {
        let image = PartitionImage::new(3, 1, vec![0, 1, 0], vec![2.0, 1.0, 1.0]).unwrap();
        let centroids = RegionBatcher::new(8, 8, Domain::pixel_grid(3, 1))
            .unwrap()
            .aggregate(&image, &[Vec2::ZERO, Vec2::ZERO]);
        assert!((centroids[0].position.x - 2.0 / 3.0).abs() < 1e-6);
        assert!((centroids[0].total_weight - 3.0).abs() < 1e-9);
        assert_eq!(centroids[1].position, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_empty_region_fallback() {
        let image = PartitionImage::uniform(4, 4, vec![0; 16]).unwrap();
        let previous = [Vec2::ZERO, Vec2::new(-3.0, 7.0)];
        let centroids = RegionBatcher::new(1, 2, Domain::pixel_grid(4, 4))
            .unwrap()
            .aggregate(&image, &previous);
        assert_eq!(centroids[0].position, Vec2::new(1.5, 1.5));
        assert_eq!(centroids[1].position, Vec2::new(-3.0, 7.0));
        assert!(centroids[1].is_empty());
    }

    #[test]
    fn test_buffer_bounded_by_chunk_size() {
        let (width, height, n) = (64, 64, 256u32);
        let image = striped_image(width, height, n);
        let domain = Domain::pixel_grid(width, height);
        let previous = vec![Vec2::ZERO; n as usize];
        let tiles = TileGrid::new(8, width, height).tile_count();

        let mut whole = RegionBatcher::new(n as usize, 8, domain).unwrap();
        let mut chunked = RegionBatcher::new(32, 8, domain).unwrap();
        let a = whole.aggregate(&image, &previous);
        let b = chunked.aggregate(&image, &previous);
        assert_eq!(a, b);

        assert!(whole.resident_records() >= n as usize * tiles);
        assert!(chunked.resident_records() >= 32 * tiles);
        assert!(chunked.resident_records() < 2 * 32 * tiles);
        assert!(chunked.resident_records() * 4 <= whole.resident_records());

        chunked.release();
        assert_eq!(chunked.resident_records(), 0);
    }

    #[test]
    fn test_records_cover_every_pixel() {
        let image = striped_image(16, 16, 6);
        let unit = PartitionImage::uniform(16, 16, image.ids().to_vec()).unwrap();
        let records = RegionBatcher::new(4, 8, Domain::pixel_grid(16, 16))
            .unwrap()
            .aggregate_records(&unit, 6);
        let total: f64 = records.iter().map(|r| r.total_weight).sum();
        assert_eq!(total, 256.0);
        let counts = unit.region_pixel_counts(6);
        for (record, count) in records.iter().zip(counts) {
            assert_eq!(record.total_weight, count as f64);
        }
    }
}
