//! Rasterizers: generators in, partition image out
//!
//! The engine treats rasterization as an external collaborator behind the
//! [`Rasterizer`] trait, so a GPU cone renderer or any other backend can be
//! plugged in. [`NearestGeneratorRasterizer`] is the CPU reference backend:
//! it assigns every pixel to its nearest generator, which is the discrete
//! Voronoi partition the cone renderer approximates.

use glam::Vec2;
use rayon::prelude::*;

use crate::density::DensityField;
use crate::encoding::{decode_normalized, encode_normalized, ChannelFormat, IdEncoding};
use crate::error::{Result, VoronoiError};
use crate::generators::Generator;
use crate::partition::{Domain, PartitionImage};

#[cfg(feature = "spatial-index")]
use crate::spatial::SpatialIndex;

/// Produces a partition image for a set of generators
pub trait Rasterizer {
    /// Whether this rasterizer can deliver region ids in `encoding`
    ///
    /// Checked once when an engine is initialized; an unsupported encoding
    /// refuses to run rather than silently degrading.
    fn supports(&self, encoding: IdEncoding) -> bool;

    /// Rasterize the partition of `generators`, weighting pixels by `density`
    ///
    /// Every pixel must map to exactly one generator id.
    fn produce_partition(&mut self, generators: &[Generator], density: &DensityField) -> Result<PartitionImage>;
}

/// CPU nearest-generator rasterizer
///
/// Pixels are assigned to the closest generator in world space. With the
/// `spatial-index` feature a KD-tree answers the queries, otherwise a linear
/// scan does (ties go to the lowest index). Rows are rasterized in parallel.
#[derive(Debug, Clone)]
pub struct NearestGeneratorRasterizer {
    width: usize,
    height: usize,
    domain: Domain,
    encoding: IdEncoding,
    channel_formats: Vec<ChannelFormat>,
}

impl NearestGeneratorRasterizer {
    /// Create a rasterizer writing exact integer ids
    pub fn new(width: usize, height: usize, domain: Domain) -> Self {
        Self {
            width,
            height,
            domain,
            encoding: IdEncoding::Integer,
            channel_formats: vec![
                ChannelFormat::Unorm8,
                ChannelFormat::Unorm16,
                ChannelFormat::Float16,
                ChannelFormat::Float32,
            ],
        }
    }

    /// Create a rasterizer matching an engine configuration
    pub fn from_config(config: &crate::config::EngineConfig) -> Self {
        Self::new(config.image_width, config.image_height, config.domain).with_encoding(config.id_encoding)
    }

    /// Route ids through the given encoding
    ///
    /// In `NormalizedFloat` mode every id is written to a simulated float
    /// channel and decoded back, reproducing the precision of a GPU render
    /// target.
    pub fn with_encoding(mut self, encoding: IdEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Restrict the float channel formats this rasterizer claims to support
    pub fn with_channel_formats(mut self, formats: &[ChannelFormat]) -> Self {
        self.channel_formats = formats.to_vec();
        self
    }

    /// Image width in pixels
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Image height in pixels
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }
}

impl Rasterizer for NearestGeneratorRasterizer {
    fn supports(&self, encoding: IdEncoding) -> bool {
        match encoding {
            IdEncoding::Integer => true,
            IdEncoding::NormalizedFloat(format) => self.channel_formats.contains(&format),
        }
    }

    fn produce_partition(&mut self, generators: &[Generator], density: &DensityField) -> Result<PartitionImage> {
        if generators.is_empty() {
            return Err(VoronoiError::InvalidConfig(
                "cannot rasterize zero generators".to_string(),
            ));
        }
        if !self.supports(self.encoding) {
            return Err(VoronoiError::UnsupportedCapability(format!(
                "id encoding {:?} is not available",
                self.encoding
            )));
        }
        let num_regions = generators.len();
        if num_regions > self.encoding.max_regions() {
            return Err(VoronoiError::InvalidConfig(format!(
                "{} generators exceed the id budget of {:?}",
                num_regions, self.encoding
            )));
        }

        let positions: Vec<Vec2> = generators.iter().map(|g| g.position).collect();
        let ids_by_index: Vec<u32> = generators.iter().map(|g| g.id).collect();
        let nearest = NearestLookup::new(&positions);

        let (width, height) = (self.width, self.height);
        let domain = self.domain;
        let encoding = self.encoding;
        let mut ids = vec![0u32; width * height];
        let mut weights = vec![0f32; width * height];

        ids.par_chunks_mut(width)
            .zip(weights.par_chunks_mut(width))
            .enumerate()
            .for_each(|(y, (id_row, weight_row))| {
                for x in 0..width {
                    let world = domain.pixel_to_world(x, y, width, height);
                    let id = ids_by_index[nearest.find(world)];
                    id_row[x] = match encoding {
                        IdEncoding::Integer => id,
                        IdEncoding::NormalizedFloat(format) => {
                            decode_normalized(encode_normalized(id, num_regions, format), num_regions)
                        }
                    };
                    weight_row[x] = density.sample(domain.normalize(world));
                }
            });

        PartitionImage::new(width, height, ids, weights)
    }
}

/// Nearest-position query over a fixed set of generators
enum NearestLookup<'a> {
    #[cfg(feature = "spatial-index")]
    Tree(SpatialIndex),
    #[cfg_attr(feature = "spatial-index", allow(dead_code))]
    Scan(&'a [Vec2]),
}

impl<'a> NearestLookup<'a> {
    #[cfg(feature = "spatial-index")]
    fn new(positions: &'a [Vec2]) -> Self {
        NearestLookup::Tree(SpatialIndex::new(positions))
    }

    #[cfg(not(feature = "spatial-index"))]
    fn new(positions: &'a [Vec2]) -> Self {
        NearestLookup::Scan(positions)
    }

    #[inline]
    fn find(&self, point: Vec2) -> usize {
        match self {
            #[cfg(feature = "spatial-index")]
            NearestLookup::Tree(index) => index.find_nearest(point),
            NearestLookup::Scan(positions) => nearest_by_scan(positions, point),
        }
    }
}

/// Linear nearest search; ties resolve to the lowest index
fn nearest_by_scan(positions: &[Vec2], point: Vec2) -> usize {
    let mut best = 0;
    let mut best_distance = f32::INFINITY;
    for (i, p) in positions.iter().enumerate() {
        let distance = p.distance_squared(point);
        if distance < best_distance {
            best = i;
            best_distance = distance;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::generators_from_positions;

    fn quadrant_generators() -> Vec<Generator> {
        generators_from_positions(&[
            Vec2::new(1.5, 1.5),
            Vec2::new(5.5, 1.5),
            Vec2::new(1.5, 5.5),
            Vec2::new(5.5, 5.5),
        ])
    }

    #[test]
    fn test_nearest_partition() {
        let mut rasterizer = NearestGeneratorRasterizer::new(8, 8, Domain::pixel_grid(8, 8));
        let image = rasterizer
            .produce_partition(&quadrant_generators(), &DensityField::Uniform)
            .unwrap();

        assert_eq!(image.sample(0, 0), (0, 1.0));
        assert_eq!(image.sample(7, 0).0, 1);
        assert_eq!(image.sample(0, 7).0, 2);
        assert_eq!(image.sample(7, 7).0, 3);
        assert_eq!(image.region_pixel_counts(4), vec![16; 4]);
    }

    #[test]
    fn test_scan_matches_tree() {
        let positions: Vec<Vec2> = (0..40)
            .map(|i| Vec2::new((i * 37 % 101) as f32 * 0.37, (i * 53 % 89) as f32 * 0.41))
            .collect();
        let lookup = NearestLookup::new(&positions);
        for q in 0..200 {
            let point = Vec2::new((q % 20) as f32 * 1.9 + 0.013, (q / 20) as f32 * 3.7 + 0.029);
            let expected = nearest_by_scan(&positions, point);
            let found = lookup.find(point);
            assert!(
                (positions[found].distance_squared(point) - positions[expected].distance_squared(point)).abs() < 1e-4
            );
        }
    }

    #[test]
    fn test_density_becomes_weight() {
        let density = DensityField::from_weights(2, 1, vec![0.25, 4.0]).unwrap();
        let mut rasterizer = NearestGeneratorRasterizer::new(4, 2, Domain::pixel_grid(4, 2));
        let image = rasterizer
            .produce_partition(&generators_from_positions(&[Vec2::ZERO]), &density)
            .unwrap();
        assert_eq!(image.sample(0, 0).1, 0.25);
        assert_eq!(image.sample(1, 1).1, 0.25);
        assert_eq!(image.sample(2, 0).1, 4.0);
        assert_eq!(image.sample(3, 1).1, 4.0);
    }

    #[test]
    fn test_normalized_channel_within_budget() {
        let generators = quadrant_generators();
        let mut exact = NearestGeneratorRasterizer::new(8, 8, Domain::pixel_grid(8, 8));
        let mut lossy = exact.clone().with_encoding(IdEncoding::NormalizedFloat(ChannelFormat::Unorm8));
        let a = exact.produce_partition(&generators, &DensityField::Uniform).unwrap();
        let b = lossy.produce_partition(&generators, &DensityField::Uniform).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unsupported_and_over_budget() {
        let mut rasterizer = NearestGeneratorRasterizer::new(4, 4, Domain::pixel_grid(4, 4))
            .with_channel_formats(&[ChannelFormat::Float32])
            .with_encoding(IdEncoding::NormalizedFloat(ChannelFormat::Unorm8));
        assert!(!rasterizer.supports(IdEncoding::NormalizedFloat(ChannelFormat::Unorm8)));
        assert!(rasterizer.supports(IdEncoding::Integer));
        let result = rasterizer.produce_partition(&quadrant_generators(), &DensityField::Uniform);
        assert!(matches!(result, Err(VoronoiError::UnsupportedCapability(_))));

        let positions = vec![Vec2::ZERO; 300];
        let mut rasterizer = NearestGeneratorRasterizer::new(4, 4, Domain::pixel_grid(4, 4))
            .with_encoding(IdEncoding::NormalizedFloat(ChannelFormat::Unorm8));
        let result = rasterizer.produce_partition(&generators_from_positions(&positions), &DensityField::Uniform);
        assert!(matches!(result, Err(VoronoiError::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_generators() {
        let mut rasterizer = NearestGeneratorRasterizer::new(2, 2, Domain::pixel_grid(2, 2));
        assert!(rasterizer.produce_partition(&[], &DensityField::Uniform).is_err());
    }
}
