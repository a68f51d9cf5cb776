//! Partition engine configuration and builder
//!
//! This module provides the validated configuration shared by the batcher,
//! the rasterizer and the relaxation loop.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use glam::Vec2;

use crate::aggregation::{DEFAULT_MAX_CHUNK, DEFAULT_TILE_SIZE};
use crate::encoding::IdEncoding;
use crate::error::{Result, VoronoiError};
use crate::lloyd::LloydOptions;
use crate::partition::Domain;

/// How generators move toward their centroids each step
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RelocationPolicy {
    /// Jump straight to the centroid (plain Lloyd relaxation)
    #[default]
    SnapToCentroid,
    /// Move at most `max_distance` world units toward the centroid
    BoundedStep {
        /// Largest displacement allowed per step
        max_distance: f32,
    },
}

impl RelocationPolicy {
    /// New position of a generator at `current` whose centroid is `target`
    #[inline]
    pub fn relocate(self, current: Vec2, target: Vec2) -> Vec2 {
        match self {
            RelocationPolicy::SnapToCentroid => target,
            RelocationPolicy::BoundedStep { max_distance } => move_towards(current, target, max_distance),
        }
    }

    fn validate(self) -> Result<()> {
        if let RelocationPolicy::BoundedStep { max_distance } = self {
            if !(max_distance.is_finite() && max_distance > 0.0) {
                return Err(VoronoiError::InvalidConfig(format!(
                    "bounded step distance must be positive (got {})",
                    max_distance
                )));
            }
        }
        Ok(())
    }
}

/// Move `current` toward `target` by at most `max_distance`
#[inline]
pub fn move_towards(current: Vec2, target: Vec2, max_distance: f32) -> Vec2 {
    let delta = target - current;
    let distance = delta.length();
    if distance <= max_distance || distance == 0.0 {
        target
    } else {
        current + delta / distance * max_distance
    }
}

/// Configuration for a partition engine
///
/// The configuration is plain data (and serializable with the `serde`
/// feature). All validation happens when it is built, so an engine that
/// initializes successfully never hits a configuration error mid-run.
///
/// # Example
///
/// ```rust
/// use rust_voronoi_stipple::*;
///
/// let config = EngineConfigBuilder::new()
///     .seed(42)
///     .num_regions(500)
///     .unwrap()
///     .image_size(320, 240)
///     .unwrap()
///     .build()
///     .unwrap();
///
/// assert_eq!(config.num_regions, 500);
/// assert_eq!(config.pixel_count(), 320 * 240);
/// ```
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Number of generators, and therefore of region ids
    pub num_regions: usize,

    /// Partition image width in pixels
    pub image_width: usize,

    /// Partition image height in pixels
    pub image_height: usize,

    /// Maximum regions aggregated in one chunk
    pub max_chunk_size: usize,

    /// Edge of the square pixel tiles used by the condense stage
    pub tile_size: usize,

    /// How generators move toward their centroids
    pub relocation: RelocationPolicy,

    /// Weight pixels by an external density field instead of uniformly
    pub weighted: bool,

    /// How the rasterizer delivers region ids
    pub id_encoding: IdEncoding,

    /// World rectangle covered by the partition image
    pub domain: Domain,

    /// Random seed for the initial generator placement
    pub seed: u32,

    /// Maximum number of relaxation steps run by `PartitionEngine::relax`
    pub lloyd_iterations: usize,

    /// Convergence threshold as a fraction of the domain extent
    ///
    /// - 0.0: Disable early termination (run all iterations)
    /// - 0.0005: Default, stops when no generator moves more than 0.05% of the domain
    pub lloyd_convergence: f32,

    /// Regions whose total weight is at or below this keep their position
    pub min_region_weight: f64,
}

impl EngineConfig {
    /// Total number of pixels in the partition image
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.image_width * self.image_height
    }

    /// Relaxation loop options derived from this configuration
    #[inline]
    pub fn lloyd_options(&self) -> LloydOptions {
        LloydOptions {
            max_iterations: self.lloyd_iterations,
            convergence_threshold: self.lloyd_convergence,
        }
    }

    /// Check every field
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.num_regions == 0 {
            return Err(VoronoiError::InvalidConfig(
                "number of regions must be > 0".to_string(),
            ));
        }
        if self.num_regions > self.id_encoding.max_regions() {
            return Err(VoronoiError::InvalidConfig(format!(
                "{} regions exceed the precision budget of {:?} ({} ids)",
                self.num_regions,
                self.id_encoding,
                self.id_encoding.max_regions()
            )));
        }
        if self.image_width == 0 || self.image_height == 0 {
            return Err(VoronoiError::InvalidConfig(format!(
                "image dimensions must be positive (got {}x{})",
                self.image_width, self.image_height
            )));
        }
        if self.max_chunk_size == 0 {
            return Err(VoronoiError::InvalidConfig(
                "max chunk size must be > 0".to_string(),
            ));
        }
        if self.tile_size == 0 {
            return Err(VoronoiError::InvalidConfig(
                "tile size must be > 0".to_string(),
            ));
        }
        self.relocation.validate()?;
        Domain::new(self.domain.min, self.domain.max)?;
        if !(self.lloyd_convergence >= 0.0) {
            return Err(VoronoiError::InvalidConfig(format!(
                "Lloyd convergence threshold must be >= 0 (got {})",
                self.lloyd_convergence
            )));
        }
        validate_min_weight(self.min_region_weight)?;
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let width = 256;
        let height = 256;
        Self {
            num_regions: 1024,
            image_width: width,
            image_height: height,
            max_chunk_size: DEFAULT_MAX_CHUNK,
            tile_size: DEFAULT_TILE_SIZE,
            relocation: RelocationPolicy::default(),
            weighted: false,
            id_encoding: IdEncoding::default(),
            domain: Domain::from_aspect(width, height),
            seed: 0,
            lloyd_iterations: 50,
            lloyd_convergence: 0.0005,
            min_region_weight: 0.0,
        }
    }
}

fn validate_min_weight(min_weight: f64) -> Result<()> {
    if !(min_weight.is_finite() && min_weight >= 0.0) {
        return Err(VoronoiError::InvalidConfig(format!(
            "minimum region weight must be finite and >= 0 (got {})",
            min_weight
        )));
    }
    Ok(())
}

/// Builder for creating an EngineConfig with validation
///
/// # Example
///
/// ```rust
/// use rust_voronoi_stipple::*;
///
/// let config = EngineConfigBuilder::new()
///     .num_regions(2000)
///     .unwrap()
///     .max_chunk_size(512)
///     .unwrap()
///     .relocation(RelocationPolicy::BoundedStep { max_distance: 0.01 })
///     .unwrap()
///     .weighted(true)
///     .build()
///     .unwrap();
///
/// assert_eq!(config.max_chunk_size, 512);
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfigBuilder {
    seed: Option<u32>,
    num_regions: usize,
    image_width: usize,
    image_height: usize,
    max_chunk_size: usize,
    tile_size: usize,
    relocation: RelocationPolicy,
    weighted: bool,
    id_encoding: IdEncoding,
    domain: Option<Domain>,
    lloyd_iterations: usize,
    lloyd_convergence: f32,
    min_region_weight: f64,
}

impl EngineConfigBuilder {
    /// Create a new builder with default values
    ///
    /// Defaults:
    /// - seed: Random (generated from thread_rng)
    /// - num_regions: 1024
    /// - image size: 256x256
    /// - max_chunk_size: 1024, tile_size: 8
    /// - relocation: snap to centroid
    /// - weighted: false, id_encoding: integer
    /// - domain: `[-aspect, aspect] × [-1, 1]` of the image
    /// - lloyd_iterations: 50, lloyd_convergence: 0.0005
    /// - min_region_weight: 0.0
    pub fn new() -> Self {
        let defaults = EngineConfig::default();
        Self {
            seed: None,
            num_regions: defaults.num_regions,
            image_width: defaults.image_width,
            image_height: defaults.image_height,
            max_chunk_size: defaults.max_chunk_size,
            tile_size: defaults.tile_size,
            relocation: defaults.relocation,
            weighted: defaults.weighted,
            id_encoding: defaults.id_encoding,
            domain: None,
            lloyd_iterations: defaults.lloyd_iterations,
            lloyd_convergence: defaults.lloyd_convergence,
            min_region_weight: defaults.min_region_weight,
        }
    }

    /// Set the random seed for initial generator placement
    pub fn seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the number of generators / regions
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `count` is zero
    pub fn num_regions(mut self, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(VoronoiError::InvalidConfig(
                "number of regions must be > 0".to_string(),
            ));
        }
        self.num_regions = count;
        Ok(self)
    }

    /// Set the partition image resolution
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if either dimension is zero
    pub fn image_size(mut self, width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(VoronoiError::InvalidConfig(format!(
                "image dimensions must be positive (got {}x{})",
                width, height
            )));
        }
        self.image_width = width;
        self.image_height = height;
        Ok(self)
    }

    /// Set the maximum number of regions per aggregation chunk
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `size` is zero
    pub fn max_chunk_size(mut self, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(VoronoiError::InvalidConfig(
                "max chunk size must be > 0".to_string(),
            ));
        }
        self.max_chunk_size = size;
        Ok(self)
    }

    /// Set the condense tile edge in pixels
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `size` is zero
    pub fn tile_size(mut self, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(VoronoiError::InvalidConfig(
                "tile size must be > 0".to_string(),
            ));
        }
        self.tile_size = size;
        Ok(self)
    }

    /// Set the relocation policy
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a bounded step is not positive and finite
    pub fn relocation(mut self, policy: RelocationPolicy) -> Result<Self> {
        policy.validate()?;
        self.relocation = policy;
        Ok(self)
    }

    /// Weight pixels by an external density field
    pub fn weighted(mut self, weighted: bool) -> Self {
        self.weighted = weighted;
        self
    }

    /// Set the region id encoding
    ///
    /// The region count is checked against the encoding's budget in `build`.
    pub fn id_encoding(mut self, encoding: IdEncoding) -> Self {
        self.id_encoding = encoding;
        self
    }

    /// Override the world domain
    ///
    /// If not set, the domain follows the image aspect ratio.
    pub fn domain(mut self, domain: Domain) -> Self {
        self.domain = Some(domain);
        self
    }

    /// Set the maximum number of relaxation steps for `relax`
    pub fn lloyd_iterations(mut self, iterations: usize) -> Self {
        self.lloyd_iterations = iterations;
        self
    }

    /// Set the convergence threshold (fraction of the domain extent)
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if threshold is negative
    pub fn lloyd_convergence(mut self, threshold: f32) -> Result<Self> {
        if !(threshold >= 0.0) {
            return Err(VoronoiError::InvalidConfig(format!(
                "Lloyd convergence threshold must be >= 0 (got {})",
                threshold
            )));
        }
        self.lloyd_convergence = threshold;
        Ok(self)
    }

    /// Set the weight a region must exceed to move toward its centroid
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the weight is negative or non-finite
    pub fn min_region_weight(mut self, min_weight: f64) -> Result<Self> {
        validate_min_weight(min_weight)?;
        self.min_region_weight = min_weight;
        Ok(self)
    }

    /// Build the configuration
    ///
    /// If no seed was provided, generates a random seed using thread_rng.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the region count exceeds the id encoding's
    /// precision budget or the domain is degenerate.
    pub fn build(self) -> Result<EngineConfig> {
        let seed = self.seed.unwrap_or_else(rand::random);
        let domain = self
            .domain
            .unwrap_or_else(|| Domain::from_aspect(self.image_width, self.image_height));

        let config = EngineConfig {
            num_regions: self.num_regions,
            image_width: self.image_width,
            image_height: self.image_height,
            max_chunk_size: self.max_chunk_size,
            tile_size: self.tile_size,
            relocation: self.relocation,
            weighted: self.weighted,
            id_encoding: self.id_encoding,
            domain,
            seed,
            lloyd_iterations: self.lloyd_iterations,
            lloyd_convergence: self.lloyd_convergence,
            min_region_weight: self.min_region_weight,
        };
        config.validate()?;
        Ok(config)
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::ChannelFormat;

    #[test]
    fn test_builder_defaults() {
        let config = EngineConfigBuilder::new().build().unwrap();
        assert_eq!(config.num_regions, 1024);
        assert_eq!(config.image_width, 256);
        assert_eq!(config.max_chunk_size, 1024);
        assert_eq!(config.tile_size, 8);
        assert_eq!(config.relocation, RelocationPolicy::SnapToCentroid);
        assert!(!config.weighted);
        assert_eq!(config.id_encoding, IdEncoding::Integer);
        assert_eq!(config.domain, Domain::from_aspect(256, 256));
    }

    #[test]
    fn test_builder_custom() {
        let config = EngineConfigBuilder::new()
            .seed(42)
            .num_regions(3000)
            .unwrap()
            .image_size(640, 320)
            .unwrap()
            .max_chunk_size(2048)
            .unwrap()
            .tile_size(16)
            .unwrap()
            .lloyd_iterations(10)
            .build()
            .unwrap();

        assert_eq!(config.seed, 42);
        assert_eq!(config.num_regions, 3000);
        assert_eq!(config.pixel_count(), 640 * 320);
        assert_eq!(config.max_chunk_size, 2048);
        assert_eq!(config.tile_size, 16);
        assert_eq!(config.domain.max, Vec2::new(2.0, 1.0));
        assert_eq!(config.lloyd_options().max_iterations, 10);
    }

    #[test]
    fn test_builder_rejects_zero_values() {
        assert!(EngineConfigBuilder::new().num_regions(0).is_err());
        assert!(EngineConfigBuilder::new().image_size(0, 10).is_err());
        assert!(EngineConfigBuilder::new().image_size(10, 0).is_err());
        assert!(EngineConfigBuilder::new().max_chunk_size(0).is_err());
        assert!(EngineConfigBuilder::new().tile_size(0).is_err());
        assert!(EngineConfigBuilder::new().lloyd_convergence(-0.1).is_err());
        assert!(EngineConfigBuilder::new().min_region_weight(-1.0).is_err());
        assert!(EngineConfigBuilder::new().min_region_weight(f64::NAN).is_err());
    }

    #[test]
    fn test_encoding_budget() {
        let result = EngineConfigBuilder::new()
            .num_regions(300)
            .unwrap()
            .id_encoding(IdEncoding::NormalizedFloat(ChannelFormat::Unorm8))
            .build();
        assert!(matches!(result, Err(VoronoiError::InvalidConfig(_))));

        let result = EngineConfigBuilder::new()
            .num_regions(255)
            .unwrap()
            .id_encoding(IdEncoding::NormalizedFloat(ChannelFormat::Unorm8))
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_invalid_bounded_step() {
        let policy = RelocationPolicy::BoundedStep { max_distance: 0.0 };
        assert!(EngineConfigBuilder::new().relocation(policy).is_err());
        let policy = RelocationPolicy::BoundedStep { max_distance: f32::NAN };
        assert!(EngineConfigBuilder::new().relocation(policy).is_err());
    }

    #[test]
    fn test_validate_catches_edited_fields() {
        let mut config = EngineConfig::default();
        assert!(config.validate().is_ok());
        config.max_chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.domain = Domain { min: Vec2::ONE, max: Vec2::ZERO };
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.min_region_weight = -0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_move_towards() {
        let current = Vec2::new(0.0, 0.0);
        let target = Vec2::new(3.0, 4.0);
        assert_eq!(move_towards(current, target, 10.0), target);
        let stepped = move_towards(current, target, 1.0);
        assert!((stepped - Vec2::new(0.6, 0.8)).length() < 1e-6);
        assert_eq!(move_towards(target, target, 1.0), target);
    }

    #[test]
    fn test_relocate() {
        let current = Vec2::ZERO;
        let target = Vec2::new(0.0, 2.0);
        assert_eq!(RelocationPolicy::SnapToCentroid.relocate(current, target), target);
        let bounded = RelocationPolicy::BoundedStep { max_distance: 0.5 };
        assert_eq!(bounded.relocate(current, target), Vec2::new(0.0, 0.5));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_config_serialization() {
        let config = EngineConfigBuilder::new()
            .seed(12345)
            .relocation(RelocationPolicy::BoundedStep { max_distance: 0.02 })
            .unwrap()
            .build()
            .unwrap();

        let json = serde_json::to_string(&config).unwrap();
        let restored: EngineConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config, restored);
    }
}
