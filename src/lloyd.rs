//! Lloyd relaxation over raster partitions
//!
//! Each step rasterizes the partition of the current generators, aggregates
//! the weighted centroid of every region and moves each generator toward its
//! centroid. Repeating this drives the generators toward a centroidal Voronoi
//! tessellation; with a density field it produces weighted stippling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::Vec2;
use rayon::prelude::*;

use crate::aggregation::{stipple_radii, Centroid, CentroidFinalizer, RegionBatcher};
use crate::config::{EngineConfig, RelocationPolicy};
use crate::density::DensityField;
use crate::error::{Result, VoronoiError};
use crate::generators::{generators_from_positions, random_generators, Generator};
use crate::partition::{Domain, PartitionImage};
use crate::rasterizer::Rasterizer;

/// Options for the relaxation loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LloydOptions {
    /// Maximum number of iterations to run
    pub max_iterations: usize,
    /// Convergence threshold - stop when max displacement < this value
    /// times the domain extent. Set to 0.0 to disable early termination
    pub convergence_threshold: f32,
}

impl Default for LloydOptions {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            convergence_threshold: 0.0005,
        }
    }
}

/// Shared flag for cancelling a running relaxation between iterations
///
/// A step in flight always completes; a half-finished reduction has no
/// meaning, so cancellation only takes effect before the next step.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create an uncancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Where the engine currently is in its step cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Ready for the next step
    Idle,
    /// Waiting on the rasterizer
    Rasterizing,
    /// Running condense, reduce and finalize
    Aggregating,
    /// Moving generators
    Relocating,
    /// Buffers released; the engine can no longer step
    Disposed,
}

/// Outcome of one relaxation step
#[derive(Debug, Clone)]
pub struct StepReport {
    /// 1-based index of this step
    pub iteration: usize,
    /// Centroid of every region, computed from the pre-step positions
    pub centroids: Vec<Centroid>,
    /// Largest distance any generator moved
    pub max_displacement: f32,
    /// Σ |generator - centroid|² before the move
    pub centroid_energy: f64,
    /// Regions at or below the minimum weight that kept their position
    pub empty_regions: usize,
    /// Time spent in the rasterizer
    pub rasterize_time: Duration,
    /// Time spent aggregating centroids
    pub aggregate_time: Duration,
}

/// Summary of a multi-step relaxation run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    /// Steps actually run
    pub iterations: usize,
    /// Stopped because displacement fell below the threshold
    pub converged: bool,
    /// Stopped because the cancel token was set
    pub cancelled: bool,
    /// Max displacement of the last step (0 if none ran)
    pub last_max_displacement: f32,
    /// Wall time of the run
    pub elapsed: Duration,
}

/// Raster Lloyd relaxation engine
///
/// Owns the generators, the density field, the rasterizer and every
/// aggregation buffer. Generator positions only change in the relocation
/// phase of [`step`](Self::step), after all aggregation for that step is done.
///
/// # Example
///
/// ```
/// use rust_voronoi_stipple::*;
///
/// let config = EngineConfigBuilder::new()
///     .seed(7)
///     .num_regions(64)
///     .unwrap()
///     .image_size(96, 64)
///     .unwrap()
///     .build()
///     .unwrap();
///
/// let rasterizer = NearestGeneratorRasterizer::from_config(&config);
/// let mut engine = PartitionEngine::initialize(config, rasterizer, None).unwrap();
///
/// let report = engine.step().unwrap();
/// assert_eq!(report.centroids.len(), 64);
///
/// let summary = engine.run(LloydOptions { max_iterations: 5, convergence_threshold: 0.0 }, None).unwrap();
/// assert_eq!(summary.iterations, 5);
/// ```
pub struct PartitionEngine<R> {
    config: EngineConfig,
    rasterizer: R,
    density: DensityField,
    generators: Vec<Generator>,
    centroids: Vec<Centroid>,
    batcher: RegionBatcher,
    state: EngineState,
    iteration: usize,
}

impl<R: Rasterizer> PartitionEngine<R> {
    /// Create an engine with generators scattered randomly over the domain
    ///
    /// # Arguments
    ///
    /// * `config` - Validated engine configuration
    /// * `rasterizer` - Backend producing partition images
    /// * `density` - Weight source; required when `config.weighted` is set
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an invalid configuration or a missing
    /// density, and `UnsupportedCapability` if the rasterizer cannot deliver
    /// the configured id encoding.
    pub fn initialize(config: EngineConfig, rasterizer: R, density: Option<DensityField>) -> Result<Self> {
        config.validate()?;
        let generators = random_generators(config.num_regions, &config.domain, config.seed);
        Self::build(config, rasterizer, density, generators)
    }

    /// Create an engine with explicit starting positions
    ///
    /// # Errors
    ///
    /// As [`initialize`](Self::initialize), plus `InvalidConfig` when the
    /// number of positions differs from `config.num_regions`.
    pub fn with_positions(
        config: EngineConfig,
        rasterizer: R,
        density: Option<DensityField>,
        positions: &[Vec2],
    ) -> Result<Self> {
        config.validate()?;
        if positions.len() != config.num_regions {
            return Err(VoronoiError::InvalidConfig(format!(
                "expected {} generator positions, got {}",
                config.num_regions,
                positions.len()
            )));
        }
        Self::build(config, rasterizer, density, generators_from_positions(positions))
    }

    fn build(
        config: EngineConfig,
        rasterizer: R,
        density: Option<DensityField>,
        generators: Vec<Generator>,
    ) -> Result<Self> {
        if !rasterizer.supports(config.id_encoding) {
            return Err(VoronoiError::UnsupportedCapability(format!(
                "rasterizer cannot deliver region ids as {:?}",
                config.id_encoding
            )));
        }

        let density = match (config.weighted, density) {
            (true, Some(density)) => density,
            (true, None) => {
                return Err(VoronoiError::InvalidConfig(
                    "weighted mode requires a density field".to_string(),
                ))
            }
            (false, Some(_)) => {
                log::warn!("density field ignored because weighted mode is off");
                DensityField::Uniform
            }
            (false, None) => DensityField::Uniform,
        };

        let batcher = RegionBatcher::new(config.max_chunk_size, config.tile_size, config.domain)?
            .with_finalizer(CentroidFinalizer { min_weight: config.min_region_weight });
        let centroids = generators
            .iter()
            .map(|g| Centroid { position: g.position, total_weight: 0.0, kept_previous: true })
            .collect();

        log::info!(
            "partition engine: {} regions, {}x{} image, chunk {}, tile {}, weighted={}",
            config.num_regions,
            config.image_width,
            config.image_height,
            config.max_chunk_size,
            config.tile_size,
            config.weighted
        );

        Ok(Self {
            config,
            rasterizer,
            density,
            generators,
            centroids,
            batcher,
            state: EngineState::Idle,
            iteration: 0,
        })
    }

    /// Run one relaxation step with the configured relocation policy
    pub fn step(&mut self) -> Result<StepReport> {
        self.step_with(self.config.relocation)
    }

    /// Run one step, moving each generator at most `max_distance`
    pub fn step_bounded(&mut self, max_distance: f32) -> Result<StepReport> {
        self.step_with(RelocationPolicy::BoundedStep { max_distance })
    }

    /// Run one relaxation step with an explicit relocation policy
    ///
    /// Rasterizes the current generators, aggregates centroids and moves the
    /// generators. Regions without weight keep their position.
    ///
    /// # Errors
    ///
    /// Returns `EngineDisposed` after [`dispose`](Self::dispose), and
    /// propagates rasterizer errors and partition validation failures
    /// (`PartitionMismatch`, `RegionOutOfRange`). Generators are untouched
    /// when a step fails.
    pub fn step_with(&mut self, policy: RelocationPolicy) -> Result<StepReport> {
        if self.state == EngineState::Disposed {
            return Err(VoronoiError::EngineDisposed);
        }
        let result = self.step_inner(policy);
        self.state = EngineState::Idle;
        result
    }

    fn step_inner(&mut self, policy: RelocationPolicy) -> Result<StepReport> {
        self.state = EngineState::Rasterizing;
        let raster_start = Instant::now();
        let image = self
            .rasterizer
            .produce_partition(&self.generators, &self.density)?;
        self.check_partition(&image)?;
        let rasterize_time = raster_start.elapsed();

        self.state = EngineState::Aggregating;
        let aggregate_start = Instant::now();
        let previous = self.positions();
        let centroids = self.batcher.aggregate(&image, &previous);
        let aggregate_time = aggregate_start.elapsed();

        self.state = EngineState::Relocating;
        let centroid_energy = centroid_energy(&previous, &centroids);
        let mut max_displacement: f32 = 0.0;
        let mut empty_regions = 0;
        for (generator, centroid) in self.generators.iter_mut().zip(&centroids) {
            if centroid.kept_previous {
                empty_regions += 1;
            }
            let next = policy.relocate(generator.position, centroid.position);
            max_displacement = max_displacement.max(next.distance(generator.position));
            generator.position = next;
        }
        self.centroids.clone_from(&centroids);
        self.iteration += 1;

        if empty_regions > 0 {
            log::warn!(
                "step {}: {} regions received too little weight and kept their position",
                self.iteration,
                empty_regions
            );
        }
        log::debug!(
            "step {}: rasterize={:?}, aggregate={:?}, max_disp={:.6}, energy={:.6}",
            self.iteration,
            rasterize_time,
            aggregate_time,
            max_displacement,
            centroid_energy
        );

        Ok(StepReport {
            iteration: self.iteration,
            centroids,
            max_displacement,
            centroid_energy,
            empty_regions,
            rasterize_time,
            aggregate_time,
        })
    }

    fn check_partition(&self, image: &PartitionImage) -> Result<()> {
        if image.width() != self.config.image_width || image.height() != self.config.image_height {
            return Err(VoronoiError::PartitionMismatch(format!(
                "rasterizer produced {}x{}, expected {}x{}",
                image.width(),
                image.height(),
                self.config.image_width,
                self.config.image_height
            )));
        }
        image.validate(self.config.num_regions)
    }

    /// Relax with the iteration limit and threshold from the configuration
    pub fn relax(&mut self) -> Result<RunSummary> {
        self.run(self.config.lloyd_options(), None)
    }

    /// Step repeatedly until converged, out of iterations or cancelled
    ///
    /// The convergence threshold is relative to the domain extent: the run
    /// stops once no generator moved more than
    /// `convergence_threshold * domain.extent()` in a step.
    pub fn run(&mut self, options: LloydOptions, cancel: Option<&CancelToken>) -> Result<RunSummary> {
        let threshold = options.convergence_threshold * self.config.domain.extent();
        let start = Instant::now();

        log::info!(
            "Lloyd relaxation starting: {} generators, max {} iterations, threshold {:.6} (abs: {:.6})",
            self.generators.len(),
            options.max_iterations,
            options.convergence_threshold,
            threshold
        );

        let mut summary = RunSummary {
            iterations: 0,
            converged: false,
            cancelled: false,
            last_max_displacement: 0.0,
            elapsed: Duration::ZERO,
        };

        for _ in 0..options.max_iterations {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                summary.cancelled = true;
                log::info!("Lloyd relaxation cancelled after {} iterations", summary.iterations);
                break;
            }

            let report = self.step()?;
            summary.iterations += 1;
            summary.last_max_displacement = report.max_displacement;

            if threshold > 0.0 && report.max_displacement < threshold {
                summary.converged = true;
                log::info!(
                    "Lloyd relaxation converged at iteration {} (max_disp {:.6} < threshold {:.6})",
                    summary.iterations,
                    report.max_displacement,
                    threshold
                );
                break;
            }
        }

        summary.elapsed = start.elapsed();
        log::info!(
            "Lloyd relaxation finished: {} iterations (of max {}), converged={}, total={:?}",
            summary.iterations,
            options.max_iterations,
            summary.converged,
            summary.elapsed
        );
        Ok(summary)
    }

    /// Release buffers; every later step fails with `EngineDisposed`
    pub fn dispose(&mut self) {
        self.batcher.release();
        self.centroids = Vec::new();
        self.state = EngineState::Disposed;
    }

    /// Current state of the step cycle
    #[inline]
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Number of completed steps
    #[inline]
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Engine configuration
    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current generators
    #[inline]
    pub fn generators(&self) -> &[Generator] {
        &self.generators
    }

    /// Current generator positions
    pub fn positions(&self) -> Vec<Vec2> {
        self.generators.iter().map(|g| g.position).collect()
    }

    /// Centroids computed by the latest step
    ///
    /// Before the first step every centroid sits on its generator with zero
    /// weight.
    #[inline]
    pub fn centroids(&self) -> &[Centroid] {
        &self.centroids
    }

    /// Stipple marker radius per region from the latest step
    pub fn stipple_radii(&self) -> Vec<f32> {
        stipple_radii(&self.centroids)
    }

    /// Density field used to weight pixels
    #[inline]
    pub fn density(&self) -> &DensityField {
        &self.density
    }

    /// Rasterizer backend
    #[inline]
    pub fn rasterizer(&self) -> &R {
        &self.rasterizer
    }

    /// Centroid aggregator and its retained buffer
    #[inline]
    pub fn batcher(&self) -> &RegionBatcher {
        &self.batcher
    }
}

/// Σ |position - centroid|² over all regions
pub fn centroid_energy(positions: &[Vec2], centroids: &[Centroid]) -> f64 {
    positions
        .iter()
        .zip(centroids)
        .map(|(p, c)| p.as_dvec2().distance_squared(c.position.as_dvec2()))
        .sum()
}

/// Discrete CVT energy Σ weight · |pixel - owner|² of a partition
///
/// Lloyd steps never increase this quantity when the partition assigns each
/// pixel to its nearest generator.
pub fn partition_energy(image: &PartitionImage, domain: &Domain, positions: &[Vec2]) -> f64 {
    let (width, height) = (image.width(), image.height());
    (0..height)
        .into_par_iter()
        .map(|y| {
            let mut sum = 0.0f64;
            for x in 0..width {
                let (id, weight) = image.sample(x, y);
                if let Some(owner) = positions.get(id as usize) {
                    let pixel = domain.pixel_to_world(x, y, width, height);
                    sum += weight as f64 * pixel.as_dvec2().distance_squared(owner.as_dvec2());
                }
            }
            sum
        })
        .sum()
}
