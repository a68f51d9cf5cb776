//! Raster centroidal Voronoi relaxation and weighted stippling
//!
//! Computes per-region weighted centroids of a partition image with a
//! tile-parallel condense/reduce pipeline, then runs Lloyd relaxation on top
//! of it. With a density field derived from an image, the relaxed generators
//! form a stipple drawing.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use rust_voronoi_stipple::*;
//!
//! let config = EngineConfigBuilder::new()
//!     .seed(42)
//!     .num_regions(2048).unwrap()
//!     .image_size(512, 512).unwrap()
//!     .weighted(true)
//!     .build().unwrap();
//!
//! let density = DensityField::from_weights(2, 1, vec![0.1, 1.0]).unwrap();
//! let rasterizer = NearestGeneratorRasterizer::from_config(&config);
//! let mut engine = PartitionEngine::initialize(config, rasterizer, Some(density)).unwrap();
//!
//! let summary = engine.relax().unwrap();
//! println!("{} iterations, converged={}", summary.iterations, summary.converged);
//!
//! for (generator, radius) in engine.generators().iter().zip(engine.stipple_radii()) {
//!     println!("{:?} {}", generator.position, radius);
//! }
//! ```
//!
//! # Features
//!
//! - `spatial-index` (default): KD-tree nearest-generator lookups in the reference rasterizer
//! - `serde`: Serialization support for configuration, domains and generators
//! - `image`: Build density fields from image files

// Modules
pub mod error;
pub mod config;
pub mod encoding;
pub mod partition;
pub mod density;
pub mod generators;
pub mod aggregation;
pub mod rasterizer;
pub mod lloyd;

#[cfg(feature = "spatial-index")]
pub mod spatial;

// Re-export core types for convenience
pub use error::{VoronoiError, Result};
pub use config::{EngineConfig, EngineConfigBuilder, RelocationPolicy, move_towards};
pub use encoding::{ChannelFormat, IdEncoding, encode_normalized, decode_normalized};
pub use partition::{Domain, PartitionImage};
pub use density::{DensityField, darkness};
pub use generators::{Generator, random_generators, generators_from_positions};
pub use aggregation::{Centroid, CentroidFinalizer, PartialRecord, RegionBatcher, stipple_radii};
pub use rasterizer::{Rasterizer, NearestGeneratorRasterizer};
pub use lloyd::{
    CancelToken, EngineState, LloydOptions, PartitionEngine, RunSummary, StepReport, centroid_energy,
    partition_energy,
};

#[cfg(feature = "spatial-index")]
pub use spatial::SpatialIndex;

// Re-export glam::Vec2 for convenience
pub use glam::Vec2;
