//! Error types for partition aggregation and relaxation

use std::fmt;

/// Errors that can occur while configuring or stepping a partition engine
#[derive(Debug, Clone, PartialEq)]
pub enum VoronoiError {
    /// Configuration validation failed
    InvalidConfig(String),
    /// The rasterizer cannot produce the pixel format the configuration needs
    UnsupportedCapability(String),
    /// A partition image or buffer disagrees with the configured sizes
    PartitionMismatch(String),
    /// A pixel carries a region id outside `[0, num_regions)`
    RegionOutOfRange {
        /// Offending region id
        region: u32,
        /// Configured region count
        num_regions: usize,
    },
    /// The engine was used after `dispose()`
    EngineDisposed,
    /// Loading a density image failed
    #[cfg(feature = "image")]
    ImageLoad(String),
}

impl fmt::Display for VoronoiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoronoiError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            VoronoiError::UnsupportedCapability(msg) => write!(f, "unsupported capability: {}", msg),
            VoronoiError::PartitionMismatch(msg) => write!(f, "partition mismatch: {}", msg),
            VoronoiError::RegionOutOfRange { region, num_regions } => write!(
                f,
                "region id {} out of range (num_regions = {})",
                region, num_regions
            ),
            VoronoiError::EngineDisposed => write!(f, "engine has been disposed"),
            #[cfg(feature = "image")]
            VoronoiError::ImageLoad(msg) => write!(f, "failed to load image: {}", msg),
        }
    }
}

impl std::error::Error for VoronoiError {}

/// Result type alias for partition engine operations
pub type Result<T> = std::result::Result<T, VoronoiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = VoronoiError::InvalidConfig("chunk size must be > 0".into());
        assert_eq!(err.to_string(), "invalid configuration: chunk size must be > 0");

        let err = VoronoiError::RegionOutOfRange { region: 12, num_regions: 10 };
        assert_eq!(err.to_string(), "region id 12 out of range (num_regions = 10)");
    }
}
