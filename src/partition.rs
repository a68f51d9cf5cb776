//! Partition images and the world-space domain they cover
//!
//! A partition image tags every pixel with the id of the region that owns it
//! and a non-negative weight. It is produced fresh each iteration by a
//! [`Rasterizer`](crate::rasterizer::Rasterizer) and is read-only to the
//! aggregation stages.

use glam::Vec2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::encoding::{decode_normalized, ChannelFormat};
use crate::error::{Result, VoronoiError};

/// Axis-aligned world-space rectangle covered by a partition image
///
/// Pixel centres are spread evenly across the rectangle: pixel `(x, y)` of a
/// `width × height` image sits at `min + (p + 0.5) * (max - min) / size`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Domain {
    /// Lower-left corner
    pub min: Vec2,
    /// Upper-right corner
    pub max: Vec2,
}

impl Domain {
    /// Create a domain from its corners
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` unless `min < max` on both axes and all
    /// coordinates are finite.
    pub fn new(min: Vec2, max: Vec2) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() || min.x >= max.x || min.y >= max.y {
            return Err(VoronoiError::InvalidConfig(format!(
                "domain must satisfy min < max (got min {:?}, max {:?})",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    /// Domain `[-aspect, aspect] × [-1, 1]` matching an image's aspect ratio
    pub fn from_aspect(width: usize, height: usize) -> Self {
        let aspect = if height == 0 { 1.0 } else { width as f32 / height as f32 };
        Self {
            min: Vec2::new(-aspect, -1.0),
            max: Vec2::new(aspect, 1.0),
        }
    }

    /// Domain in which world coordinates equal pixel indices
    pub fn pixel_grid(width: usize, height: usize) -> Self {
        Self {
            min: Vec2::splat(-0.5),
            max: Vec2::new(width as f32 - 0.5, height as f32 - 0.5),
        }
    }

    /// Width and height of the domain
    #[inline]
    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    /// Longest side, used to scale displacement thresholds
    #[inline]
    pub fn extent(&self) -> f32 {
        self.size().max_element()
    }

    /// Centre of the domain
    #[inline]
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Check whether a point lies inside the domain (inclusive)
    #[inline]
    pub fn contains(&self, point: Vec2) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// World position of the centre of pixel `(x, y)`
    #[inline]
    pub fn pixel_to_world(&self, x: usize, y: usize, width: usize, height: usize) -> Vec2 {
        let cell = self.size() / Vec2::new(width as f32, height as f32);
        self.min + (Vec2::new(x as f32, y as f32) + 0.5) * cell
    }

    /// Normalized `[0, 1]` coordinates of a world point
    #[inline]
    pub fn normalize(&self, point: Vec2) -> Vec2 {
        (point - self.min) / self.size()
    }
}

/// Raster grid of `(region id, weight)` samples
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionImage {
    width: usize,
    height: usize,
    ids: Vec<u32>,
    weights: Vec<f32>,
}

impl PartitionImage {
    /// Create a partition image from row-major id and weight buffers
    ///
    /// # Errors
    ///
    /// Returns `PartitionMismatch` if either buffer is not `width * height` long
    /// or the image is empty.
    pub fn new(width: usize, height: usize, ids: Vec<u32>, weights: Vec<f32>) -> Result<Self> {
        let len = width * height;
        if len == 0 {
            return Err(VoronoiError::PartitionMismatch(format!(
                "partition image must be non-empty (got {}x{})",
                width, height
            )));
        }
        if ids.len() != len || weights.len() != len {
            return Err(VoronoiError::PartitionMismatch(format!(
                "expected {} samples for {}x{}, got {} ids and {} weights",
                len,
                width,
                height,
                ids.len(),
                weights.len()
            )));
        }
        Ok(Self { width, height, ids, weights })
    }

    /// Create a partition image where every pixel has weight 1
    pub fn uniform(width: usize, height: usize, ids: Vec<u32>) -> Result<Self> {
        let weights = vec![1.0; ids.len()];
        Self::new(width, height, ids, weights)
    }

    /// Build a partition image by evaluating `sample(x, y)` for every pixel
    pub fn from_fn<F>(width: usize, height: usize, mut sample: F) -> Result<Self>
    where
        F: FnMut(usize, usize) -> (u32, f32),
    {
        let mut ids = Vec::with_capacity(width * height);
        let mut weights = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let (id, weight) = sample(x, y);
                ids.push(id);
                weights.push(weight);
            }
        }
        Self::new(width, height, ids, weights)
    }

    /// Decode a normalized float id channel into a partition image
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` when `num_regions` exceeds the format's budget,
    /// `PartitionMismatch` on inconsistent buffer sizes or invalid weights,
    /// and `RegionOutOfRange` when a channel value is non-finite or decodes
    /// outside `[0, num_regions)`.
    pub fn from_encoded(
        width: usize,
        height: usize,
        channel: &[f32],
        weights: Vec<f32>,
        num_regions: usize,
        format: ChannelFormat,
    ) -> Result<Self> {
        if num_regions > format.max_regions() {
            return Err(VoronoiError::InvalidConfig(format!(
                "{} regions exceed the {} id budget of {}",
                num_regions,
                format.name(),
                format.max_regions()
            )));
        }
        let ids = channel
            .iter()
            .map(|&value| decode_normalized(value, num_regions))
            .collect();
        let image = Self::new(width, height, ids, weights)?;
        image.validate(num_regions)?;
        Ok(image)
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

    /// Total number of pixels
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.ids.len()
    }

    /// Region id and weight of pixel `(x, y)`
    ///
    /// # Panics
    ///
    /// Panics if the coordinates lie outside the image.
    #[inline]
    pub fn sample(&self, x: usize, y: usize) -> (u32, f32) {
        let index = y * self.width + x;
        (self.ids[index], self.weights[index])
    }

    /// Row-major region ids
    #[inline]
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// Row-major pixel weights
    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Count the pixels owned by each region
    ///
    /// Ids outside `[0, num_regions)` are not counted.
    pub fn region_pixel_counts(&self, num_regions: usize) -> Vec<usize> {
        let mut counts = vec![0usize; num_regions];
        for &id in &self.ids {
            if let Some(count) = counts.get_mut(id as usize) {
                *count += 1;
            }
        }
        counts
    }

    /// Check the partition invariant against a region count
    ///
    /// # Errors
    ///
    /// Returns `RegionOutOfRange` for the first id outside `[0, num_regions)`
    /// and `PartitionMismatch` for a negative or non-finite weight.
    pub fn validate(&self, num_regions: usize) -> Result<()> {
        if let Some(&region) = self.ids.iter().find(|&&id| id as usize >= num_regions) {
            return Err(VoronoiError::RegionOutOfRange { region, num_regions });
        }
        if let Some(index) = self.weights.iter().position(|w| !w.is_finite() || *w < 0.0) {
            return Err(VoronoiError::PartitionMismatch(format!(
                "pixel ({}, {}) has invalid weight {}",
                index % self.width,
                index / self.width,
                self.weights[index]
            )));
        }
        Ok(())
    }
}
