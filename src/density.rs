//! Density fields used to weight partition pixels
//!
//! A flat density gives plain centroidal Voronoi relaxation. A sampled
//! density pulls generators toward heavy areas, which is what turns the
//! relaxation into weighted stippling: dark image regions attract more dots.

use glam::Vec2;

use crate::error::{Result, VoronoiError};

/// Luma coefficients (ITU-R BT.601)
const LUMA: [f32; 3] = [0.299, 0.587, 0.114];

/// Weight source sampled by the rasterizer for every pixel
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DensityField {
    /// Every pixel has weight 1
    #[default]
    Uniform,
    /// Row-major grid of non-negative weights, row 0 at `v = 0`
    /// (the domain's `min.y` edge)
    Sampled {
        /// Grid width in samples
        width: usize,
        /// Grid height in samples
        height: usize,
        /// `width * height` weights
        values: Vec<f32>,
    },
}

impl DensityField {
    /// Build a sampled density from raw weights
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the grid is empty, the buffer length is not
    /// `width * height`, or any weight is negative or non-finite.
    pub fn from_weights(width: usize, height: usize, values: Vec<f32>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(VoronoiError::InvalidConfig(format!(
                "density grid must be non-empty (got {}x{})",
                width, height
            )));
        }
        if values.len() != width * height {
            return Err(VoronoiError::InvalidConfig(format!(
                "density grid {}x{} needs {} values, got {}",
                width,
                height,
                width * height,
                values.len()
            )));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(VoronoiError::InvalidConfig(format!(
                "density weights must be finite and >= 0 (got {})",
                bad
            )));
        }
        Ok(DensityField::Sampled { width, height, values })
    }

    /// Build a density from 8-bit RGB pixels, dark pixels weighing most
    ///
    /// Each weight is `1 - luma`, so black is 1.0 and white is 0.0.
    /// `pixels` are in image order with the top row first; rows are flipped
    /// so the top of the picture lands at the domain's `max.y` edge.
    pub fn from_rgb(width: usize, height: usize, pixels: &[[u8; 3]]) -> Result<Self> {
        if width == 0 {
            return Self::from_weights(width, height, Vec::new());
        }
        let values = pixels
            .chunks(width)
            .rev()
            .flatten()
            .map(|&rgb| darkness(rgb))
            .collect();
        Self::from_weights(width, height, values)
    }

    /// Load an image file and convert it to a darkness density
    #[cfg(feature = "image")]
    pub fn from_image_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let image = image::open(path.as_ref())
            .map_err(|e| VoronoiError::ImageLoad(e.to_string()))?
            .to_rgb8();
        let (width, height) = (image.width() as usize, image.height() as usize);
        let pixels: Vec<[u8; 3]> = image.pixels().map(|p| p.0).collect();
        Self::from_rgb(width, height, &pixels)
    }

    /// Check whether this is the flat density
    #[inline]
    pub fn is_uniform(&self) -> bool {
        matches!(self, DensityField::Uniform)
    }

    /// Sample the density at normalized coordinates `uv` in `[0, 1]²`
    ///
    /// Uses nearest-sample lookup; coordinates outside the unit square clamp
    /// to the border.
    pub fn sample(&self, uv: Vec2) -> f32 {
        match self {
            DensityField::Uniform => 1.0,
            DensityField::Sampled { width, height, values } => {
                let x = ((uv.x * *width as f32) as isize).clamp(0, *width as isize - 1) as usize;
                let y = ((uv.y * *height as f32) as isize).clamp(0, *height as isize - 1) as usize;
                values[y * width + x]
            }
        }
    }
}

/// Darkness weight of an sRGB pixel
#[inline]
pub fn darkness(rgb: [u8; 3]) -> f32 {
    let luma: f32 = rgb
        .iter()
        .zip(LUMA.iter())
        .map(|(&c, &k)| c as f32 / 255.0 * k)
        .sum();
    (1.0 - luma).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_darkness() {
        assert!((darkness([0, 0, 0]) - 1.0).abs() < 1e-6);
        assert!(darkness([255, 255, 255]).abs() < 1e-6);
        assert!((darkness([255, 0, 0]) - (1.0 - 0.299)).abs() < 1e-6);
    }

    #[test]
    fn test_uniform_sample() {
        let density = DensityField::default();
        assert!(density.is_uniform());
        assert_eq!(density.sample(Vec2::new(0.3, 0.9)), 1.0);
    }

    #[test]
    fn test_nearest_sampling() {
        let density = DensityField::from_weights(2, 2, vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(density.sample(Vec2::new(0.1, 0.1)), 0.0);
        assert_eq!(density.sample(Vec2::new(0.9, 0.1)), 1.0);
        assert_eq!(density.sample(Vec2::new(0.1, 0.9)), 2.0);
        assert_eq!(density.sample(Vec2::new(1.0, 1.0)), 3.0);
        assert_eq!(density.sample(Vec2::new(-0.5, 2.0)), 2.0);
    }

    #[test]
    fn test_invalid_density() {
        assert!(DensityField::from_weights(2, 2, vec![1.0; 3]).is_err());
        assert!(DensityField::from_weights(0, 2, vec![]).is_err());
        assert!(DensityField::from_weights(1, 1, vec![-1.0]).is_err());
        assert!(DensityField::from_weights(1, 1, vec![f32::NAN]).is_err());
    }

    #[test]
    fn test_from_rgb() {
        let density = DensityField::from_rgb(2, 1, &[[0, 0, 0], [255, 255, 255]]).unwrap();
        assert!((density.sample(Vec2::new(0.2, 0.5)) - 1.0).abs() < 1e-6);
        assert!(density.sample(Vec2::new(0.8, 0.5)).abs() < 1e-6);
    }

    #[test]
    fn test_from_rgb_top_row_maps_to_max_y() {
        // Black top row, white bottom row.
        let density = DensityField::from_rgb(1, 2, &[[0, 0, 0], [255, 255, 255]]).unwrap();
        assert!((density.sample(Vec2::new(0.5, 0.9)) - 1.0).abs() < 1e-6);
        assert!(density.sample(Vec2::new(0.5, 0.1)).abs() < 1e-6);
        assert!(DensityField::from_rgb(2, 2, &[[0, 0, 0]; 3]).is_err());
        assert!(DensityField::from_rgb(0, 2, &[]).is_err());
    }
}
