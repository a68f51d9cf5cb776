//! Centroid finalization and the empty-region fallback

use glam::Vec2;

use super::PartialRecord;

/// Weighted centroid of one region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Centroid {
    /// Weighted mean position, or the previous generator position when the
    /// region had no weight
    pub position: Vec2,
    /// Sum of pixel weights in the region
    pub total_weight: f64,
    /// Region fell below the finalizer's minimum weight (or had a
    /// non-finite mean) and kept the previous position
    pub kept_previous: bool,
}

impl Centroid {
    /// Whether the region received no weight this iteration
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total_weight <= 0.0
    }
}

/// Converts reduced records into centroids
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CentroidFinalizer {
    /// Regions with `total_weight <= min_weight` keep their previous position
    pub min_weight: f64,
}

impl Default for CentroidFinalizer {
    fn default() -> Self {
        Self { min_weight: 0.0 }
    }
}

impl CentroidFinalizer {
    /// Finalize a single region
    ///
    /// Division is the only undefined operation in the pipeline, so the
    /// fallback lives here: a region without weight (or with a non-finite
    /// mean) is never moved to an undefined point.
    #[inline]
    pub fn finalize_one(&self, record: &PartialRecord, previous: Vec2) -> Centroid {
        let mean = if record.total_weight > self.min_weight {
            Some((record.weighted_sum / record.total_weight).as_vec2()).filter(|m| m.is_finite())
        } else {
            None
        };
        Centroid {
            position: mean.unwrap_or(previous),
            total_weight: record.total_weight,
            kept_previous: mean.is_none(),
        }
    }

    /// Finalize all regions into a new vector
    pub fn finalize(&self, records: &[PartialRecord], previous: &[Vec2]) -> Vec<Centroid> {
        records
            .iter()
            .zip(previous)
            .map(|(record, &prev)| self.finalize_one(record, prev))
            .collect()
    }
}

/// Stipple marker radius for every region, scaled by its share of weight
///
/// The heaviest region gets `0.01`, an empty one `0.002`.
pub fn stipple_radii(centroids: &[Centroid]) -> Vec<f32> {
    let max_weight = centroids
        .iter()
        .map(|c| c.total_weight)
        .fold(0.0f64, f64::max);
    centroids
        .iter()
        .map(|c| {
            let share = if max_weight > 0.0 {
                (c.total_weight / max_weight) as f32
            } else {
                0.0
            };
            share * 0.008 + 0.002
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_centroid() {
        // (0,0) with weight 2 and (2,0) with weight 1
        let mut record = PartialRecord::ZERO;
        record.accumulate(Vec2::new(0.0, 0.0), 2.0);
        record.accumulate(Vec2::new(2.0, 0.0), 1.0);

        let centroid = CentroidFinalizer::default().finalize_one(&record, Vec2::ZERO);
        assert!((centroid.position.x - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(centroid.position.y, 0.0);
        assert_eq!(centroid.total_weight, 3.0);
        assert!(!centroid.kept_previous);
    }

    #[test]
    fn test_empty_region_keeps_previous() {
        let previous = Vec2::new(0.25, -0.5);
        let centroid = CentroidFinalizer::default().finalize_one(&PartialRecord::ZERO, previous);
        assert_eq!(centroid.position, previous);
        assert!(centroid.is_empty());
        assert!(centroid.kept_previous);
    }

    #[test]
    fn test_min_weight_threshold() {
        let record = PartialRecord::from_pixel(Vec2::new(4.0, 4.0), 0.005);
        let finalizer = CentroidFinalizer { min_weight: 0.01 };
        let centroid = finalizer.finalize_one(&record, Vec2::ONE);
        assert_eq!(centroid.position, Vec2::ONE);
        assert!(!centroid.is_empty());
        assert!(centroid.kept_previous);
    }

    #[test]
    fn test_finalize_slices() {
        let records = [
            PartialRecord::from_pixel(Vec2::new(1.0, 2.0), 1.0),
            PartialRecord::ZERO,
        ];
        let previous = [Vec2::ZERO, Vec2::new(9.0, 9.0)];
        let out = CentroidFinalizer::default().finalize(&records, &previous);
        assert_eq!(out[0].position, Vec2::new(1.0, 2.0));
        assert_eq!(out[1].position, Vec2::new(9.0, 9.0));
        assert!(!out[0].kept_previous && out[1].kept_previous);
    }

    #[test]
    fn test_stipple_radii() {
        let centroid = |total_weight| Centroid { position: Vec2::ZERO, total_weight, kept_previous: false };
        let centroids = [centroid(4.0), centroid(2.0), centroid(0.0)];
        let radii = stipple_radii(&centroids);
        assert!((radii[0] - 0.01).abs() < 1e-6);
        assert!((radii[1] - 0.006).abs() < 1e-6);
        assert!((radii[2] - 0.002).abs() < 1e-6);
    }
}
