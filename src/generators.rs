//! Generator points and their initial placement
//!
//! Generators start uniformly scattered over the domain. Placement is driven
//! by a seeded ChaCha RNG, so the same seed always yields the same layout.

use glam::Vec2;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::partition::Domain;

/// A point whose region of influence is computed and relocated
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Generator {
    /// Region id owned by this generator (0 to num_regions-1)
    pub id: u32,
    /// Position in world coordinates
    pub position: Vec2,
}

impl Generator {
    /// Create a generator
    #[inline]
    pub fn new(id: u32, position: Vec2) -> Self {
        Self { id, position }
    }
}

/// Scatter `count` generators uniformly over `domain`
///
/// # Arguments
///
/// * `count` - Number of generators
/// * `domain` - World rectangle to fill
/// * `seed` - Random seed for deterministic placement
pub fn random_generators(count: usize, domain: &Domain, seed: u32) -> Vec<Generator> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed as u64);
    (0..count)
        .map(|i| {
            let x = rng.gen_range(domain.min.x..domain.max.x);
            let y = rng.gen_range(domain.min.y..domain.max.y);
            Generator::new(i as u32, Vec2::new(x, y))
        })
        .collect()
}

/// Wrap positions as generators with ids in order
pub fn generators_from_positions(positions: &[Vec2]) -> Vec<Generator> {
    positions
        .iter()
        .enumerate()
        .map(|(i, &position)| Generator::new(i as u32, position))
        .collect()
}
