//! Reduce stage: tree reduction of per-tile records
//!
//! Pass `k` combines tile rows at distance `2^k` in place: row `i` (a
//! multiple of `2^(k+1)`) absorbs row `i + 2^k` when it exists. An unmatched
//! trailing row is carried unchanged, so each pass leaves `ceil(n / 2)` live
//! rows and `ceil(log2 M)` passes collapse `M` tiles into row 0. Total work
//! over all passes is `O(M)`.

use rayon::prelude::*;

use super::condense::PartialBuffer;

/// Hierarchical pairwise reduction of a [`PartialBuffer`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ReduceStage;

impl ReduceStage {
    /// Number of passes needed to reduce `tiles` records to one
    pub fn pass_count(tiles: usize) -> usize {
        if tiles <= 1 {
            0
        } else {
            (usize::BITS - (tiles - 1).leading_zeros()) as usize
        }
    }

    /// Run one reduction pass with the given stride (in tile rows)
    ///
    /// Every pass is a barrier: it reads only rows written by the previous
    /// pass, and the rayon call returns once all pairs are combined.
    pub fn pass(buffer: &mut PartialBuffer, stride: usize) {
        let regions = buffer.regions();
        if regions == 0 || stride == 0 {
            return;
        }
        let half = stride * regions;
        let live = buffer.live();

        buffer
            .records_mut()
            .par_chunks_mut(2 * half)
            .for_each(|group| {
                if group.len() > half {
                    let (head, tail) = group.split_at_mut(half);
                    for (dst, src) in head[..regions].iter_mut().zip(&tail[..regions]) {
                        *dst = dst.combine(src);
                    }
                }
            });

        buffer.set_live(live.div_ceil(2));
    }

    /// Reduce the buffer until one record per region remains
    ///
    /// Returns the number of passes run. Afterwards
    /// [`PartialBuffer::totals`] holds the final record of every region.
    pub fn run(buffer: &mut PartialBuffer) -> usize {
        let passes = Self::pass_count(buffer.tiles());
        let mut stride = 1;
        for _ in 0..passes {
            Self::pass(buffer, stride);
            stride *= 2;
        }
        passes
    }
}
