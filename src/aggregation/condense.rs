//! Condense stage: per-tile partial sums for a chunk of regions

use std::ops::Range;

use rayon::prelude::*;

use super::PartialRecord;
use crate::partition::{Domain, PartitionImage};

/// Default tile edge in pixels (8×8 tiles)
pub const DEFAULT_TILE_SIZE: usize = 8;

/// Division of an image into square pixel tiles
///
/// Edge tiles are clipped to the image, so every pixel belongs to exactly
/// one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    /// Tile edge in pixels
    pub tile: usize,
    /// Number of tiles horizontally
    pub tiles_x: usize,
    /// Number of tiles vertically
    pub tiles_y: usize,
    width: usize,
    height: usize,
}

impl TileGrid {
    /// Tile a `width × height` image with `tile × tile` blocks
    pub fn new(tile: usize, width: usize, height: usize) -> Self {
        let tile = tile.max(1);
        Self {
            tile,
            tiles_x: width.div_ceil(tile),
            tiles_y: height.div_ceil(tile),
            width,
            height,
        }
    }

    /// Total number of tiles
    #[inline]
    pub fn tile_count(&self) -> usize {
        self.tiles_x * self.tiles_y
    }

    /// Pixel rectangle `(x0, y0, x1, y1)` of a tile, upper bounds exclusive
    #[inline]
    pub fn bounds(&self, index: usize) -> (usize, usize, usize, usize) {
        let tx = index % self.tiles_x;
        let ty = index / self.tiles_x;
        let x0 = tx * self.tile;
        let y0 = ty * self.tile;
        (
            x0,
            y0,
            (x0 + self.tile).min(self.width),
            (y0 + self.tile).min(self.height),
        )
    }
}

/// Dense `(region, tile)` buffer of partial records for one chunk
///
/// Records are stored tile-major: the records of tile `t` form one
/// contiguous row of `regions` entries. This lets the condense stage hand
/// each tile its own row and the reduce stage combine whole rows.
#[derive(Debug, Clone, Default)]
pub struct PartialBuffer {
    regions: usize,
    tiles: usize,
    live: usize,
    records: Vec<PartialRecord>,
}

impl PartialBuffer {
    /// Create a zeroed buffer for `regions × tiles` records
    pub fn new(regions: usize, tiles: usize) -> Self {
        let mut buffer = Self::default();
        buffer.reset(regions, tiles);
        buffer
    }

    /// Resize and zero the buffer, reusing its allocation when possible
    pub fn reset(&mut self, regions: usize, tiles: usize) {
        self.regions = regions;
        self.tiles = tiles;
        self.live = tiles;
        self.records.clear();
        self.records.resize(regions * tiles, PartialRecord::ZERO);
    }

    /// Number of regions in the chunk
    #[inline]
    pub fn regions(&self) -> usize {
        self.regions
    }

    /// Number of tile rows the buffer was sized for
    #[inline]
    pub fn tiles(&self) -> usize {
        self.tiles
    }

    /// Records allocated, including spare capacity from larger chunks
    #[inline]
    pub fn capacity(&self) -> usize {
        self.records.capacity()
    }

    /// Number of tile records per region still awaiting reduction
    #[inline]
    pub fn live(&self) -> usize {
        self.live
    }

    pub(super) fn set_live(&mut self, live: usize) {
        self.live = live;
    }

    /// Record of `region` (index within the chunk) for `tile`
    #[inline]
    pub fn get(&self, region: usize, tile: usize) -> PartialRecord {
        self.records[tile * self.regions + region]
    }

    /// Final per-region records once reduction has finished
    ///
    /// Before reduction this is just the first tile's row.
    #[inline]
    pub fn totals(&self) -> &[PartialRecord] {
        &self.records[..self.regions.min(self.records.len())]
    }

    pub(super) fn records_mut(&mut self) -> &mut [PartialRecord] {
        &mut self.records
    }
}

/// Data-parallel pass producing one partial record per `(region, tile)`
#[derive(Debug, Clone, Copy)]
pub struct CondenseStage {
    tile_size: usize,
    domain: Domain,
}

impl CondenseStage {
    /// Create a condense stage for the given tile edge and world domain
    pub fn new(tile_size: usize, domain: Domain) -> Self {
        Self {
            tile_size: tile_size.max(1),
            domain,
        }
    }

    /// Tile edge in pixels
    #[inline]
    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    /// Tile grid this stage uses for an image
    #[inline]
    pub fn grid(&self, image: &PartitionImage) -> TileGrid {
        TileGrid::new(self.tile_size, image.width(), image.height())
    }

    /// Accumulate the chunk `regions` of `image` into a fresh buffer
    pub fn run(&self, image: &PartitionImage, regions: Range<usize>) -> PartialBuffer {
        let mut buffer = PartialBuffer::default();
        self.run_into(image, regions, &mut buffer);
        buffer
    }

    /// Accumulate the chunk `regions` of `image` into `buffer`
    ///
    /// The buffer is resized to `regions.len() × tile_count` and overwritten.
    /// Each tile is one rayon task that owns its row exclusively, so no
    /// atomics are needed. Pixels whose id falls outside the chunk are
    /// skipped.
    pub fn run_into(&self, image: &PartitionImage, regions: Range<usize>, buffer: &mut PartialBuffer) {
        let grid = self.grid(image);
        let base = regions.start;
        let chunk_len = regions.len();
        buffer.reset(chunk_len, grid.tile_count());
        if chunk_len == 0 {
            return;
        }

        let (width, height) = (image.width(), image.height());
        let domain = self.domain;

        buffer
            .records_mut()
            .par_chunks_mut(chunk_len)
            .enumerate()
            .for_each(|(tile, row)| {
                let (x0, y0, x1, y1) = grid.bounds(tile);
                for y in y0..y1 {
                    for x in x0..x1 {
                        let (id, weight) = image.sample(x, y);
                        let slot = match (id as usize).checked_sub(base) {
                            Some(slot) if slot < chunk_len => slot,
                            _ => continue,
                        };
                        let position = domain.pixel_to_world(x, y, width, height);
                        row[slot].accumulate(position, weight);
                    }
                }
            });
    }
}
