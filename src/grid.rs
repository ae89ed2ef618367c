// Pingpong Diffusion - GPU Density Diffusion Sandbox
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! Fixed N×N grid geometry and the tile partition used for dispatch.

/// Grid side length (must match shader uniform `grid_size`).
pub const GRID_SIZE: u32 = 64;
/// Compute workgroup edge (must match `@workgroup_size` in diffuse.wgsl).
pub const WORKGROUP_SIZE: u32 = 8;

/// Integer cell coordinate, `x` along a row and `y` down the rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellCoord {
    pub x: u32,
    pub y: u32,
}

impl CellCoord {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Immutable square grid dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    size: u32,
}

impl Default for Grid {
    fn default() -> Self {
        Self::new(GRID_SIZE)
    }
}

impl Grid {
    /// A grid of `size × size` cells. A zero size is bumped to 1.
    pub fn new(size: u32) -> Self {
        Self { size: size.max(1) }
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        (self.size as usize) * (self.size as usize)
    }

    #[inline]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.size as i64 && y < self.size as i64
    }

    /// Row-major linear index, `None` outside the grid.
    #[inline]
    pub fn index(&self, coord: CellCoord) -> Option<usize> {
        if coord.x < self.size && coord.y < self.size {
            Some(coord.y as usize * self.size as usize + coord.x as usize)
        } else {
            None
        }
    }

    /// Workgroups needed along one axis: `ceil(N / tile)`.
    #[inline]
    pub fn workgroups(&self, tile: u32) -> u32 {
        let tile = tile.max(1);
        (self.size + tile - 1) / tile
    }

    /// Tiles of workgroup row `row`, left to right. Rows `0..workgroups(tile)`
    /// cover the grid exactly once; the last tile on each axis is clipped
    /// when `N` is not a multiple of `tile`.
    pub fn tile_row(&self, tile: u32, row: u32) -> impl Iterator<Item = Tile> + '_ {
        let tile = tile.max(1);
        let y0 = row * tile;
        let y1 = (y0 + tile).min(self.size);
        (0..self.workgroups(tile)).map(move |tx| {
            let x0 = tx * tile;
            Tile {
                x0,
                y0,
                x1: (x0 + tile).min(self.size),
                y1,
            }
        })
    }
}

/// Half-open cell rectangle `[x0, x1) × [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}
