// Pingpong Diffusion - GPU Density Diffusion Sandbox
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! CPU reference of the density diffusion pass (mirrors shaders/diffuse.wgsl).
//!
//! Each output cell is the mean of its four axis-aligned neighbours in the
//! read buffer. Neighbours outside the grid sample as zero (open edge).

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::field::{FieldState, Roles};
use crate::grid::Grid;

/// Divisor applied to the four neighbour samples.
///
/// `Constant` always divides by 4 even on border cells, so edges drain toward
/// zero faster than the interior. That bias is how the simulation was built;
/// `NeighborCount` divides by the number of in-bounds neighbours instead and
/// is opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EdgeDivisor {
    #[default]
    Constant,
    NeighborCount,
}

impl EdgeDivisor {
    /// Value of the `edge_mode` uniform in diffuse.wgsl.
    pub fn shader_code(self) -> u32 {
        match self {
            EdgeDivisor::Constant => 0,
            EdgeDivisor::NeighborCount => 1,
        }
    }
}

/// Next density of the cell at `(x, y)`.
#[inline]
pub fn diffuse_cell(grid: &Grid, input: &[f32], x: u32, y: u32, divisor: EdgeDivisor) -> f32 {
    let n = grid.size() as i64;
    let (x, y) = (x as i64, y as i64);
    let mut sum = 0.0f32;
    let mut count = 0u32;
    for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
        let (nx, ny) = (x + dx, y + dy);
        if grid.contains(nx, ny) {
            sum += input[(ny * n + nx) as usize];
            count += 1;
        }
    }
    match divisor {
        EdgeDivisor::Constant => sum / 4.0,
        EdgeDivisor::NeighborCount if count > 0 => sum / count as f32,
        EdgeDivisor::NeighborCount => 0.0,
    }
}

/// One full pass `input -> output`, dispatched tile by tile over
/// [`Grid::tile_row`].
///
/// Each row of tiles owns a disjoint band of `output`, so rows run in
/// parallel with the `parallel` feature. `input` is never written.
pub fn diffuse(grid: &Grid, input: &[f32], output: &mut [f32], tile: u32, divisor: EdgeDivisor) {
    let n = grid.size() as usize;
    debug_assert_eq!(input.len(), grid.cell_count(), "read buffer size mismatch");
    debug_assert_eq!(output.len(), grid.cell_count(), "write buffer size mismatch");

    let tile = tile.max(1);
    let band_len = tile as usize * n;

    let run_row = |(row, band): (usize, &mut [f32])| {
        for t in grid.tile_row(tile, row as u32) {
            for y in t.y0..t.y1 {
                let base = (y - t.y0) as usize * n;
                for x in t.x0..t.x1 {
                    band[base + x as usize] = diffuse_cell(grid, input, x, y, divisor);
                }
            }
        }
    };

    #[cfg(feature = "parallel")]
    output.par_chunks_mut(band_len).enumerate().for_each(run_row);

    #[cfg(not(feature = "parallel"))]
    output.chunks_mut(band_len).enumerate().for_each(run_row);
}

/// Diffuse density from `roles.read` into `roles.write`. Velocity is untouched.
pub fn step(state: &mut FieldState, roles: Roles, tile: u32, divisor: EdgeDivisor) {
    let grid = state.grid();
    let (input, output) = state.density.split(roles);
    diffuse(&grid, input, output, tile, divisor);
}

/// Sum of all cells, accumulated in f64.
pub fn total(field: &[f32]) -> f64 {
    field.iter().map(|&v| v as f64).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{select_roles, Slot};
    use crate::grid::CellCoord;

    fn corner_seeded() -> FieldState {
        let mut seed = vec![0.0; 16];
        seed[0] = 1.0;
        FieldState::seeded(Grid::new(4), seed)
    }

    #[test]
    fn neighbours_of_seeded_corner_get_a_quarter() {
        let mut state = corner_seeded();
        step(&mut state, select_roles(0), 8, EdgeDivisor::Constant);

        let at = |x, y| state.density_at(Slot::B, CellCoord::new(x, y)).unwrap();
        assert_eq!(at(1, 0), 0.25);
        assert_eq!(at(0, 1), 0.25);
        // Diagonal is not part of the 4-neighbour stencil.
        assert_eq!(at(1, 1), 0.0);
        assert_eq!(at(0, 0), 0.0);
        // Read buffer is untouched.
        assert_eq!(state.density.get(Slot::A)[0], 1.0);
    }

    #[test]
    fn interior_cell_is_unweighted_mean() {
        let grid = Grid::new(4);
        let mut input = vec![0.0; 16];
        input[grid.index(CellCoord::new(1, 2)).unwrap()] = 0.2;
        input[grid.index(CellCoord::new(3, 2)).unwrap()] = 0.4;
        input[grid.index(CellCoord::new(2, 1)).unwrap()] = 0.6;
        input[grid.index(CellCoord::new(2, 3)).unwrap()] = 0.8;
        let v = diffuse_cell(&grid, &input, 2, 2, EdgeDivisor::Constant);
        assert!((v - 0.5).abs() < 1e-6);
        let v = diffuse_cell(&grid, &input, 2, 2, EdgeDivisor::NeighborCount);
        assert!((v - 0.5).abs() < 1e-6);
    }

    #[test]
    fn corner_divides_by_four_not_by_neighbour_count() {
        let grid = Grid::new(4);
        let mut input = vec![0.0; 16];
        input[grid.index(CellCoord::new(1, 0)).unwrap()] = 1.0;

        // (0,0) has two in-bounds neighbours; only one is set.
        assert_eq!(diffuse_cell(&grid, &input, 0, 0, EdgeDivisor::Constant), 0.25);
        assert_eq!(diffuse_cell(&grid, &input, 0, 0, EdgeDivisor::NeighborCount), 0.5);
    }

    #[test]
    fn uniform_field_leaks_only_at_the_border() {
        let grid = Grid::new(4);
        let input = vec![1.0; 16];
        let mut output = vec![0.0; 16];
        diffuse(&grid, &input, &mut output, 8, EdgeDivisor::Constant);
        let at = |x, y| output[grid.index(CellCoord::new(x, y)).unwrap()];
        assert_eq!(at(1, 1), 1.0);
        assert_eq!(at(1, 0), 0.75);
        assert_eq!(at(0, 0), 0.5);

        diffuse(&grid, &input, &mut output, 8, EdgeDivisor::NeighborCount);
        assert!(output.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn tile_size_does_not_change_the_result() {
        let grid = Grid::new(13);
        let input: Vec<f32> = (0..grid.cell_count()).map(|i| (i % 7) as f32 / 7.0).collect();
        let mut reference = vec![0.0; grid.cell_count()];
        diffuse(&grid, &input, &mut reference, 1, EdgeDivisor::Constant);
        for tile in [2, 5, 8, 13, 32] {
            let mut out = vec![-1.0; grid.cell_count()];
            diffuse(&grid, &input, &mut out, tile, EdgeDivisor::Constant);
            assert_eq!(out, reference, "tile {tile}");
        }
    }

    #[test]
    fn total_never_grows_without_injection() {
        let grid = Grid::new(16);
        let seed: Vec<f32> = (0..grid.cell_count())
            .map(|i| if i % 3 == 0 { 1.0 } else { 0.0 })
            .collect();
        let mut state = FieldState::seeded(grid, seed);
        let initial = total(state.density.get(Slot::A));
        let mut prev = initial;
        for s in 0..50 {
            let roles = select_roles(s);
            step(&mut state, roles, 8, EdgeDivisor::Constant);
            let now = total(state.density.get(roles.write));
            assert!(now <= prev + 1e-9, "step {s}: {now} > {prev}");
            prev = now;
        }
        assert!(prev < initial * 0.9);
    }
}
