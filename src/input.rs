// Pingpong Diffusion - GPU Density Diffusion Sandbox
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! Pointer input: display→grid mapping and the pending perturbation queue.
//!
//! Pointer events arrive from the window event loop at arbitrary points
//! between ticks. They only update [`PointerState`] and enqueue
//! perturbations; nothing touches field storage until the scheduler drains
//! the queue at the start of the next tick and writes every perturbation
//! into both slots of that tick's role pair.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::grid::{CellCoord, Grid};

/// Display (surface) size in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Display {
    pub width: u32,
    pub height: u32,
}

impl Display {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }
}

/// How the display's downward Y axis maps onto grid rows.
///
/// `AsBuilt` flips with `N - gy`, which sends the top display row to row
/// `N`, one past the grid; those presses are rejected rather than written.
/// `Mirrored` flips with `N - 1 - gy` and accepts the whole display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RowFlip {
    #[default]
    AsBuilt,
    Mirrored,
}

/// Raw pointer events in display pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Pressed { x: f64, y: f64 },
    Moved { x: f64, y: f64 },
    Released { x: f64, y: f64 },
}

/// Latest pointer state. Overwritten by each event, never accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PointerState {
    pub pressed: bool,
    /// Grid cell under the pointer, `None` once it leaves the display.
    pub cell: Option<CellCoord>,
}

/// A forced density value for one linear cell index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Perturbation {
    pub index: usize,
    pub value: f32,
}

/// Scale display pixels into a grid cell, rejecting points off the display.
pub fn display_to_cell(display: Display, grid: &Grid, x: f64, y: f64) -> Option<CellCoord> {
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    if x < 0.0 || y < 0.0 || x >= display.width as f64 || y >= display.height as f64 {
        return None;
    }
    let n = grid.size();
    let gx = (x * n as f64 / display.width as f64).floor() as u32;
    let gy = (y * n as f64 / display.height as f64).floor() as u32;
    Some(CellCoord::new(gx.min(n - 1), gy.min(n - 1)))
}

/// Linear index of the flipped cell, `gy' * N + gx`.
pub fn cell_index(grid: &Grid, cell: CellCoord, flip: RowFlip) -> Result<usize, SimError> {
    let n = grid.size() as usize;
    let (gx, gy) = (cell.x as usize, cell.y as usize);
    let out_of_range = |index| SimError::CellOutOfRange {
        index,
        cell_count: grid.cell_count(),
    };
    if gx >= n || gy >= n {
        return Err(out_of_range(gy.saturating_mul(n).saturating_add(gx)));
    }
    let flipped = match flip {
        RowFlip::AsBuilt => n - gy,
        RowFlip::Mirrored => n - 1 - gy,
    };
    let index = flipped * n + gx;
    if index >= grid.cell_count() {
        return Err(out_of_range(index));
    }
    Ok(index)
}

/// FIFO of perturbations waiting for the next tick.
#[derive(Debug, Default)]
pub(crate) struct PerturbationQueue {
    pending: VecDeque<Perturbation>,
}

impl PerturbationQueue {
    fn push(&mut self, p: Perturbation) {
        self.pending.push_back(p);
    }

    fn len(&self) -> usize {
        self.pending.len()
    }

    fn drain(&mut self) -> impl Iterator<Item = Perturbation> + '_ {
        self.pending.drain(..)
    }
}

/// Translates pointer events into perturbations.
#[derive(Debug)]
pub struct InputInjector {
    grid: Grid,
    display: Display,
    flip: RowFlip,
    value: f32,
    pointer: PointerState,
    queue: PerturbationQueue,
}

impl InputInjector {
    pub fn new(grid: Grid, display: Display, flip: RowFlip, value: f32) -> Self {
        Self {
            grid,
            display,
            flip,
            value,
            pointer: PointerState::default(),
            queue: PerturbationQueue::default(),
        }
    }

    pub fn pointer(&self) -> PointerState {
        self.pointer
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    pub fn set_display(&mut self, display: Display) {
        self.display = display;
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn handle(&mut self, event: PointerEvent) {
        match event {
            PointerEvent::Pressed { x, y } => {
                self.pointer.pressed = true;
                self.track(x, y);
            }
            PointerEvent::Moved { x, y } => self.track(x, y),
            PointerEvent::Released { x, y } => {
                self.pointer.cell = display_to_cell(self.display, &self.grid, x, y);
                self.pointer.pressed = false;
            }
        }
    }

    fn track(&mut self, x: f64, y: f64) {
        self.pointer.cell = display_to_cell(self.display, &self.grid, x, y);
        if !self.pointer.pressed {
            return;
        }
        if let Some(p) = self.perturbation_at(self.pointer.cell) {
            self.queue.push(p);
        }
    }

    fn perturbation_at(&self, cell: Option<CellCoord>) -> Option<Perturbation> {
        let cell = cell?;
        match cell_index(&self.grid, cell, self.flip) {
            Ok(index) => Some(Perturbation {
                index,
                value: self.value,
            }),
            Err(e) => {
                log::debug!("pointer at {cell:?} rejected: {e}");
                None
            }
        }
    }

    /// Everything to inject this tick: queued event perturbations, then the
    /// held pointer cell while the pointer stays pressed.
    ///
    /// A press released before the tick still delivers its queued cells;
    /// only the held re-injection stops on release.
    pub fn drain(&mut self) -> Vec<Perturbation> {
        let mut out: Vec<Perturbation> = self.queue.drain().collect();
        if self.pointer.pressed {
            if let Some(p) = self.perturbation_at(self.pointer.cell) {
                if out.last() != Some(&p) {
                    out.push(p);
                }
            }
        }
        out
    }

    /// Drop pending perturbations without applying them.
    pub fn clear(&mut self) {
        self.queue.drain().for_each(drop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reference() -> (Grid, Display) {
        (Grid::new(64), Display::new(64, 64))
    }

    #[test]
    fn flip_and_linearize_as_built() {
        let (grid, _) = reference();
        assert_eq!(
            cell_index(&grid, CellCoord::new(3, 5), RowFlip::AsBuilt).unwrap(),
            (64 - 5) * 64 + 3
        );
        assert_eq!(
            cell_index(&grid, CellCoord::new(3, 5), RowFlip::AsBuilt).unwrap(),
            3779
        );
        assert_eq!(
            cell_index(&grid, CellCoord::new(3, 5), RowFlip::Mirrored).unwrap(),
            (63 - 5) * 64 + 3
        );
    }

    #[test]
    fn top_row_is_rejected_as_built() {
        let (grid, _) = reference();
        let err = cell_index(&grid, CellCoord::new(10, 0), RowFlip::AsBuilt).unwrap_err();
        assert!(matches!(err, SimError::CellOutOfRange { index, .. } if index >= 4096));
        assert_eq!(
            cell_index(&grid, CellCoord::new(10, 0), RowFlip::Mirrored).unwrap(),
            63 * 64 + 10
        );
    }

    #[test]
    fn off_grid_rows_and_columns_are_rejected() {
        let (grid, _) = reference();
        for flip in [RowFlip::AsBuilt, RowFlip::Mirrored] {
            for cell in [
                CellCoord::new(3, 100),
                CellCoord::new(3, 64),
                CellCoord::new(64, 3),
                CellCoord::new(u32::MAX, u32::MAX),
            ] {
                let err = cell_index(&grid, cell, flip).unwrap_err();
                assert!(
                    matches!(err, SimError::CellOutOfRange { cell_count: 4096, .. }),
                    "{cell:?} {flip:?}"
                );
            }
        }
        assert_eq!(
            cell_index(&grid, CellCoord::new(3, 63), RowFlip::Mirrored).unwrap(),
            3
        );
    }

    #[test]
    fn display_scaling_floors_and_rejects_outside() {
        let grid = Grid::new(64);
        let display = Display::new(512, 256);
        assert_eq!(
            display_to_cell(display, &grid, 31.9, 23.0),
            Some(CellCoord::new(3, 5))
        );
        assert_eq!(display_to_cell(display, &grid, -0.1, 10.0), None);
        assert_eq!(display_to_cell(display, &grid, 10.0, 256.0), None);
        assert_eq!(display_to_cell(display, &grid, f64::NAN, 1.0), None);
        assert_eq!(
            display_to_cell(display, &grid, 511.99, 255.99),
            Some(CellCoord::new(63, 63))
        );
    }

    #[test]
    fn press_move_release_feed_the_queue() {
        let (grid, display) = reference();
        let mut input = InputInjector::new(grid, display, RowFlip::AsBuilt, 1.0);

        input.handle(PointerEvent::Moved { x: 3.0, y: 5.0 });
        assert_eq!(input.pending(), 0, "hover does not inject");

        input.handle(PointerEvent::Pressed { x: 3.0, y: 5.0 });
        input.handle(PointerEvent::Moved { x: 4.0, y: 5.0 });
        assert_eq!(input.pending(), 2);

        let batch = input.drain();
        let indices: Vec<usize> = batch.iter().map(|p| p.index).collect();
        // Held cell equals the last queued one, so it is not repeated.
        assert_eq!(indices, vec![3779, 3780]);
        assert!(batch.iter().all(|p| p.value == 1.0));

        // Still pressed: the held cell is re-injected every tick.
        assert_eq!(input.drain(), vec![Perturbation { index: 3780, value: 1.0 }]);

        input.handle(PointerEvent::Released { x: 4.0, y: 5.0 });
        assert!(input.drain().is_empty());
        assert!(!input.pointer().pressed);
    }

    #[test]
    fn click_between_ticks_injects_once() {
        let (grid, display) = reference();
        let mut input = InputInjector::new(grid, display, RowFlip::AsBuilt, 1.0);
        input.handle(PointerEvent::Pressed { x: 3.0, y: 5.0 });
        input.handle(PointerEvent::Released { x: 3.0, y: 5.0 });
        assert!(!input.pointer().pressed);
        assert_eq!(input.drain(), vec![Perturbation { index: 3779, value: 1.0 }]);
        assert!(input.drain().is_empty());
    }

    #[test]
    fn press_on_rejected_row_is_a_noop() {
        let (grid, display) = reference();
        let mut input = InputInjector::new(grid, display, RowFlip::AsBuilt, 1.0);
        input.handle(PointerEvent::Pressed { x: 20.0, y: 0.5 });
        assert!(input.pointer().pressed);
        assert!(input.drain().is_empty());
    }

    #[test]
    fn leaving_the_display_stops_held_injection() {
        let (grid, display) = reference();
        let mut input = InputInjector::new(grid, display, RowFlip::Mirrored, 0.5);
        input.handle(PointerEvent::Pressed { x: 1.0, y: 1.0 });
        input.handle(PointerEvent::Moved { x: 100.0, y: 1.0 });
        let batch = input.drain();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].value, 0.5);
        assert!(input.drain().is_empty());
    }

    proptest! {
        #[test]
        fn accepted_indices_are_always_in_range(
            x in -10.0f64..600.0,
            y in -10.0f64..600.0,
            mirrored in any::<bool>(),
        ) {
            let grid = Grid::new(64);
            let display = Display::new(512, 512);
            let flip = if mirrored { RowFlip::Mirrored } else { RowFlip::AsBuilt };
            if let Some(cell) = display_to_cell(display, &grid, x, y) {
                match cell_index(&grid, cell, flip) {
                    Ok(index) => prop_assert!(index < grid.cell_count()),
                    Err(_) => prop_assert!(flip == RowFlip::AsBuilt && cell.y == 0),
                }
            }
        }
    }
}
