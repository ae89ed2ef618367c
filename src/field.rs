// Pingpong Diffusion - GPU Density Diffusion Sandbox
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! Double-buffered field storage and the ping-pong role assignment.
//!
//! Every field owns two physical copies, slot A and slot B. At step `s` the
//! diffusion pass reads slot `s mod 2` and writes slot `(s + 1) mod 2`; the
//! render pass then reads the slot that was just written. Because the write
//! slot of step `s` is the read slot of step `s + 1`, the evolving state is
//! continuous across ticks without any copy.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::grid::{CellCoord, Grid};

/// One of the two physical buffers of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Slot::A => 0,
            Slot::B => 1,
        }
    }

    #[inline]
    pub fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }
}

/// Read/write role assignment for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roles {
    /// Consumed by the diffusion pass.
    pub read: Slot,
    /// Produced by the diffusion pass and presented by the render pass.
    pub write: Slot,
}

impl Roles {
    /// Both slots, read first. Used when a write must land in either role.
    #[inline]
    pub fn both(self) -> [Slot; 2] {
        [self.read, self.write]
    }
}

/// Resolve buffer roles for `step`: `(step mod 2, (step + 1) mod 2)`.
#[inline]
pub fn select_roles(step: u64) -> Roles {
    let read = if step % 2 == 0 { Slot::A } else { Slot::B };
    Roles {
        read,
        write: read.other(),
    }
}

/// A pair of equally sized buffers addressed by [`Slot`].
#[derive(Debug, Clone, PartialEq)]
pub struct DoubleBuffer<T> {
    slots: [Vec<T>; 2],
}

impl<T: Clone> DoubleBuffer<T> {
    /// Both slots filled with `init`.
    pub fn filled(len: usize, init: T) -> Self {
        let a = vec![init; len];
        let b = a.clone();
        Self { slots: [a, b] }
    }

    /// Both slots seeded with identical content.
    pub fn from_seed(seed: Vec<T>) -> Self {
        let b = seed.clone();
        Self { slots: [seed, b] }
    }
}

impl<T> DoubleBuffer<T> {
    #[inline]
    pub fn get(&self, slot: Slot) -> &[T] {
        &self.slots[slot.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, slot: Slot) -> &mut [T] {
        &mut self.slots[slot.index()]
    }

    /// Split into the read slice and the write slice for `roles`.
    pub fn split(&mut self, roles: Roles) -> (&[T], &mut [T]) {
        let [a, b] = &mut self.slots;
        match roles.read {
            Slot::A => (a.as_slice(), b.as_mut_slice()),
            Slot::B => (b.as_slice(), a.as_mut_slice()),
        }
    }
}

/// Initial content written identically into both slots at startup and reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SeedPattern {
    /// Every cell at zero.
    #[default]
    Empty,
    /// Every cell at the seed value.
    Uniform,
    /// Independent uniform samples in `[0, seed value]`.
    Noise,
    /// A disc of the seed value at the grid centre, radius N/8.
    CenterDisc,
}

impl SeedPattern {
    pub fn generate<R: Rng + ?Sized>(self, grid: &Grid, value: f32, rng: &mut R) -> Vec<f32> {
        let value = value.clamp(0.0, 1.0);
        let n = grid.size();
        match self {
            SeedPattern::Empty => vec![0.0; grid.cell_count()],
            SeedPattern::Uniform => vec![value; grid.cell_count()],
            SeedPattern::Noise => (0..grid.cell_count())
                .map(|_| rng.gen::<f32>() * value)
                .collect(),
            SeedPattern::CenterDisc => {
                let c = n as f32 * 0.5;
                let r = (n as f32 / 8.0).max(1.0);
                (0..grid.cell_count())
                    .map(|i| {
                        let x = (i % n as usize) as f32 + 0.5;
                        let y = (i / n as usize) as f32 + 0.5;
                        let d2 = (x - c) * (x - c) + (y - c) * (y - c);
                        if d2 <= r * r {
                            value
                        } else {
                            0.0
                        }
                    })
                    .collect()
            }
        }
    }
}

/// Authoritative CPU-side content of every double-buffered field.
///
/// Velocity is carried through the same ping-pong protocol as density but is
/// not consumed by the diffusion pass; it is kept so an advection pass can
/// be slotted in without changing the buffer layout.
#[derive(Debug, Clone)]
pub struct FieldState {
    grid: Grid,
    pub density: DoubleBuffer<f32>,
    pub velocity: DoubleBuffer<[f32; 2]>,
}

impl FieldState {
    pub fn new(grid: Grid) -> Self {
        Self {
            grid,
            density: DoubleBuffer::filled(grid.cell_count(), 0.0),
            velocity: DoubleBuffer::filled(grid.cell_count(), [0.0; 2]),
        }
    }

    /// Fresh state whose density slots both hold `seed`.
    ///
    /// `seed` shorter or longer than the grid is zero-padded or truncated.
    pub fn seeded(grid: Grid, mut seed: Vec<f32>) -> Self {
        seed.resize(grid.cell_count(), 0.0);
        Self {
            grid,
            density: DoubleBuffer::from_seed(seed),
            velocity: DoubleBuffer::filled(grid.cell_count(), [0.0; 2]),
        }
    }

    #[inline]
    pub fn grid(&self) -> Grid {
        self.grid
    }

    /// Overwrite both density slots and clear velocity.
    pub fn reseed(&mut self, seed: &[f32]) {
        for slot in [Slot::A, Slot::B] {
            let dst = self.density.get_mut(slot);
            dst.fill(0.0);
            let n = dst.len().min(seed.len());
            dst[..n].copy_from_slice(&seed[..n]);
            self.velocity.get_mut(slot).fill([0.0; 2]);
        }
    }

    /// Direct scalar write into one physical density buffer.
    pub fn write(&mut self, slot: Slot, cell: usize, value: f32) -> Result<(), SimError> {
        let cell_count = self.grid.cell_count();
        let dst = self
            .density
            .get_mut(slot)
            .get_mut(cell)
            .ok_or(SimError::CellOutOfRange {
                index: cell,
                cell_count,
            })?;
        *dst = value;
        Ok(())
    }

    pub fn density_at(&self, slot: Slot, coord: CellCoord) -> Option<f32> {
        self.grid
            .index(coord)
            .map(|i| self.density.get(slot)[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn roles_alternate_and_chain() {
        assert_eq!(
            select_roles(0),
            Roles {
                read: Slot::A,
                write: Slot::B
            }
        );
        assert_eq!(
            select_roles(1),
            Roles {
                read: Slot::B,
                write: Slot::A
            }
        );
        for s in 1..10u64 {
            assert_eq!(select_roles(s).read, select_roles(s - 1).write);
        }
    }

    #[test]
    fn seeded_read_at_step_zero_matches_either_slot() {
        let grid = Grid::new(4);
        let mut seed = vec![0.0; 16];
        seed[5] = 0.75;
        let state = FieldState::seeded(grid, seed);
        for slot in [Slot::A, Slot::B] {
            assert_eq!(state.density_at(slot, CellCoord::new(1, 1)), Some(0.75));
        }
        assert_eq!(state.density.get(Slot::A), state.density.get(Slot::B));
    }

    #[test]
    fn write_out_of_range_is_rejected() {
        let mut state = FieldState::new(Grid::new(4));
        assert!(state.write(Slot::A, 15, 1.0).is_ok());
        let err = state.write(Slot::B, 16, 1.0).unwrap_err();
        assert!(matches!(
            err,
            SimError::CellOutOfRange {
                index: 16,
                cell_count: 16
            }
        ));
        assert_eq!(state.density.get(Slot::A)[15], 1.0);
        assert!(state.density.get(Slot::B).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn split_hands_out_the_resolved_pair() {
        let mut buf = DoubleBuffer::from_seed(vec![1.0f32; 4]);
        buf.get_mut(Slot::B).fill(2.0);
        let (read, write) = buf.split(select_roles(1));
        assert_eq!(read, &[2.0; 4]);
        write.fill(3.0);
        assert_eq!(buf.get(Slot::A), &[3.0; 4]);
    }

    #[test]
    fn seed_patterns_stay_in_unit_range() {
        let grid = Grid::new(16);
        let mut rng = StdRng::seed_from_u64(7);
        for pattern in [
            SeedPattern::Empty,
            SeedPattern::Uniform,
            SeedPattern::Noise,
            SeedPattern::CenterDisc,
        ] {
            let seed = pattern.generate(&grid, 3.0, &mut rng);
            assert_eq!(seed.len(), 256);
            assert!(seed.iter().all(|v| (0.0..=1.0).contains(v)));
        }
        let disc = SeedPattern::CenterDisc.generate(&grid, 1.0, &mut rng);
        assert_eq!(disc[grid.index(CellCoord::new(8, 8)).unwrap()], 1.0);
        assert_eq!(disc[0], 0.0);
    }

    #[test]
    fn reseed_overwrites_both_slots() {
        let mut state = FieldState::new(Grid::new(2));
        state.write(Slot::A, 0, 1.0).unwrap();
        state.velocity.get_mut(Slot::B)[3] = [1.0, 1.0];
        state.reseed(&[0.5, 0.5]);
        for slot in [Slot::A, Slot::B] {
            assert_eq!(state.density.get(slot), &[0.5, 0.5, 0.0, 0.0]);
            assert!(state.velocity.get(slot).iter().all(|v| *v == [0.0; 2]));
        }
    }

    proptest! {
        #[test]
        fn roles_are_parity_and_distinct(step in any::<u64>()) {
            let roles = select_roles(step);
            prop_assert_eq!(roles.read.index() as u64, step % 2);
            prop_assert_eq!(roles.write.index() as u64, (step % 2 + 1) % 2);
            prop_assert_ne!(roles.read, roles.write);
        }
    }
}
