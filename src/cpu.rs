// Pingpong Diffusion - GPU Density Diffusion Sandbox
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! Host-memory backend. Runs the reference kernel and keeps the last
//! presented frame, so the scheduler can be driven without a GPU.

use crate::error::SimError;
use crate::field::{FieldState, Roles, Slot};
use crate::grid::{Grid, WORKGROUP_SIZE};
use crate::kernel::{self, EdgeDivisor};
use crate::scheduler::FieldBackend;

/// Backend call, recorded when tracing is enabled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackendOp {
    Inject { slot: Slot, index: usize, value: f32 },
    Diffuse(Roles),
    Render(Roles),
    Reseed,
}

pub struct CpuBackend {
    state: FieldState,
    tile: u32,
    divisor: EdgeDivisor,
    frame: Vec<f32>,
    presented: Option<Slot>,
    frames: u64,
    trace: Option<Vec<BackendOp>>,
}

impl CpuBackend {
    pub fn new(state: FieldState, divisor: EdgeDivisor) -> Self {
        let frame = state.density.get(Slot::A).to_vec();
        Self {
            state,
            tile: WORKGROUP_SIZE,
            divisor,
            frame,
            presented: None,
            frames: 0,
            trace: None,
        }
    }

    pub fn with_tile(mut self, tile: u32) -> Self {
        self.tile = tile.max(1);
        self
    }

    pub fn with_trace(mut self) -> Self {
        self.trace = Some(Vec::new());
        self
    }

    pub fn state(&self) -> &FieldState {
        &self.state
    }

    /// Density as last presented by `render`.
    pub fn frame(&self) -> &[f32] {
        &self.frame
    }

    pub fn presented(&self) -> Option<Slot> {
        self.presented
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn take_trace(&mut self) -> Vec<BackendOp> {
        self.trace.as_mut().map(std::mem::take).unwrap_or_default()
    }

    fn record(&mut self, op: BackendOp) {
        if let Some(trace) = self.trace.as_mut() {
            trace.push(op);
        }
    }
}

impl FieldBackend for CpuBackend {
    fn grid(&self) -> Grid {
        self.state.grid()
    }

    fn inject(&mut self, slot: Slot, index: usize, value: f32) -> Result<(), SimError> {
        self.state.write(slot, index, value)?;
        self.record(BackendOp::Inject { slot, index, value });
        Ok(())
    }

    fn diffuse(&mut self, roles: Roles) {
        kernel::step(&mut self.state, roles, self.tile, self.divisor);
        self.record(BackendOp::Diffuse(roles));
    }

    fn render(&mut self, roles: Roles) -> Result<(), SimError> {
        self.frame.clear();
        self.frame
            .extend_from_slice(self.state.density.get(roles.write));
        self.presented = Some(roles.write);
        self.frames += 1;
        self.record(BackendOp::Render(roles));
        Ok(())
    }

    fn reseed(&mut self, seed: &[f32]) {
        self.state.reseed(seed);
        self.frame.clear();
        self.frame.extend_from_slice(self.state.density.get(Slot::A));
        self.presented = None;
        self.record(BackendOp::Reseed);
    }
}
