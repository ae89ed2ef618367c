// Pingpong Diffusion - GPU Density Diffusion Sandbox
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! Double-buffered density diffusion driven by a fixed-interval scheduler.
//!
//! The simulation core (`field`, `kernel`, `input`, `scheduler`) is backend
//! agnostic. `gpu::GpuBackend` runs it on wgpu; `cpu::CpuBackend` runs the
//! same protocol in host memory.

pub mod config;
pub mod cpu;
pub mod error;
pub mod field;
pub mod gpu;
pub mod grid;
pub mod input;
pub mod kernel;
pub mod scheduler;

pub use config::SimulationSettings;
pub use error::SimError;
pub use field::{select_roles, FieldState, Roles, SeedPattern, Slot};
pub use grid::{CellCoord, Grid, GRID_SIZE, WORKGROUP_SIZE};
pub use input::{Display, InputInjector, PointerEvent, RowFlip};
pub use kernel::EdgeDivisor;
pub use scheduler::{FieldBackend, Scheduler, TickReport};
