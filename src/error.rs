// Pingpong Diffusion - GPU Density Diffusion Sandbox
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use std::error::Error;
use std::fmt;

/// Errors raised while driving the simulation core.
///
/// Setup failures (no adapter, no device, surface creation) are not part of
/// this taxonomy; they surface as `anyhow::Error` from the startup path and
/// abort before any field state exists.
#[derive(Debug)]
pub enum SimError {
    /// A computed cell index fell outside `[0, N²)`. This is a programming
    /// defect and must never reach a buffer write.
    CellOutOfRange { index: usize, cell_count: usize },
    /// The presentation surface could not hand out a frame. The tick's
    /// compute work still ran; only the frame is dropped.
    Surface(wgpu::SurfaceError),
    /// The backend and the input injector were built for different grids.
    GridMismatch { backend: u32, input: u32 },
    /// Copying a field back from the GPU failed.
    Readback(String),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CellOutOfRange { index, cell_count } => {
                write!(f, "cell index {index} out of range (grid has {cell_count} cells)")
            }
            Self::GridMismatch { backend, input } => write!(
                f,
                "backend grid is {backend}x{backend} but input maps onto {input}x{input}"
            ),
            Self::Surface(e) => write!(f, "surface error: {e}"),
            Self::Readback(reason) => write!(f, "field readback failed: {reason}"),
        }
    }
}

impl Error for SimError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Surface(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::SurfaceError> for SimError {
    fn from(e: wgpu::SurfaceError) -> Self {
        Self::Surface(e)
    }
}
