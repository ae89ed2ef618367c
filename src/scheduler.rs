// Pingpong Diffusion - GPU Density Diffusion Sandbox
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! Fixed-interval frame driver.
//!
//! One tick is, strictly in this order:
//! 1. drain pending perturbations into both slots of the current role pair
//! 2. diffuse `roles.read -> roles.write`
//! 3. render `roles.write`
//! 4. advance the step counter
//!
//! Backends submit work in that order on a single queue, so the render pass
//! always observes the diffusion output of its own tick. Adjacent ticks
//! write opposite slots, so no wait on the previous tick is needed.

use std::time::{Duration, Instant};

use crate::error::SimError;
use crate::field::{select_roles, Roles, Slot};
use crate::grid::Grid;
use crate::input::{Display, InputInjector, PointerEvent};

/// Execution target for field storage and the per-tick passes.
pub trait FieldBackend {
    fn grid(&self) -> Grid;

    /// Force one density cell in one physical slot.
    fn inject(&mut self, slot: Slot, index: usize, value: f32) -> Result<(), SimError>;

    /// Submit the diffusion pass for `roles`.
    fn diffuse(&mut self, roles: Roles);

    /// Submit the render pass presenting `roles.write`.
    fn render(&mut self, roles: Roles) -> Result<(), SimError>;

    /// Overwrite both density slots with `seed` and clear velocity.
    fn reseed(&mut self, seed: &[f32]);
}

/// What a completed tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Step the tick ran at (before the increment).
    pub step: u64,
    pub roles: Roles,
    pub injected: usize,
}

/// Rolling ticks-per-second counter for the window title.
#[derive(Debug)]
pub struct FrameStats {
    frame_count: u32,
    last_update: Instant,
}

impl FrameStats {
    const WINDOW: Duration = Duration::from_millis(500);

    pub fn new(now: Instant) -> Self {
        Self {
            frame_count: 0,
            last_update: now,
        }
    }

    pub fn record(&mut self) {
        self.frame_count += 1;
    }

    /// Ticks per second over the last window, once per window.
    pub fn poll(&mut self, now: Instant) -> Option<f32> {
        let elapsed = now.saturating_duration_since(self.last_update);
        if elapsed < Self::WINDOW || self.frame_count == 0 {
            return None;
        }
        let tps = self.frame_count as f32 / elapsed.as_secs_f32();
        self.frame_count = 0;
        self.last_update = now;
        Some(tps)
    }
}

pub struct Scheduler<B: FieldBackend> {
    backend: B,
    input: InputInjector,
    step: u64,
    interval: Duration,
    next_due: Instant,
    stats: FrameStats,
}

impl<B: FieldBackend> Scheduler<B> {
    /// Fails when the backend and the injector disagree on the grid, since
    /// injected indices are linearized with the injector's row stride.
    pub fn new(
        backend: B,
        input: InputInjector,
        interval: Duration,
        now: Instant,
    ) -> Result<Self, SimError> {
        let (backend_grid, input_grid) = (backend.grid(), input.grid());
        if backend_grid != input_grid {
            return Err(SimError::GridMismatch {
                backend: backend_grid.size(),
                input: input_grid.size(),
            });
        }
        Ok(Self {
            backend,
            input,
            step: 0,
            interval: interval.max(Duration::from_millis(1)),
            next_due: now,
            stats: FrameStats::new(now),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn input(&self) -> &InputInjector {
        &self.input
    }

    #[inline]
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Roles the next tick will use.
    #[inline]
    pub fn roles(&self) -> Roles {
        select_roles(self.step)
    }

    /// Slot holding the most recently rendered state.
    #[inline]
    pub fn front(&self) -> Slot {
        self.roles().read
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn deadline(&self) -> Instant {
        self.next_due
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due
    }

    pub fn handle_pointer(&mut self, event: PointerEvent) {
        self.input.handle(event);
    }

    pub fn resize(&mut self, display: Display) {
        self.input.set_display(display);
    }

    /// Run one tick unconditionally.
    ///
    /// The step only advances when the render completes; a dropped frame
    /// leaves the roles unchanged so the next tick re-reads the same slot.
    pub fn tick(&mut self) -> Result<TickReport, SimError> {
        let roles = select_roles(self.step);

        let batch = self.input.drain();
        for p in &batch {
            for slot in roles.both() {
                self.backend.inject(slot, p.index, p.value)?;
            }
        }

        self.backend.diffuse(roles);
        self.backend.render(roles)?;

        let report = TickReport {
            step: self.step,
            roles,
            injected: batch.len(),
        };
        self.step = self.step.wrapping_add(1);
        self.stats.record();
        log::trace!("tick {report:?}");
        Ok(report)
    }

    /// Tick if the timer has fired, then schedule the next deadline.
    ///
    /// A late timer does not cause a burst of catch-up ticks.
    pub fn tick_if_due(&mut self, now: Instant) -> Option<Result<TickReport, SimError>> {
        if !self.is_due(now) {
            return None;
        }
        self.next_due += self.interval;
        if self.next_due <= now {
            self.next_due = now + self.interval;
        }
        Some(self.tick())
    }

    /// Reseed both slots, drop pending input and restart at step 0.
    pub fn reset(&mut self, seed: &[f32]) {
        self.backend.reseed(seed);
        self.input.clear();
        self.step = 0;
        log::info!("simulation reset");
    }

    pub fn poll_stats(&mut self, now: Instant) -> Option<f32> {
        self.stats.poll(now)
    }
}
