// Pingpong Diffusion - GPU Density Diffusion Sandbox
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use std::{sync::Arc, time::Instant};

use pingpong_diffusion::{
    gpu::GpuBackend, kernel, Display, Grid, InputInjector, PointerEvent, Scheduler, SimError,
    SimulationSettings,
};
use winit::{
    event::{ElementState, Event, KeyEvent, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

const WINDOW_TITLE: &str = "Pingpong Diffusion";

fn new_seed(settings: &SimulationSettings, grid: &Grid) -> Vec<f32> {
    settings
        .seed
        .generate(grid, settings.seed_value, &mut rand::thread_rng())
}

fn handle_tick_error(err: SimError, sim: &mut Scheduler<GpuBackend>, target: &ActiveEventLoop) {
    match err {
        SimError::Surface(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
            log::warn!("surface lost, reconfiguring; frame dropped");
            sim.backend_mut().reconfigure();
        }
        SimError::Surface(wgpu::SurfaceError::OutOfMemory) => {
            log::error!("surface out of memory, exiting");
            target.exit();
        }
        e => log::warn!("frame dropped: {e}"),
    }
}

fn log_density(sim: &Scheduler<GpuBackend>) {
    let slot = sim.front();
    match pollster::block_on(sim.backend().read_density(slot)) {
        Ok(density) => {
            let peak = density.iter().copied().fold(0.0f32, f32::max);
            log::info!(
                "step {} slot {:?}: total density {:.4}, peak {:.4}",
                sim.step(),
                slot,
                kernel::total(&density),
                peak
            );
        }
        Err(e) => log::error!("{e}"),
    }
}

fn update_window_title(window: &Window, sim: &mut Scheduler<GpuBackend>, grid: &Grid) {
    if let Some(tps) = sim.poll_stats(Instant::now()) {
        window.set_title(&format!(
            "{WINDOW_TITLE} - {n}x{n} | {tps:.0} ticks/s | step {}",
            sim.step(),
            n = grid.size()
        ));
    }
}

fn main() -> anyhow::Result<()> {
    use env_logger::Env;
    env_logger::Builder::from_env(Env::default().default_filter_or("warn,pingpong_diffusion=info")).init();

    let settings = SimulationSettings::load_or_default(&SimulationSettings::default_path());
    let grid = Grid::default();

    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        event_loop.create_window(
            winit::window::WindowAttributes::default()
                .with_title(WINDOW_TITLE)
                .with_inner_size(winit::dpi::PhysicalSize::new(
                    settings.window_width,
                    settings.window_height,
                )),
        )?,
    );

    // No adapter or device means no simulation at all.
    let backend = pollster::block_on(GpuBackend::new(
        window.clone(),
        grid,
        &settings,
        &new_seed(&settings, &grid),
    ))?;

    let size = window.inner_size();
    let input = InputInjector::new(
        grid,
        Display::new(size.width, size.height),
        settings.row_flip,
        settings.inject_value,
    );
    let mut sim = Scheduler::new(backend, input, settings.tick_interval(), Instant::now())?;
    log::info!(
        "{n}x{n} grid, {}x{} workgroups, tick every {:?}",
        grid.workgroups(pingpong_diffusion::WORKGROUP_SIZE),
        grid.workgroups(pingpong_diffusion::WORKGROUP_SIZE),
        sim.interval(),
        n = grid.size()
    );

    let mut cursor_px: Option<(f64, f64)> = None;

    event_loop.run(move |event, target| match event {
        Event::WindowEvent {
            ref event,
            window_id,
        } if window_id == window.id() => match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        ..
                    },
                ..
            } => target.exit(),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match key {
                KeyCode::KeyR => sim.reset(&new_seed(&settings, &grid)),
                KeyCode::KeyD => log_density(&sim),
                _ => {}
            },
            WindowEvent::CursorMoved { position, .. } => {
                cursor_px = Some((position.x, position.y));
                sim.handle_pointer(PointerEvent::Moved {
                    x: position.x,
                    y: position.y,
                });
            }
            WindowEvent::CursorLeft { .. } => {
                cursor_px = None;
                sim.handle_pointer(PointerEvent::Moved { x: -1.0, y: -1.0 });
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                let (x, y) = cursor_px.unwrap_or((-1.0, -1.0));
                sim.handle_pointer(match state {
                    ElementState::Pressed => PointerEvent::Pressed { x, y },
                    ElementState::Released => PointerEvent::Released { x, y },
                });
            }
            WindowEvent::Resized(physical_size) => {
                if physical_size.width > 0 && physical_size.height > 0 {
                    sim.backend_mut()
                        .resize(physical_size.width, physical_size.height);
                    sim.resize(Display::new(physical_size.width, physical_size.height));
                }
            }
            _ => {}
        },
        Event::AboutToWait => {
            if let Some(Err(e)) = sim.tick_if_due(Instant::now()) {
                handle_tick_error(e, &mut sim, target);
            }
            update_window_title(&window, &mut sim, &grid);
            target.set_control_flow(ControlFlow::WaitUntil(sim.deadline()));
        }
        _ => {}
    })?;

    Ok(())
}
