// Pingpong Diffusion - GPU Density Diffusion Sandbox
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::field::SeedPattern;
use crate::input::RowFlip;
use crate::kernel::EdgeDivisor;

pub const SETTINGS_FILE_NAME: &str = "diffusion_settings.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationSettings {
    pub window_width: u32,
    pub window_height: u32,
    pub tick_interval_ms: u64,
    pub inject_value: f32,
    pub row_flip: RowFlip,
    pub edge_divisor: EdgeDivisor,
    pub seed: SeedPattern,
    pub seed_value: f32,
    pub background_color: [f32; 3],
    pub density_color: [f32; 3],
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            window_width: 512,
            window_height: 512,
            tick_interval_ms: 16,
            inject_value: 1.0,
            row_flip: RowFlip::AsBuilt,
            edge_divisor: EdgeDivisor::Constant,
            seed: SeedPattern::Empty,
            seed_value: 1.0,
            background_color: [0.14, 0.08, 0.2],
            density_color: [1.0, 1.0, 1.0],
        }
    }
}

impl SimulationSettings {
    pub fn default_path() -> PathBuf {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(SETTINGS_FILE_NAME)
    }

    pub fn load_from_disk(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut settings: Self = serde_json::from_str(&data)?;
        settings.sanitize();
        Ok(settings)
    }

    pub fn save_to_disk(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load `path`, falling back to defaults. A missing file is created with
    /// the defaults; a malformed one is left alone.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            let settings = Self::default();
            if let Err(e) = settings.save_to_disk(path) {
                log::warn!("could not write default settings to {}: {e:#}", path.display());
            }
            return settings;
        }
        match Self::load_from_disk(path) {
            Ok(settings) => {
                log::info!("loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                log::error!("failed to load settings {}: {e:#}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn sanitize(&mut self) {
        self.window_width = self.window_width.clamp(64, 4096);
        self.window_height = self.window_height.clamp(64, 4096);
        self.tick_interval_ms = self.tick_interval_ms.clamp(1, 1000);
        self.inject_value = self.inject_value.clamp(0.0, 1.0);
        self.seed_value = self.seed_value.clamp(0.0, 1.0);
        for c in self
            .background_color
            .iter_mut()
            .chain(self.density_color.iter_mut())
        {
            *c = c.clamp(0.0, 1.0);
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let settings: SimulationSettings =
            serde_json::from_str(r#"{ "tick_interval_ms": 33, "row_flip": "Mirrored" }"#).unwrap();
        assert_eq!(settings.tick_interval(), Duration::from_millis(33));
        assert_eq!(settings.row_flip, RowFlip::Mirrored);
        assert_eq!(settings.edge_divisor, EdgeDivisor::Constant);
        assert_eq!(settings.window_width, 512);
    }

    #[test]
    fn sanitize_clamps_out_of_range_values() {
        let mut settings = SimulationSettings {
            tick_interval_ms: 0,
            inject_value: 4.0,
            window_width: 1,
            background_color: [-1.0, 0.5, 2.0],
            ..Default::default()
        };
        settings.sanitize();
        assert_eq!(settings.tick_interval_ms, 1);
        assert_eq!(settings.inject_value, 1.0);
        assert_eq!(settings.window_width, 64);
        assert_eq!(settings.background_color, [0.0, 0.5, 1.0]);
    }

    #[test]
    fn save_then_load_from_nested_dir() {
        let dir = std::env::temp_dir().join(format!("pingpong-settings-{}", std::process::id()));
        let path = dir.join("nested").join(SETTINGS_FILE_NAME);
        let settings = SimulationSettings {
            seed: SeedPattern::Noise,
            ..Default::default()
        };
        settings.save_to_disk(&path).unwrap();
        assert_eq!(SimulationSettings::load_from_disk(&path).unwrap(), settings);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join(format!("pingpong-bad-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(SETTINGS_FILE_NAME);
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(SimulationSettings::load_or_default(&path), SimulationSettings::default());
        fs::remove_dir_all(&dir).unwrap();
    }
}
