// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use triangle_renderer::backend::device::DeviceSelection;
use triangle_renderer::backend::frame::FrameSettings;
use triangle_renderer::RendererOptions;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub shaders: ShaderConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Triangle".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub clear_color: [f32; 4],
    pub device_selection: String,
    /// Absent: wait on the in-flight fence forever
    pub fence_timeout_ms: Option<u64>,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            device_selection: "first".to_string(),
            fence_timeout_ms: None,
        }
    }
}

/// Compiled SPIR-V locations
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/triangle.vert.spv"),
            fragment: PathBuf::from("shaders/triangle.frag.spv"),
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get device selection policy as backend enum
    pub fn device_selection(&self) -> DeviceSelection {
        match self.graphics.device_selection.to_lowercase().as_str() {
            "first" => DeviceSelection::First,
            "discrete" => DeviceSelection::PreferDiscrete,
            other => {
                log::warn!("Unknown device selection '{}', defaulting to 'first'", other);
                DeviceSelection::First
            }
        }
    }

    /// Fence timeout in nanoseconds, `u64::MAX` when unbounded
    pub fn fence_timeout_ns(&self) -> u64 {
        self.graphics
            .fence_timeout_ms
            .map_or(u64::MAX, |ms| ms.saturating_mul(1_000_000))
    }

    /// Log filter level, `Info` for anything unrecognized
    pub fn log_level(&self) -> log::LevelFilter {
        self.debug.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }

    /// Settings handed to the renderer core
    pub fn renderer_options(&self) -> RendererOptions {
        RendererOptions {
            app_name: self.window.title.clone(),
            // Validation only in debug builds
            enable_validation: cfg!(debug_assertions) && self.debug.validation_layers,
            device_selection: self.device_selection(),
            frame: FrameSettings {
                clear_color: self.graphics.clear_color,
                fence_timeout_ns: self.fence_timeout_ns(),
            },
        }
    }
}
