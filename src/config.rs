// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::backend::{DeviceConfig, RendererConfig, SwapchainConfig};

pub const MAX_FRAMES_IN_FLIGHT: usize = 4;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub device: DeviceSettings,
    pub shaders: ShaderConfig,
    pub scene: SceneConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Mesh Renderer".to_string(),
            width: 800,
            height: 800,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub surface_format: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "mailbox".to_string(),
            surface_format: "rgba8_srgb".to_string(),
            clear_color: [0.01, 0.01, 0.01, 1.0],
            max_frames_in_flight: 2,
        }
    }
}

/// Instance and GPU selection
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub validation_layers: bool,
    pub layers: Vec<String>,
    pub device_name_filter: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            validation_layers: cfg!(debug_assertions),
            layers: vec!["VK_LAYER_KHRONOS_validation".to_string()],
            device_name_filter: String::new(),
        }
    }
}

/// Compiled SPIR-V paths
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/mesh.vert.spv"),
            fragment: PathBuf::from("shaders/mesh.frag.spv"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Untextured (white) when unset
    pub texture: Option<PathBuf>,
    pub camera_position: [f32; 3],
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Units per second
    pub move_speed: f32,
    /// Radians per pixel of mouse motion
    pub look_sensitivity: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            texture: None,
            camera_position: [0.0, 0.0, 3.0],
            fov_degrees: 45.0,
            near: 0.1,
            far: 100.0,
            move_speed: 2.5,
            look_sensitivity: 0.003,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
    pub hot_reload_shaders: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: false,
            log_file: "mesh_renderer.log".to_string(),
            show_fps: true,
            hot_reload_shaders: false,
        }
    }
}

impl Config {
    /// Load config.toml, falling back to defaults. Runs before logging is up,
    /// so a load failure is handed back for the caller to report.
    pub fn load() -> (Self, Option<anyhow::Error>) {
        match Self::load_from_path("config.toml") {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        }
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

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to MAILBOX",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::MAILBOX
            }
        }
    }

    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        let format = match self.graphics.surface_format.to_lowercase().as_str() {
            "rgba8_srgb" => vk::Format::R8G8B8A8_SRGB,
            "bgra8_srgb" => vk::Format::B8G8R8A8_SRGB,
            "rgba8_unorm" => vk::Format::R8G8B8A8_UNORM,
            "bgra8_unorm" => vk::Format::B8G8R8A8_UNORM,
            _ => {
                log::warn!(
                    "Unknown surface format '{}', defaulting to rgba8_srgb",
                    self.graphics.surface_format
                );
                vk::Format::R8G8B8A8_SRGB
            }
        };
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    pub fn frames_in_flight(&self) -> usize {
        self.graphics.max_frames_in_flight.clamp(1, MAX_FRAMES_IN_FLIGHT)
    }

    pub fn swapchain_config(&self) -> SwapchainConfig {
        SwapchainConfig {
            frames_in_flight: self.frames_in_flight(),
            present_mode: self.present_mode(),
            surface_format: self.surface_format(),
        }
    }

    pub fn renderer_config(&self) -> RendererConfig {
        RendererConfig {
            swapchain: self.swapchain_config(),
            clear_color: self.graphics.clear_color,
        }
    }

    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig {
            app_name: self.window.title.clone(),
            validation: self.device.validation_layers,
            layers: self.device.layers.clone(),
            device_name_filter: self.device.device_name_filter.clone(),
            frames_in_flight: self.frames_in_flight() as u32,
        }
    }
}
