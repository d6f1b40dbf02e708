//! Configuration management for quadmap

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::geometry::CanvasSize;

/// Output canvas configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
    /// Target render rate; ~60 gives the 16 ms tick
    pub fps: u32,
    /// Fill color painted before any surface
    pub background: [u8; 3],
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 800,
            fps: 60,
            background: [18, 18, 18],
        }
    }
}

impl CanvasConfig {
    pub fn size(&self) -> CanvasSize {
        CanvasSize::new(self.width, self.height)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.fps.max(1)))
    }
}

/// Surface editing behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Visual radius of corner handles in pixels
    pub handle_radius: f64,
    /// Pick tolerance as a multiple of the handle radius (L1 distance)
    pub hit_tolerance: f64,
    /// Offset applied per projection already present when a batch is added
    pub stagger_step: f64,
    /// Additional offset per item within one batch
    pub stagger_batch_step: f64,
    /// Default quad margin as a fraction of the shorter canvas side
    pub margin_ratio: f64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            handle_radius: 10.0,
            hit_tolerance: 1.5,
            stagger_step: 40.0,
            stagger_batch_step: 10.0,
            margin_ratio: 0.1,
        }
    }
}

impl EditorConfig {
    /// Maximum L1 distance at which a handle is picked
    pub fn pick_distance(&self) -> f64 {
        self.handle_radius * self.hit_tolerance
    }
}

/// Rendering flags and overlay colors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Per-pixel perspective warp (false = scale into the bounding box)
    pub live_warp: bool,
    /// Draw quad outlines and handles on top of the output
    pub show_mesh: bool,
    pub mesh_color: [u8; 3],
    pub selected_color: [u8; 3],
    pub handle_fill: [u8; 3],
    pub handle_outline: [u8; 3],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            live_warp: true,
            show_mesh: true,
            mesh_color: [0, 200, 255],
            selected_color: [255, 180, 0],
            handle_fill: [255, 255, 255],
            handle_outline: [0, 0, 0],
        }
    }
}

/// Live camera sources (`/dev/video*` media paths)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// Where composed frames go
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for PNG frames; frames are only counted when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// Write every Nth frame
    pub every: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: None,
            every: 1,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub canvas: CanvasConfig,

    #[serde(default)]
    pub editor: EditorConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a file, or create default if it doesn't exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            tracing::info!("Created default configuration at {:?}", path);
            Ok(config)
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory {:?}", parent))?;
            }
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}
