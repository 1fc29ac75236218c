//! Runtime configuration loaded from TOML.
//!
//! Every section is `#[serde(default)]`, so a file that only overrides
//! `[precompute]` is valid and everything else keeps its default.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Window creation parameters.
    pub window: WindowConfig,
    /// Device and frame settings.
    pub renderer: RendererConfig,
    /// Descriptor pool sizing.
    pub descriptors: DescriptorConfig,
    /// Image-based-lighting precompute.
    pub precompute: PrecomputeConfig,
    /// Camera control.
    pub camera: CameraConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "vkframe".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Enable the Khronos validation layer when it is installed.
    pub validation: bool,
    /// Requested MSAA sample count; the device may grant fewer.
    pub msaa_samples: u32,
    /// Color the frame is cleared to before any draw.
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            msaa_samples: 4,
            clear_color: [0.1, 0.1, 0.15, 1.0],
        }
    }
}

/// Initial set budget and the per-set descriptor capacity table.
///
/// A pool holding `n` sets reserves `n * uniform_buffers` uniform buffer
/// descriptors, and so on for every kind. Growth only changes `n`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorConfig {
    pub initial_sets: u32,
    pub uniform_buffers: u32,
    pub storage_buffers: u32,
    pub combined_image_samplers: u32,
    pub storage_images: u32,
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self {
            initial_sets: 16,
            uniform_buffers: 2,
            storage_buffers: 0,
            combined_image_samplers: 4,
            storage_images: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecomputeConfig {
    /// KTX cubemap, or a directory with `px nx py ny pz nz` face images.
    /// `None` selects the procedural sky.
    pub environment: Option<PathBuf>,
    /// Where the irradiance, prefiltered and BRDF artifacts are persisted.
    pub cache_dir: PathBuf,
    /// Face size of the procedural sky.
    pub fallback_face_size: u32,
    /// Recompute even when a valid cache exists.
    pub force: bool,
}

impl Default for PrecomputeConfig {
    fn default() -> Self {
        Self {
            environment: None,
            cache_dir: PathBuf::from("cache/ibl"),
            fallback_face_size: 512,
            force: false,
        }
    }
}

/// Which camera positioner the shell drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionerKind {
    Arcball,
    FirstPerson,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub positioner: PositionerKind,
    /// World units per second for the first-person positioner.
    pub move_speed: f32,
    /// Radians per pixel of mouse motion.
    pub mouse_sensitivity: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            positioner: PositionerKind::Arcball,
            move_speed: 3.0,
            mouse_sensitivity: 0.004,
        }
    }
}

impl Config {
    /// Default file looked up in the working directory.
    pub const DEFAULT_PATH: &'static str = "vkframe.toml";

    /// Parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content, path)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No config at '{}', using defaults", path.display());
            return Ok(Self::default());
        }
        let config = Self::load(path)?;
        tracing::info!("Loaded config from '{}'", path.display());
        Ok(config)
    }

    fn from_toml_str(content: &str, path: &Path) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the renderer cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::ConfigValue {
                field: "window.width/height",
                reason: "window dimensions must be nonzero".to_string(),
            });
        }

        let samples = self.renderer.msaa_samples;
        if !(2..=64).contains(&samples) || !samples.is_power_of_two() {
            return Err(Error::ConfigValue {
                field: "renderer.msaa_samples",
                reason: format!("{samples} is not a power of two in 2..=64"),
            });
        }

        let d = &self.descriptors;
        if d.initial_sets == 0 {
            return Err(Error::ConfigValue {
                field: "descriptors.initial_sets",
                reason: "a pool must hold at least one set".to_string(),
            });
        }
        let per_set = [d.storage_buffers, d.combined_image_samplers, d.storage_images]
            .into_iter()
            .try_fold(d.uniform_buffers, u32::checked_add)
            .ok_or_else(|| Error::ConfigValue {
                field: "descriptors",
                reason: "the per-set capacity table overflows".to_string(),
            })?;
        if per_set == 0 {
            return Err(Error::ConfigValue {
                field: "descriptors",
                reason: "the per-set capacity table is empty".to_string(),
            });
        }

        let face = self.precompute.fallback_face_size;
        if face == 0 || !face.is_power_of_two() {
            return Err(Error::ConfigValue {
                field: "precompute.fallback_face_size",
                reason: format!("{face} is not a nonzero power of two"),
            });
        }

        if self.camera.move_speed <= 0.0 || self.camera.mouse_sensitivity <= 0.0 {
            return Err(Error::ConfigValue {
                field: "camera",
                reason: "speed and sensitivity must be positive".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<Config> {
        Config::from_toml_str(s, Path::new("test.toml"))
    }

    #[test]
    fn test_default_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(config, parsed);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_example_file_matches_defaults() {
        let config = parse(include_str!("../../../vkframe.example.toml")).unwrap();
        assert_eq!(
            Config {
                renderer: RendererConfig {
                    validation: config.renderer.validation,
                    ..RendererConfig::default()
                },
                ..Config::default()
            },
            config
        );
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = parse(
            r#"
[precompute]
cache_dir = "/tmp/ibl"
force = true
"#,
        )
        .unwrap();
        assert_eq!(config.precompute.cache_dir, PathBuf::from("/tmp/ibl"));
        assert!(config.precompute.force);
        assert_eq!(config.precompute.fallback_face_size, 512);
        assert_eq!(config.window, WindowConfig::default());
        assert_eq!(config.descriptors.initial_sets, 16);
    }

    #[test]
    fn test_positioner_kind_snake_case() {
        let config = parse("[camera]\npositioner = \"first_person\"\n").unwrap();
        assert_eq!(config.camera.positioner, PositionerKind::FirstPerson);
    }

    #[test]
    fn test_rejects_bad_msaa() {
        let err = parse("[renderer]\nmsaa_samples = 3\n").unwrap_err();
        assert!(matches!(
            err,
            Error::ConfigValue {
                field: "renderer.msaa_samples",
                ..
            }
        ));
        assert!(parse("[renderer]\nmsaa_samples = 1\n").is_err());
        assert!(parse("[renderer]\nmsaa_samples = 8\n").is_ok());
    }

    #[test]
    fn test_rejects_empty_descriptor_budget() {
        assert!(parse("[descriptors]\ninitial_sets = 0\n").is_err());
        let empty_table = r#"
[descriptors]
uniform_buffers = 0
storage_buffers = 0
combined_image_samplers = 0
storage_images = 0
"#;
        assert!(parse(empty_table).is_err());
    }

    #[test]
    fn test_rejects_overflowing_descriptor_table() {
        let huge = format!(
            "[descriptors]\nuniform_buffers = {max}\ncombined_image_samplers = {max}\n",
            max = u32::MAX
        );
        match parse(&huge).unwrap_err() {
            Error::ConfigValue { field, reason } => {
                assert_eq!(field, "descriptors");
                assert!(reason.contains("overflows"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_toml_reports_path() {
        let err = parse("[window\nwidth = ").unwrap_err();
        match err {
            Error::ConfigParse { path, .. } => assert_eq!(path, PathBuf::from("test.toml")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_save_then_load() {
        let dir = std::env::temp_dir().join(format!("vkframe-config-{}", std::process::id()));
        let path = dir.join("nested").join("vkframe.toml");
        let mut config = Config::default();
        config.window.title = "saved".to_string();
        config.descriptors.initial_sets = 3;

        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_yields_default() {
        let path = std::env::temp_dir().join("vkframe-definitely-missing.toml");
        let config = Config::load_or_default(&path).unwrap();
        assert_eq!(config, Config::default());
    }
}
