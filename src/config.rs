use crate::error::{Error, Result};
use crate::placement::PlacementConfig;
use crate::render::{BoundingBox, RenderConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const BUILTIN_PRESETS: &[(&str, &str)] = &[
    ("default", include_str!("../presets/default.toml")),
    ("sine_saloum", include_str!("../presets/sine_saloum.toml")),
];

/// The georeferenced raster produced by the imagery step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasemapConfig {
    /// PNG/JPEG file; relative paths resolve against the config file.
    #[serde(default)]
    pub image: Option<PathBuf>,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
}

/// Per-stage settings; each section is handed only to the stage that uses it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Figure title when the source document has none.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub placement: PlacementConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub basemap: BasemapConfig,
}

impl Config {
    pub fn from_builtin(name: &str) -> Result<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
        let content = BUILTIN_PRESETS
            .iter()
            .find(|(n, _)| *n == normalized)
            .map(|(_, c)| *c)
            .ok_or_else(|| {
                Error::Config(format!(
                    "unknown preset '{}'. Available: {}",
                    name,
                    Self::list_builtins().join(", ")
                ))
            })?;
        Self::from_toml(content)
    }

    pub fn list_builtins() -> Vec<&'static str> {
        BUILTIN_PRESETS.iter().map(|(n, _)| *n).collect()
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| Error::Config(format!("TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(content).map_err(|e| Error::Config(format!("YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML or YAML file, trying TOML first.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut config = match Self::from_toml(&content) {
            Ok(config) => config,
            Err(toml_err) => Self::from_yaml(&content).map_err(|yaml_err| {
                Error::Config(format!(
                    "{} is neither valid TOML ({toml_err}) nor YAML ({yaml_err})",
                    path.display()
                ))
            })?,
        };

        if let (Some(image), Some(dir)) = (config.basemap.image.as_mut(), path.parent()) {
            if image.is_relative() {
                *image = dir.join(&*image);
            }
        }
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.placement.validate()?;
        self.render.validate()
    }
}
