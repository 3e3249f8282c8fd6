// Application configuration
//
// A JSON file in the user config dir describes the video objects to
// create at startup. A missing or broken file is not fatal; the
// application then starts with defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No user config directory available")]
    NoConfigDir,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One configured video object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectConfig {
    pub url: String,
    pub mesh_type: String,
    /// Uniform object scale.
    pub scale: f32,
    /// Object rotation quaternion as [w, x, y, z].
    pub rotation: [f32; 4],
    /// Crop rectangle as [x, y, width, height], percent.
    pub crop_rectangle: [u32; 4],
    /// Texture rotation in degrees.
    pub texture_rotation: f32,
    pub subtitles_enabled: bool,
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            mesh_type: "cube".to_string(),
            scale: 1.0,
            rotation: [1.0, 0.0, 0.0, 0.0],
            crop_rectangle: [0, 0, 100, 100],
            texture_rotation: 0.0,
            subtitles_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub objects: Vec<ObjectConfig>,
}

impl AppConfig {
    /// Loads the config from `path`. A nonexistent file yields the
    /// default config; an unreadable or unparsable one is an error the
    /// caller may choose to log and ignore.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("Config file {} does not exist, using defaults", path.display());
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&data)?;
        // Objects without a URL cannot play anything; drop them here so
        // the rest of the application never sees them.
        config.objects.retain(|object| {
            if object.url.is_empty() {
                log::warn!("Skipping configured object without URL");
                false
            } else {
                true
            }
        });
        Ok(config)
    }

    pub fn save(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Default config file location in the user config dir.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join("vidmesh").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("nope.json")).unwrap();
        assert!(config.objects.is_empty());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(AppConfig::load(&path).is_err());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.json");

        let config = AppConfig {
            objects: vec![ObjectConfig {
                url: "file:///videos/test.mkv".to_string(),
                mesh_type: "torus".to_string(),
                scale: 0.5,
                rotation: [0.7071, 0.0, 0.7071, 0.0],
                crop_rectangle: [10, 10, 80, 80],
                texture_rotation: 90.0,
                subtitles_enabled: false,
            }],
        };

        config.save(&path).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_object_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "objects": [ { "url": "file:///a.mkv", "mesh_type": "sphere" } ] }"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.objects.len(), 1);
        let object = &config.objects[0];
        assert_eq!(object.mesh_type, "sphere");
        assert_eq!(object.scale, 1.0);
        assert_eq!(object.crop_rectangle, [0, 0, 100, 100]);
        assert!(object.subtitles_enabled);
    }

    #[test]
    fn test_objects_without_url_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "objects": [ { "mesh_type": "cube" }, { "url": "file:///a.mkv" } ] }"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.objects.len(), 1);
        assert_eq!(config.objects[0].url, "file:///a.mkv");
    }
}
