//! Configuration loading for the pose workbench

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use crate::{PoseError, Result};

/// Default location searched when no config path is given
pub const DEFAULT_CONFIG_PATH: &str = "config/default_config.yaml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub robot: RobotConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub migrations_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RobotConfig {
    pub host: String,
}

/// Fixed parameters of every joint move issued by the dispatcher
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MotionConfig {
    pub velocity_percent: Option<f64>,
    pub blend: Option<f64>,
    pub tool: Option<i32>,
    pub user: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    pub status_interval_ms: Option<u64>,
    pub motion_interval_ms: Option<u64>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("points.db"),
            migrations_dir: PathBuf::from("sql/migrations"),
        }
    }
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            host: "192.168.167.199".to_string(),
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            velocity_percent: Some(100.0),
            blend: Some(0.0),
            tool: Some(1),
            user: Some(0),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: Some(200),
            motion_interval_ms: Some(100),
        }
    }
}

impl MotionConfig {
    /// Velocity as a percentage of rated speed
    pub fn velocity(&self) -> f64 {
        self.velocity_percent.unwrap_or(100.0)
    }

    pub fn blend(&self) -> f64 {
        self.blend.unwrap_or(0.0)
    }

    pub fn tool(&self) -> i32 {
        self.tool.unwrap_or(1)
    }

    pub fn user(&self) -> i32 {
        self.user.unwrap_or(0)
    }
}

impl TelemetryConfig {
    pub fn status_interval(&self) -> u64 {
        self.status_interval_ms.unwrap_or(200).max(1)
    }

    pub fn motion_interval(&self) -> u64 {
        self.motion_interval_ms.unwrap_or(100).max(1)
    }
}

impl AppConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| PoseError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::load_from_str(&contents)
    }

    pub fn load_from_str(contents: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(contents)?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to built-in defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load_from_path(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Same configuration pointed at a different database file
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database.path = path.into();
        self
    }
}
