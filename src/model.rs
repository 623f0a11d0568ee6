//! Pose records
//!
//! Cartesian poses are expressed in millimeters and degrees, joint poses in
//! degrees. Both carry a transient offset that is added at dispatch time and
//! an arm configuration index where `-1` means "unknown".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Arm configuration value meaning "no configuration hint available"
pub const UNKNOWN_CONFIG: i32 = -1;

/// Delta added to a base pose at dispatch time
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseOffset {
    #[serde(default)]
    pub dx: f64,
    #[serde(default)]
    pub dy: f64,
    #[serde(default)]
    pub dz: f64,
    #[serde(default)]
    pub drx: f64,
    #[serde(default)]
    pub dry: f64,
    #[serde(default)]
    pub drz: f64,
}

impl PoseOffset {
    pub fn from_array(v: [f64; 6]) -> Self {
        Self {
            dx: v[0],
            dy: v[1],
            dz: v[2],
            drx: v[3],
            dry: v[4],
            drz: v[5],
        }
    }

    pub fn to_array(&self) -> [f64; 6] {
        [self.dx, self.dy, self.dz, self.drx, self.dry, self.drz]
    }

    pub fn is_zero(&self) -> bool {
        self.to_array().iter().all(|v| *v == 0.0)
    }

    /// Component-wise `base + self`
    pub fn apply(&self, base: [f64; 6]) -> [f64; 6] {
        let delta = self.to_array();
        let mut out = base;
        for (value, d) in out.iter_mut().zip(delta.iter()) {
            *value += d;
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartesianPose {
    pub id: Option<i64>,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
    #[serde(flatten)]
    pub offset: PoseOffset,
    pub config: i32,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointPose {
    pub id: Option<i64>,
    pub name: String,
    pub j1: f64,
    pub j2: f64,
    pub j3: f64,
    pub j4: f64,
    pub j5: f64,
    pub j6: f64,
    #[serde(flatten)]
    pub offset: PoseOffset,
    pub config: i32,
    pub created_at: Option<String>,
}

impl CartesianPose {
    /// Unsaved pose with no offset and an unknown configuration
    pub fn new(name: impl Into<String>, pose: [f64; 6]) -> Self {
        Self {
            id: None,
            name: name.into(),
            x: pose[0],
            y: pose[1],
            z: pose[2],
            rx: pose[3],
            ry: pose[4],
            rz: pose[5],
            offset: PoseOffset::default(),
            config: UNKNOWN_CONFIG,
            created_at: None,
        }
    }

    pub fn with_config(mut self, config: i32) -> Self {
        self.config = config;
        self
    }

    pub fn base(&self) -> [f64; 6] {
        [self.x, self.y, self.z, self.rx, self.ry, self.rz]
    }
}

impl JointPose {
    pub fn new(name: impl Into<String>, joints: [f64; 6]) -> Self {
        Self {
            id: None,
            name: name.into(),
            j1: joints[0],
            j2: joints[1],
            j3: joints[2],
            j4: joints[3],
            j5: joints[4],
            j6: joints[5],
            offset: PoseOffset::default(),
            config: UNKNOWN_CONFIG,
            created_at: None,
        }
    }

    pub fn with_config(mut self, config: i32) -> Self {
        self.config = config;
        self
    }

    pub fn base(&self) -> [f64; 6] {
        [self.j1, self.j2, self.j3, self.j4, self.j5, self.j6]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoseKind {
    Cartesian,
    Joint,
}

impl fmt::Display for PoseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoseKind::Cartesian => write!(f, "cartesian"),
            PoseKind::Joint => write!(f, "joint"),
        }
    }
}

impl FromStr for PoseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cartesian" | "tcp" => Ok(PoseKind::Cartesian),
            "joint" | "joints" => Ok(PoseKind::Joint),
            other => Err(format!("unknown pose kind '{}' (expected cartesian or joint)", other)),
        }
    }
}

/// A record from either table, tagged for merged display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoredPose {
    Cartesian(CartesianPose),
    Joint(JointPose),
}

impl StoredPose {
    pub fn kind(&self) -> PoseKind {
        match self {
            StoredPose::Cartesian(_) => PoseKind::Cartesian,
            StoredPose::Joint(_) => PoseKind::Joint,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            StoredPose::Cartesian(p) => &p.name,
            StoredPose::Joint(p) => &p.name,
        }
    }
}
