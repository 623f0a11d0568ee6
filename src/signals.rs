//! Signals published to the operator front end

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use crate::model::{CartesianPose, JointPose, StoredPose};

/// Status flags value published when the controller state could not be read
pub const UNKNOWN_FLAG: i32 = -1;

/// Get current timestamp as f64 seconds since UNIX epoch
pub fn current_timestamp() -> f64 {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();

    (timestamp * 1_000_000.0).round() / 1_000_000.0
}

/// Emergency-stop, collision and enable flags as reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotStateTriple {
    pub emergency_stop: i32,
    pub collision: i32,
    pub enabled: i32,
}

impl RobotStateTriple {
    /// The "could not read" triple, distinct from a legitimate all-zero state
    pub fn unknown() -> Self {
        Self {
            emergency_stop: UNKNOWN_FLAG,
            collision: UNKNOWN_FLAG,
            enabled: UNKNOWN_FLAG,
        }
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::unknown()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionTelemetry {
    /// Tool center point `[x, y, z, rx, ry, rz]` (mm, deg)
    pub tcp_pose: [f64; 6],
    /// Joint angles in degrees
    pub joint_angles: [f64; 6],
    pub stime: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", content = "data", rename_all = "snake_case")]
pub enum Signal {
    PoseListChanged(Vec<StoredPose>),
    CurrentPoseSampled(CartesianPose),
    CurrentJointPoseSampled(JointPose),
    DatabasePathChanged(PathBuf),
    RobotConnectionChanged { connected: bool, address: String },
    RobotStateChanged(RobotStateTriple),
    MotionTelemetryChanged(MotionTelemetry),
}

impl Signal {
    /// Short topic name used by line-oriented publishers
    pub fn topic(&self) -> &'static str {
        match self {
            Signal::PoseListChanged(_) => "poses",
            Signal::CurrentPoseSampled(_) => "current_pose",
            Signal::CurrentJointPoseSampled(_) => "current_joint_pose",
            Signal::DatabasePathChanged(_) => "database",
            Signal::RobotConnectionChanged { .. } => "connection",
            Signal::RobotStateChanged(_) => "state",
            Signal::MotionTelemetryChanged(_) => "motion",
        }
    }
}
