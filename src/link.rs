//! Robot controller link
//!
//! Transport-agnostic view of the vendor controller SDK. Every call is a
//! self-contained request/response; the only state a link holds across
//! calls is the controller connection itself. A controller result code of
//! `0` means success everywhere on this surface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Controller "no error" sentinel
pub const NO_ERROR: i32 = 0;

/// Joint readback selector meaning "all joints"
pub const ALL_JOINTS: i32 = 0;

/// Inverse kinematics motion type used for joint-space moves
pub const IK_TYPE_ABSOLUTE: i32 = 0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    #[error("controller returned error code {0}")]
    Code(i32),

    #[error("controller transport failure: {0}")]
    Transport(String),
}

pub type LinkResult<T> = std::result::Result<T, LinkError>;

/// Map a raw controller result code onto a `LinkResult`
pub fn check_code(code: i32) -> LinkResult<()> {
    if code == NO_ERROR {
        Ok(())
    } else {
        Err(LinkError::Code(code))
    }
}

/// Raw controller state as read in one call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub emergency_stop: i32,
    pub collision_state: i32,
    pub enable_state: i32,
    pub tcp_pose: [f64; 6],
    pub joint_angles: [f64; 6],
}

/// Motion parameters of a discrete joint move
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointMove {
    pub joints: [f64; 6],
    pub tool: i32,
    pub user: i32,
    pub velocity_percent: f64,
    pub blend: f64,
}

#[async_trait]
pub trait RobotLink: Send + Sync {
    /// Current tool center point pose `[x, y, z, rx, ry, rz]` (mm, deg)
    async fn read_cartesian_pose(&self) -> LinkResult<[f64; 6]>;

    /// Current joint angles in degrees
    async fn read_joint_angles(&self, selector: i32) -> LinkResult<[f64; 6]>;

    /// Arm configuration index of the current joint position
    async fn read_config_hint(&self) -> LinkResult<i32>;

    async fn solve_inverse_kinematics(
        &self,
        target: [f64; 6],
        motion_type: i32,
        config: i32,
    ) -> LinkResult<[f64; 6]>;

    /// Returns the raw controller result code of the move request
    async fn issue_joint_move(&self, command: JointMove) -> LinkResult<i32>;

    async fn stop_motion(&self) -> LinkResult<()>;

    async fn read_controller_address(&self) -> LinkResult<String>;

    async fn read_raw_state(&self) -> LinkResult<StateSnapshot>;

    async fn set_enable(&self, enabled: bool) -> LinkResult<()>;

    async fn set_speed_percent(&self, percent: f64) -> LinkResult<()>;

    async fn reset_errors(&self) -> LinkResult<()>;
}
