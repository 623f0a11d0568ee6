//! Motion dispatch
//!
//! Turns stored or ad-hoc poses into joint moves on the controller. Cartesian
//! targets are resolved through the controller's inverse kinematics using
//! the pose's saved arm configuration, or the live one when the saved value
//! is unknown. Every operation reports failure as a `DispatchError` value;
//! nothing here panics or persists anything, and a failed operation never
//! issues a partial command.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use crate::{
    config::MotionConfig,
    link::{check_code, JointMove, LinkError, RobotLink, ALL_JOINTS, IK_TYPE_ABSOLUTE},
    model::{CartesianPose, JointPose, PoseOffset, UNKNOWN_CONFIG},
};

/// Address reported when the controller can't tell us its own
pub const UNKNOWN_ADDRESS: &str = "0.0.0.0";

/// Name given to poses sampled from the live controller
pub const SAMPLED_POSE_NAME: &str = "current";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("robot link unavailable: {0}")]
    LinkUnavailable(String),

    #[error("inverse kinematics unsolvable (code {0})")]
    KinematicsUnsolvable(i32),

    #[error("controller rejected motion command (code {0})")]
    CommandRejected(i32),
}

impl From<LinkError> for DispatchError {
    fn from(e: LinkError) -> Self {
        DispatchError::LinkUnavailable(e.to_string())
    }
}

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

/// Cartesian axis selectable for jogging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartesianAxis {
    X,
    Y,
    Z,
    Rx,
    Ry,
    Rz,
}

impl CartesianAxis {
    pub fn index(&self) -> usize {
        match self {
            CartesianAxis::X => 0,
            CartesianAxis::Y => 1,
            CartesianAxis::Z => 2,
            CartesianAxis::Rx => 3,
            CartesianAxis::Ry => 4,
            CartesianAxis::Rz => 5,
        }
    }
}

impl FromStr for CartesianAxis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x" => Ok(CartesianAxis::X),
            "y" => Ok(CartesianAxis::Y),
            "z" => Ok(CartesianAxis::Z),
            "rx" => Ok(CartesianAxis::Rx),
            "ry" => Ok(CartesianAxis::Ry),
            "rz" => Ok(CartesianAxis::Rz),
            other => Err(format!("unknown axis '{}' (expected x, y, z, rx, ry or rz)", other)),
        }
    }
}

/// Joint number, 1 through 6
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8")]
pub struct JointIndex(u8);

impl JointIndex {
    pub fn new(joint: u8) -> Option<Self> {
        (1..=6).contains(&joint).then_some(Self(joint))
    }

    /// Zero-based position in a joint vector
    pub fn slot(&self) -> usize {
        usize::from(self.0 - 1)
    }
}

impl TryFrom<u8> for JointIndex {
    type Error = String;

    fn try_from(joint: u8) -> Result<Self, Self::Error> {
        JointIndex::new(joint).ok_or_else(|| format!("invalid joint {} (expected 1-6)", joint))
    }
}

impl FromStr for JointIndex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim_start_matches(['j', 'J']);
        trimmed
            .parse::<u8>()
            .ok()
            .and_then(JointIndex::new)
            .ok_or_else(|| format!("invalid joint '{}' (expected 1-6)", s))
    }
}

impl fmt::Display for JointIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "j{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Positive => 1.0,
            Direction::Negative => -1.0,
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" | "+1" | "1" | "pos" | "positive" => Ok(Direction::Positive),
            "-" | "-1" | "neg" | "negative" => Ok(Direction::Negative),
            other => Err(format!("invalid direction '{}' (expected + or -)", other)),
        }
    }
}

pub struct MotionDispatcher {
    link: Arc<dyn RobotLink>,
    motion: MotionConfig,
}

impl MotionDispatcher {
    pub fn new(link: Arc<dyn RobotLink>, motion: MotionConfig) -> Self {
        Self { link, motion }
    }

    pub fn link(&self) -> &Arc<dyn RobotLink> {
        &self.link
    }

    /// Move to `base ⊕ offset` via inverse kinematics
    pub async fn move_to_cartesian(
        &self,
        base: &CartesianPose,
        offset: Option<&PoseOffset>,
    ) -> DispatchResult<()> {
        let offset = offset.copied().unwrap_or_default();
        let target = offset.apply(base.base());

        // Saved configuration wins; -1 asks the controller
        let config = if base.config == UNKNOWN_CONFIG {
            debug!("Pose '{}' has no saved configuration, querying controller", base.name);
            self.live_config().await?
        } else {
            base.config
        };

        info!("Moving to Cartesian pose '{}' at {:?} (config {})", base.name, target, config);
        let joints = self.solve(target, config).await?;
        self.issue_move(joints).await
    }

    /// Move to `base ⊕ offset` directly in joint space
    pub async fn move_to_joint(
        &self,
        base: &JointPose,
        offset: Option<&PoseOffset>,
    ) -> DispatchResult<()> {
        let offset = offset.copied().unwrap_or_default();
        let target = offset.apply(base.base());

        info!("Moving to joint pose '{}' at {:?}", base.name, target);
        self.issue_move(target).await
    }

    /// Nudge one Cartesian axis of the live pose by `direction * step`
    ///
    /// The target is a new absolute pose one step from the current one. The
    /// caller issues `stop()` when the operator releases the jog control.
    pub async fn jog_cartesian(
        &self,
        axis: CartesianAxis,
        direction: Direction,
        step: f64,
    ) -> DispatchResult<()> {
        let mut target = self.link.read_cartesian_pose().await.map_err(|e| {
            error!("Jog aborted, could not read current pose: {}", e);
            DispatchError::from(e)
        })?;
        target[axis.index()] += direction.sign() * step;

        let config = self.live_config().await?;
        debug!("Jogging {:?} {:?} by {} to {:?}", axis, direction, step, target);
        let joints = self.solve(target, config).await?;
        self.issue_move(joints).await
    }

    /// Nudge one joint of the live joint vector by `direction * step`
    pub async fn jog_joint(
        &self,
        joint: JointIndex,
        direction: Direction,
        step: f64,
    ) -> DispatchResult<()> {
        let mut target = self.link.read_joint_angles(ALL_JOINTS).await.map_err(|e| {
            error!("Jog aborted, could not read joint angles: {}", e);
            DispatchError::from(e)
        })?;
        target[joint.slot()] += direction.sign() * step;

        debug!("Jogging {} {:?} by {} to {:?}", joint, direction, step, target);
        self.issue_move(target).await
    }

    /// Request a motion stop; always safe to call
    pub async fn stop(&self) {
        match self.link.stop_motion().await {
            Ok(()) => info!("Motion stop requested"),
            Err(e) => warn!("Motion stop request failed: {}", e),
        }
    }

    /// Live TCP pose with the live configuration hint, ready to be named and saved
    pub async fn sample_cartesian_pose(&self) -> DispatchResult<CartesianPose> {
        let pose = self.link.read_cartesian_pose().await?;
        let config = self.config_or_unknown().await;
        let mut sampled = CartesianPose::new(SAMPLED_POSE_NAME, pose).with_config(config);
        sampled.created_at = Some(Local::now().to_rfc3339());
        Ok(sampled)
    }

    pub async fn sample_joint_pose(&self) -> DispatchResult<JointPose> {
        let joints = self.link.read_joint_angles(ALL_JOINTS).await?;
        let config = self.config_or_unknown().await;
        let mut sampled = JointPose::new(SAMPLED_POSE_NAME, joints).with_config(config);
        sampled.created_at = Some(Local::now().to_rfc3339());
        Ok(sampled)
    }

    /// `(connected, address)`; an unreadable address means disconnected
    pub async fn connection_status(&self) -> (bool, String) {
        match self.link.read_controller_address().await {
            Ok(address) => (true, address),
            Err(e) => {
                debug!("Controller address unavailable: {}", e);
                (false, UNKNOWN_ADDRESS.to_string())
            }
        }
    }

    pub async fn set_enable(&self, enabled: bool) -> DispatchResult<()> {
        info!("Setting robot enable to {}", enabled);
        Ok(self.link.set_enable(enabled).await?)
    }

    pub async fn set_speed_percent(&self, percent: f64) -> DispatchResult<()> {
        info!("Setting global speed to {}%", percent);
        Ok(self.link.set_speed_percent(percent).await?)
    }

    pub async fn reset_errors(&self) -> DispatchResult<()> {
        info!("Resetting controller errors");
        Ok(self.link.reset_errors().await?)
    }

    async fn live_config(&self) -> DispatchResult<i32> {
        self.link.read_config_hint().await.map_err(|e| {
            error!("Could not read arm configuration: {}", e);
            DispatchError::from(e)
        })
    }

    /// Live configuration hint, or the unknown sentinel when it can't be read
    async fn config_or_unknown(&self) -> i32 {
        match self.link.read_config_hint().await {
            Ok(config) => config,
            Err(e) => {
                debug!("Configuration hint unavailable, storing {}: {}", UNKNOWN_CONFIG, e);
                UNKNOWN_CONFIG
            }
        }
    }

    async fn solve(&self, target: [f64; 6], config: i32) -> DispatchResult<[f64; 6]> {
        match self
            .link
            .solve_inverse_kinematics(target, IK_TYPE_ABSOLUTE, config)
            .await
        {
            Ok(joints) => Ok(joints),
            Err(LinkError::Code(code)) => {
                error!("Inverse kinematics failed for {:?} (code {}), no move issued", target, code);
                Err(DispatchError::KinematicsUnsolvable(code))
            }
            Err(e) => {
                error!("Inverse kinematics request failed: {}", e);
                Err(e.into())
            }
        }
    }

    async fn issue_move(&self, joints: [f64; 6]) -> DispatchResult<()> {
        let command = JointMove {
            joints,
            tool: self.motion.tool(),
            user: self.motion.user(),
            velocity_percent: self.motion.velocity(),
            blend: self.motion.blend(),
        };

        let code = self.link.issue_joint_move(command).await.map_err(|e| {
            error!("Joint move request failed: {}", e);
            DispatchError::from(e)
        })?;

        check_code(code).map_err(|_| {
            warn!("Controller rejected joint move with code {}", code);
            DispatchError::CommandRejected(code)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedLink;

    fn dispatcher() -> (Arc<SimulatedLink>, MotionDispatcher) {
        let link = Arc::new(SimulatedLink::new("192.168.167.199"));
        let dispatcher = MotionDispatcher::new(link.clone(), MotionConfig::default());
        (link, dispatcher)
    }

    const START: [f64; 6] = [100.0, 200.0, 300.0, 180.0, 0.0, 90.0];

    #[tokio::test]
    async fn test_jog_cartesian_positive_and_negative() {
        let (link, dispatcher) = dispatcher();
        link.set_pose(START);
        link.set_config_hint(2);

        dispatcher.jog_cartesian(CartesianAxis::X, Direction::Positive, 5.0).await.unwrap();
        link.set_pose(START);
        dispatcher.jog_cartesian(CartesianAxis::X, Direction::Negative, 5.0).await.unwrap();

        let requests = link.ik_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].0, [105.0, 200.0, 300.0, 180.0, 0.0, 90.0]);
        assert_eq!(requests[1].0, [95.0, 200.0, 300.0, 180.0, 0.0, 90.0]);
        assert_eq!(requests[0].1, 2);
    }

    #[tokio::test]
    async fn test_jog_joint_moves_single_joint() {
        let (link, dispatcher) = dispatcher();
        link.set_joint_angles([0.0, -90.0, 90.0, 0.0, 90.0, 0.0]);

        let joint: JointIndex = "j3".parse().unwrap();
        dispatcher.jog_joint(joint, Direction::Negative, 2.5).await.unwrap();

        let moves = link.moves();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].joints, [0.0, -90.0, 87.5, 0.0, 90.0, 0.0]);
        assert!(link.ik_requests().is_empty());
    }

    #[tokio::test]
    async fn test_cartesian_move_applies_offset_and_saved_config() {
        let (link, dispatcher) = dispatcher();
        link.set_config_hint(7);
        let base = CartesianPose::new("pick", START).with_config(3);
        let offset = PoseOffset::from_array([0.0, 0.0, -10.0, 0.0, 0.0, 0.0]);

        dispatcher.move_to_cartesian(&base, Some(&offset)).await.unwrap();

        let requests = link.ik_requests();
        assert_eq!(requests, vec![([100.0, 200.0, 290.0, 180.0, 0.0, 90.0], 3)]);
        let moves = link.moves();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].tool, 1);
        assert_eq!(moves[0].user, 0);
        assert_eq!(moves[0].blend, 0.0);
        assert_eq!(moves[0].velocity_percent, 100.0);
    }

    #[tokio::test]
    async fn test_unknown_config_requeries_controller() {
        let (link, dispatcher) = dispatcher();
        link.set_config_hint(5);
        let base = CartesianPose::new("unsolved", START);
        assert_eq!(base.config, UNKNOWN_CONFIG);

        dispatcher.move_to_cartesian(&base, None).await.unwrap();
        assert_eq!(link.ik_requests()[0].1, 5);
    }

    #[tokio::test]
    async fn test_unsolvable_target_issues_no_move() {
        let (link, dispatcher) = dispatcher();
        link.set_ik_error(Some(-14));
        let base = CartesianPose::new("far", START).with_config(0);

        let err = dispatcher.move_to_cartesian(&base, None).await.unwrap_err();
        assert_eq!(err, DispatchError::KinematicsUnsolvable(-14));
        assert!(link.moves().is_empty());
    }

    #[tokio::test]
    async fn test_config_read_failure_aborts_before_solving() {
        let (link, dispatcher) = dispatcher();
        link.set_config_reads_fail(true);
        let base = CartesianPose::new("unsolved", START);

        let err = dispatcher.move_to_cartesian(&base, None).await.unwrap_err();
        assert!(matches!(err, DispatchError::LinkUnavailable(_)));
        assert!(link.ik_requests().is_empty());
        assert!(link.moves().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_move_is_reported() {
        let (link, dispatcher) = dispatcher();
        link.set_move_result(101);
        let base = JointPose::new("home", [0.0; 6]);

        let err = dispatcher.move_to_joint(&base, None).await.unwrap_err();
        assert_eq!(err, DispatchError::CommandRejected(101));
    }

    #[tokio::test]
    async fn test_joint_move_with_offset() {
        let (link, dispatcher) = dispatcher();
        let base = JointPose::new("home", [10.0, 20.0, 30.0, 40.0, 50.0, 60.0]);
        let offset = PoseOffset::from_array([1.0, 1.0, 1.0, -1.0, -1.0, -1.0]);

        dispatcher.move_to_joint(&base, Some(&offset)).await.unwrap();
        assert_eq!(link.moves()[0].joints, [11.0, 21.0, 31.0, 39.0, 49.0, 59.0]);
    }

    #[tokio::test]
    async fn test_offline_link_degrades_without_panicking() {
        let (link, dispatcher) = dispatcher();
        link.set_offline(true);

        let err = dispatcher
            .jog_cartesian(CartesianAxis::Rz, Direction::Positive, 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::LinkUnavailable(_)));

        dispatcher.stop().await;
        assert_eq!(dispatcher.connection_status().await, (false, UNKNOWN_ADDRESS.to_string()));
        assert!(link.moves().is_empty());
    }

    #[tokio::test]
    async fn test_stop_is_safe_when_idle() {
        let (link, dispatcher) = dispatcher();
        dispatcher.stop().await;
        dispatcher.stop().await;
        assert_eq!(link.stop_count(), 2);
    }

    #[tokio::test]
    async fn test_sampled_pose_keeps_unknown_config_when_unresolvable() {
        let (link, dispatcher) = dispatcher();
        link.set_pose(START);
        link.set_config_reads_fail(true);

        let sampled = dispatcher.sample_cartesian_pose().await.unwrap();
        assert_eq!(sampled.base(), START);
        assert_eq!(sampled.config, UNKNOWN_CONFIG);
        assert!(sampled.created_at.is_some());

        link.set_config_reads_fail(false);
        link.set_config_hint(4);
        let joints = dispatcher.sample_joint_pose().await.unwrap();
        assert_eq!(joints.config, 4);
    }

    #[tokio::test]
    async fn test_controller_controls() {
        let (link, dispatcher) = dispatcher();
        dispatcher.set_speed_percent(25.0).await.unwrap();
        dispatcher.reset_errors().await.unwrap();
        dispatcher.set_enable(false).await.unwrap();

        assert_eq!(link.speed_percent(), 25.0);
        assert_eq!(link.reset_count(), 1);
        assert_eq!(link.read_raw_state().await.unwrap().enable_state, 0);
    }

    #[test]
    fn test_axis_and_joint_parsing() {
        assert_eq!("RX".parse::<CartesianAxis>().unwrap(), CartesianAxis::Rx);
        assert!("w".parse::<CartesianAxis>().is_err());
        assert_eq!("6".parse::<JointIndex>().unwrap().slot(), 5);
        assert!("j0".parse::<JointIndex>().is_err());
        assert!("7".parse::<JointIndex>().is_err());
        assert_eq!("-".parse::<Direction>().unwrap().sign(), -1.0);
    }

    #[test]
    fn test_joint_index_deserialization_is_range_checked() {
        let joint: JointIndex = serde_json::from_str("4").unwrap();
        assert_eq!(joint.slot(), 3);
        assert!(serde_json::from_str::<JointIndex>("0").is_err());
        assert!(serde_json::from_str::<JointIndex>("7").is_err());
        assert_eq!(serde_json::to_string(&joint).unwrap(), "4");
    }
}
