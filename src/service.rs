//! Pose service - top-level assembly for an operator session
//!
//! Owns the pose store, the motion dispatcher, the telemetry poller and the
//! publisher used to notify the front end. The robot link is constructed by
//! the caller and injected here; nothing in the crate holds it globally.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use crate::{
    config::AppConfig,
    dispatcher::{CartesianAxis, DispatchError, Direction, JointIndex, MotionDispatcher},
    link::RobotLink,
    model::{CartesianPose, JointPose, PoseKind, PoseOffset, StoredPose},
    signals::Signal,
    store::{CrossDelete, DeleteOutcome, PoseStore},
    telemetry::{TelemetryPoller, TelemetryPublisher},
    PoseError,
};

/// Failure of an operator request that may touch both store and robot
#[derive(Error, Debug)]
pub enum OperatorError {
    #[error(transparent)]
    Store(#[from] PoseError),

    #[error(transparent)]
    Motion(#[from] DispatchError),
}

pub type OperatorResult<T> = std::result::Result<T, OperatorError>;

pub struct PoseService {
    config: AppConfig,
    store: PoseStore,
    dispatcher: MotionDispatcher,
    publisher: Arc<dyn TelemetryPublisher>,
    telemetry: Option<TelemetryPoller>,
}

impl PoseService {
    /// Open the configured database (applying migrations) and wire the link
    pub fn new(
        config: AppConfig,
        link: Arc<dyn RobotLink>,
        publisher: Arc<dyn TelemetryPublisher>,
    ) -> crate::Result<Self> {
        info!("Initializing pose service");
        let store = PoseStore::open(&config.database)?;
        let dispatcher = MotionDispatcher::new(link, config.motion.clone());

        Ok(Self {
            config,
            store,
            dispatcher,
            publisher,
            telemetry: None,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &PoseStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &MotionDispatcher {
        &self.dispatcher
    }

    pub fn database_path(&self) -> &Path {
        &self.config.database.path
    }

    async fn emit(&self, signal: Signal) {
        if let Err(e) = self.publisher.publish(&signal).await {
            warn!("Failed to publish {} signal: {}", signal.topic(), e);
        }
    }

    /// Log refusals and pass the result through unchanged
    fn note_refusal<T>(result: crate::Result<T>, action: &str) -> crate::Result<T> {
        if let Err(e) = &result {
            if e.is_refusal() {
                warn!("{} refused: {}", action, e);
            }
        }
        result
    }

    // Pose CRUD

    /// Publish and return the merged pose list
    pub async fn load_poses(&self) -> crate::Result<Vec<StoredPose>> {
        let poses = self.store.load_all_poses()?;
        self.emit(Signal::PoseListChanged(poses.clone())).await;
        Ok(poses)
    }

    /// Publish the list after a committed write; a failed reload is logged
    async fn notify_pose_list(&self) {
        if let Err(e) = self.load_poses().await {
            warn!("Pose list reload failed after write: {}", e);
        }
    }

    pub async fn save_pose(&self, pose: &CartesianPose) -> crate::Result<CartesianPose> {
        info!("Saving Cartesian pose '{}'", pose.name);
        let stored = Self::note_refusal(self.store.cartesian().insert(pose), "Save")?;
        self.notify_pose_list().await;
        Ok(stored)
    }

    pub async fn save_joint_pose(&self, pose: &JointPose) -> crate::Result<JointPose> {
        info!("Saving joint pose '{}'", pose.name);
        let stored = Self::note_refusal(self.store.joints().insert(pose), "Save")?;
        self.notify_pose_list().await;
        Ok(stored)
    }

    /// Save the live TCP pose under `name`, with config `-1` if unresolvable
    pub async fn capture_pose(&self, name: &str) -> OperatorResult<CartesianPose> {
        let mut pose = self.dispatcher.sample_cartesian_pose().await?;
        pose.name = name.to_string();
        Ok(self.save_pose(&pose).await?)
    }

    pub async fn capture_joint_pose(&self, name: &str) -> OperatorResult<JointPose> {
        let mut pose = self.dispatcher.sample_joint_pose().await?;
        pose.name = name.to_string();
        Ok(self.save_joint_pose(&pose).await?)
    }

    pub async fn update_pose(&self, previous_name: &str, pose: &CartesianPose) -> crate::Result<()> {
        info!("Updating Cartesian pose '{}' as '{}'", previous_name, pose.name);
        Self::note_refusal(self.store.cartesian().update(pose, previous_name), "Update")?;
        self.notify_pose_list().await;
        Ok(())
    }

    pub async fn update_joint_pose(&self, previous_name: &str, pose: &JointPose) -> crate::Result<()> {
        info!("Updating joint pose '{}' as '{}'", previous_name, pose.name);
        Self::note_refusal(self.store.joints().update(pose, previous_name), "Update")?;
        self.notify_pose_list().await;
        Ok(())
    }

    pub async fn update_offset(&self, kind: PoseKind, name: &str, offset: &PoseOffset) -> crate::Result<()> {
        let result = match kind {
            PoseKind::Cartesian => self.store.cartesian().update_offset(name, offset),
            PoseKind::Joint => self.store.joints().update_offset(name, offset),
        };
        Self::note_refusal(result, "Offset update")?;
        self.notify_pose_list().await;
        Ok(())
    }

    /// Delete `name` from whichever tables hold it
    pub async fn delete_pose(&self, name: &str) -> crate::Result<CrossDelete> {
        let outcome = self.store.delete_everywhere(name)?;
        self.notify_pose_list().await;
        Ok(outcome)
    }

    pub async fn delete_pose_by_kind(&self, name: &str, kind: PoseKind) -> crate::Result<DeleteOutcome> {
        let outcome = self.store.delete_by_kind(name, kind)?;
        if outcome == DeleteOutcome::NotFound {
            info!("No {} pose named '{}' to delete", kind, name);
        }
        self.notify_pose_list().await;
        Ok(outcome)
    }

    pub async fn delete_all_poses(&self) -> crate::Result<usize> {
        let removed = self.store.delete_all()?;
        info!("Deleted {} poses", removed);
        self.notify_pose_list().await;
        Ok(removed)
    }

    /// Point the session at another database file
    ///
    /// The new store is migrated before it replaces the current one; on
    /// failure the session keeps using the previous database.
    pub async fn switch_database(&mut self, path: impl Into<PathBuf>) -> crate::Result<()> {
        let config = self.config.clone().with_database_path(path);
        let store = PoseStore::open(&config.database)?;

        info!("Switched pose database to {}", config.database.path.display());
        self.store = store;
        self.config = config;

        self.emit(Signal::DatabasePathChanged(self.config.database.path.clone())).await;
        self.notify_pose_list().await;
        Ok(())
    }

    // Motion

    /// Move to a stored pose; `offset` overrides the offset saved with it
    pub async fn move_to_named(
        &self,
        kind: PoseKind,
        name: &str,
        offset: Option<&PoseOffset>,
    ) -> OperatorResult<()> {
        match kind {
            PoseKind::Cartesian => {
                let pose = self.find_cartesian(name)?;
                let offset = offset.copied().unwrap_or(pose.offset);
                self.dispatcher.move_to_cartesian(&pose, Some(&offset)).await?;
            }
            PoseKind::Joint => {
                let pose = self.find_joint(name)?;
                let offset = offset.copied().unwrap_or(pose.offset);
                self.dispatcher.move_to_joint(&pose, Some(&offset)).await?;
            }
        }
        Ok(())
    }

    /// Move to a pose that isn't necessarily stored
    pub async fn move_to(&self, pose: &StoredPose, offset: Option<&PoseOffset>) -> OperatorResult<()> {
        match pose {
            StoredPose::Cartesian(p) => self.dispatcher.move_to_cartesian(p, offset).await?,
            StoredPose::Joint(p) => self.dispatcher.move_to_joint(p, offset).await?,
        }
        Ok(())
    }

    pub async fn jog_cartesian(&self, axis: CartesianAxis, direction: Direction, step: f64) -> OperatorResult<()> {
        Ok(self.dispatcher.jog_cartesian(axis, direction, step).await?)
    }

    pub async fn jog_joint(&self, joint: JointIndex, direction: Direction, step: f64) -> OperatorResult<()> {
        Ok(self.dispatcher.jog_joint(joint, direction, step).await?)
    }

    pub async fn stop(&self) {
        self.dispatcher.stop().await;
    }

    // Controller state

    pub async fn sample_current_pose(&self) -> OperatorResult<CartesianPose> {
        let pose = self.dispatcher.sample_cartesian_pose().await?;
        self.emit(Signal::CurrentPoseSampled(pose.clone())).await;
        Ok(pose)
    }

    pub async fn sample_current_joint_pose(&self) -> OperatorResult<JointPose> {
        let pose = self.dispatcher.sample_joint_pose().await?;
        self.emit(Signal::CurrentJointPoseSampled(pose.clone())).await;
        Ok(pose)
    }

    pub async fn refresh_connection_status(&self) -> (bool, String) {
        let (connected, address) = self.dispatcher.connection_status().await;
        self.emit(Signal::RobotConnectionChanged {
            connected,
            address: address.clone(),
        })
        .await;
        (connected, address)
    }

    pub fn start_telemetry(&mut self) {
        if self.telemetry.is_some() {
            return;
        }
        self.telemetry = Some(TelemetryPoller::start(
            Arc::clone(self.dispatcher.link()),
            Arc::clone(&self.publisher),
            &self.config.telemetry,
        ));
    }

    pub async fn stop_telemetry(&mut self) -> crate::Result<()> {
        match self.telemetry.take() {
            Some(poller) => poller.shutdown().await,
            None => Ok(()),
        }
    }

    fn find_cartesian(&self, name: &str) -> crate::Result<CartesianPose> {
        self.store.cartesian().find(name)?.ok_or_else(|| PoseError::NotFound {
            table: "tcp",
            name: name.to_string(),
        })
    }

    fn find_joint(&self, name: &str) -> crate::Result<JointPose> {
        self.store.joints().find(name)?.ok_or_else(|| PoseError::NotFound {
            table: "joints",
            name: name.to_string(),
        })
    }
}
