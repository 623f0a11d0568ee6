//! In-process simulated controller
//!
//! Stands in for the vendor SDK when no hardware is available and lets tests
//! control responses, inject failures and inspect the requests a component
//! made. Its kinematics are a toy: the joint vector equals the Cartesian pose,
//! so a move to joints `q` leaves the tool point at `q` as well.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use crate::link::{JointMove, LinkError, LinkResult, RobotLink, StateSnapshot, NO_ERROR};

#[derive(Debug, Clone)]
struct SimState {
    snapshot: StateSnapshot,
    config_hint: i32,
    speed_percent: f64,
    address: String,
    ik_requests: Vec<([f64; 6], i32)>,
    moves: Vec<JointMove>,
    ik_error: Option<i32>,
    move_result: i32,
}

#[derive(Clone)]
pub struct SimulatedLink {
    state: Arc<Mutex<SimState>>,
    /// Every call fails with a transport error
    offline: Arc<AtomicBool>,
    /// Only raw state reads fail
    state_reads_fail: Arc<AtomicBool>,
    config_reads_fail: Arc<AtomicBool>,
    stop_count: Arc<AtomicUsize>,
    reset_count: Arc<AtomicUsize>,
}

impl SimulatedLink {
    pub fn new(address: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                snapshot: StateSnapshot {
                    enable_state: 1,
                    ..StateSnapshot::default()
                },
                config_hint: 0,
                speed_percent: 100.0,
                address: address.to_string(),
                ik_requests: Vec::new(),
                moves: Vec::new(),
                ik_error: None,
                move_result: NO_ERROR,
            })),
            offline: Arc::new(AtomicBool::new(false)),
            state_reads_fail: Arc::new(AtomicBool::new(false)),
            config_reads_fail: Arc::new(AtomicBool::new(false)),
            stop_count: Arc::new(AtomicUsize::new(0)),
            reset_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn online(&self) -> LinkResult<()> {
        if self.offline.load(Ordering::Relaxed) {
            Err(LinkError::Transport("simulated controller offline".to_string()))
        } else {
            Ok(())
        }
    }

    /// Place the simulated arm at `pose` (joint vector follows the toy kinematics)
    pub fn set_pose(&self, pose: [f64; 6]) {
        let mut state = self.lock();
        state.snapshot.tcp_pose = pose;
        state.snapshot.joint_angles = pose;
    }

    pub fn set_joint_angles(&self, joints: [f64; 6]) {
        self.lock().snapshot.joint_angles = joints;
    }

    pub fn set_config_hint(&self, config: i32) {
        self.lock().config_hint = config;
    }

    pub fn set_flags(&self, emergency_stop: i32, collision: i32, enabled: i32) {
        let mut state = self.lock();
        state.snapshot.emergency_stop = emergency_stop;
        state.snapshot.collision_state = collision;
        state.snapshot.enable_state = enabled;
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    pub fn set_state_reads_fail(&self, fail: bool) {
        self.state_reads_fail.store(fail, Ordering::Relaxed);
    }

    pub fn set_config_reads_fail(&self, fail: bool) {
        self.config_reads_fail.store(fail, Ordering::Relaxed);
    }

    /// Make the solver answer with `code` (`None` restores success)
    pub fn set_ik_error(&self, code: Option<i32>) {
        self.lock().ik_error = code;
    }

    /// Result code returned by subsequent move requests
    pub fn set_move_result(&self, code: i32) {
        self.lock().move_result = code;
    }

    /// Targets and config hints passed to the solver, oldest first
    pub fn ik_requests(&self) -> Vec<([f64; 6], i32)> {
        self.lock().ik_requests.clone()
    }

    pub fn moves(&self) -> Vec<JointMove> {
        self.lock().moves.clone()
    }

    pub fn stop_count(&self) -> usize {
        self.stop_count.load(Ordering::Relaxed)
    }

    pub fn reset_count(&self) -> usize {
        self.reset_count.load(Ordering::Relaxed)
    }

    pub fn speed_percent(&self) -> f64 {
        self.lock().speed_percent
    }
}

#[async_trait]
impl RobotLink for SimulatedLink {
    async fn read_cartesian_pose(&self) -> LinkResult<[f64; 6]> {
        self.online()?;
        Ok(self.lock().snapshot.tcp_pose)
    }

    async fn read_joint_angles(&self, _selector: i32) -> LinkResult<[f64; 6]> {
        self.online()?;
        Ok(self.lock().snapshot.joint_angles)
    }

    async fn read_config_hint(&self) -> LinkResult<i32> {
        self.online()?;
        if self.config_reads_fail.load(Ordering::Relaxed) {
            return Err(LinkError::Code(-1));
        }
        Ok(self.lock().config_hint)
    }

    async fn solve_inverse_kinematics(
        &self,
        target: [f64; 6],
        _motion_type: i32,
        config: i32,
    ) -> LinkResult<[f64; 6]> {
        self.online()?;
        let mut state = self.lock();
        state.ik_requests.push((target, config));
        match state.ik_error {
            Some(code) => Err(LinkError::Code(code)),
            None => Ok(target),
        }
    }

    async fn issue_joint_move(&self, command: JointMove) -> LinkResult<i32> {
        self.online()?;
        let mut state = self.lock();
        state.moves.push(command);
        if state.move_result == NO_ERROR {
            state.snapshot.joint_angles = command.joints;
            state.snapshot.tcp_pose = command.joints;
        }
        Ok(state.move_result)
    }

    async fn stop_motion(&self) -> LinkResult<()> {
        self.online()?;
        self.stop_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn read_controller_address(&self) -> LinkResult<String> {
        self.online()?;
        Ok(self.lock().address.clone())
    }

    async fn read_raw_state(&self) -> LinkResult<StateSnapshot> {
        self.online()?;
        if self.state_reads_fail.load(Ordering::Relaxed) {
            return Err(LinkError::Transport("state snapshot unavailable".to_string()));
        }
        Ok(self.lock().snapshot.clone())
    }

    async fn set_enable(&self, enabled: bool) -> LinkResult<()> {
        self.online()?;
        self.lock().snapshot.enable_state = i32::from(enabled);
        Ok(())
    }

    async fn set_speed_percent(&self, percent: f64) -> LinkResult<()> {
        self.online()?;
        self.lock().speed_percent = percent;
        Ok(())
    }

    async fn reset_errors(&self) -> LinkResult<()> {
        self.online()?;
        self.reset_count.fetch_add(1, Ordering::Relaxed);
        let mut state = self.lock();
        state.snapshot.collision_state = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_move_updates_simulated_state() {
        let link = SimulatedLink::new("10.0.0.2");
        let command = JointMove {
            joints: [1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            tool: 1,
            user: 0,
            velocity_percent: 50.0,
            blend: 0.0,
        };
        assert_eq!(link.issue_joint_move(command).await, Ok(NO_ERROR));
        assert_eq!(link.read_joint_angles(0).await.unwrap(), command.joints);
        assert_eq!(link.read_cartesian_pose().await.unwrap(), command.joints);
        assert_eq!(link.moves().len(), 1);
    }

    #[tokio::test]
    async fn test_offline_fails_every_call() {
        let link = SimulatedLink::new("10.0.0.2");
        link.set_offline(true);
        assert!(matches!(link.read_raw_state().await, Err(LinkError::Transport(_))));
        assert!(link.stop_motion().await.is_err());
        assert_eq!(link.stop_count(), 0);
    }
}
