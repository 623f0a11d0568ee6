//! Telemetry publishing and polling
//!
//! `TelemetryPublisher` decouples signal delivery from any particular front
//! end. `TelemetryPoller` runs the two fixed-rate controller readers:
//!
//! - the status loop publishes the emergency-stop/collision/enable triple
//!   every tick, or `(-1, -1, -1)` when the controller state can't be read;
//! - the motion loop publishes TCP pose and joint angles every tick and
//!   silently skips ticks whose read fails, leaving the last values in place.
//!
//! Both loops only read from the link. They never command motion and never
//! touch the pose store.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use crate::{
    config::TelemetryConfig,
    link::RobotLink,
    signals::{current_timestamp, MotionTelemetry, RobotStateTriple, Signal},
    Result,
};

/// Trait for publishing signals to whatever front end is attached
#[async_trait]
pub trait TelemetryPublisher: Send + Sync {
    async fn publish(&self, signal: &Signal) -> anyhow::Result<()>;
}

/// Discards everything
#[derive(Debug, Clone)]
pub struct NoOpTelemetry;

#[async_trait]
impl TelemetryPublisher for NoOpTelemetry {
    async fn publish(&self, _signal: &Signal) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Prints every signal to stdout as a JSON line prefixed by its topic
#[derive(Debug, Clone)]
pub struct ConsoleTelemetry {
    pub pretty_print: bool,
}

impl ConsoleTelemetry {
    pub fn new() -> Self {
        Self { pretty_print: false }
    }

    pub fn pretty() -> Self {
        Self { pretty_print: true }
    }
}

impl Default for ConsoleTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetryPublisher for ConsoleTelemetry {
    async fn publish(&self, signal: &Signal) -> anyhow::Result<()> {
        let topic = signal.topic().to_uppercase();
        if self.pretty_print {
            println!("[{}] {}", topic, serde_json::to_string_pretty(signal)?);
        } else {
            println!("[{}] {}", topic, serde_json::to_string(signal)?);
        }
        Ok(())
    }
}

/// Forwards signals into a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelTelemetry {
    sender: mpsc::UnboundedSender<Signal>,
}

impl ChannelTelemetry {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Signal>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl TelemetryPublisher for ChannelTelemetry {
    async fn publish(&self, signal: &Signal) -> anyhow::Result<()> {
        self.sender
            .send(signal.clone())
            .map_err(|_| anyhow::anyhow!("signal receiver dropped"))
    }
}

/// One status-loop tick: read the flags, or the unknown triple on failure
pub async fn sample_status(link: &dyn RobotLink) -> RobotStateTriple {
    match link.read_raw_state().await {
        Ok(snapshot) => RobotStateTriple {
            emergency_stop: snapshot.emergency_stop,
            collision: snapshot.collision_state,
            enabled: snapshot.enable_state,
        },
        Err(e) => {
            debug!("Status read failed: {}", e);
            RobotStateTriple::unknown()
        }
    }
}

/// One motion-loop tick: `None` when the read failed and the tick is skipped
pub async fn sample_motion(link: &dyn RobotLink) -> Option<MotionTelemetry> {
    match link.read_raw_state().await {
        Ok(snapshot) => Some(MotionTelemetry {
            tcp_pose: snapshot.tcp_pose,
            joint_angles: snapshot.joint_angles,
            stime: current_timestamp(),
        }),
        Err(e) => {
            debug!("Motion telemetry read failed, skipping tick: {}", e);
            None
        }
    }
}

pub struct TelemetryPoller {
    handles: Vec<JoinHandle<()>>,
    shutdown_signal: Arc<AtomicBool>,
}

impl TelemetryPoller {
    /// Spawn both loops on the current tokio runtime
    pub fn start(
        link: Arc<dyn RobotLink>,
        publisher: Arc<dyn TelemetryPublisher>,
        config: &TelemetryConfig,
    ) -> Self {
        let shutdown_signal = Arc::new(AtomicBool::new(false));
        let status_every = Duration::from_millis(config.status_interval());
        let motion_every = Duration::from_millis(config.motion_interval());

        info!(
            "Starting telemetry: status every {:?}, motion every {:?}",
            status_every, motion_every
        );

        let handles = vec![
            Self::spawn_status_loop(
                Arc::clone(&link),
                Arc::clone(&publisher),
                status_every,
                Arc::clone(&shutdown_signal),
            ),
            Self::spawn_motion_loop(link, publisher, motion_every, Arc::clone(&shutdown_signal)),
        ];

        Self {
            handles,
            shutdown_signal,
        }
    }

    fn spawn_status_loop(
        link: Arc<dyn RobotLink>,
        publisher: Arc<dyn TelemetryPublisher>,
        every: Duration,
        shutdown_signal: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            while !shutdown_signal.load(Ordering::Relaxed) {
                ticker.tick().await;
                if shutdown_signal.load(Ordering::Relaxed) {
                    break;
                }

                let triple = sample_status(link.as_ref()).await;
                if let Err(e) = publisher.publish(&Signal::RobotStateChanged(triple)).await {
                    warn!("Failed to publish robot state: {}", e);
                }
            }
            debug!("Status loop stopped");
        })
    }

    fn spawn_motion_loop(
        link: Arc<dyn RobotLink>,
        publisher: Arc<dyn TelemetryPublisher>,
        every: Duration,
        shutdown_signal: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            while !shutdown_signal.load(Ordering::Relaxed) {
                ticker.tick().await;
                if shutdown_signal.load(Ordering::Relaxed) {
                    break;
                }

                let Some(sample) = sample_motion(link.as_ref()).await else {
                    continue;
                };
                if let Err(e) = publisher.publish(&Signal::MotionTelemetryChanged(sample)).await {
                    warn!("Failed to publish motion telemetry: {}", e);
                }
            }
            debug!("Motion loop stopped");
        })
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown_signal.load(Ordering::Relaxed)
            && self.handles.iter().any(|h| !h.is_finished())
    }

    /// Stop both loops and wait for them to exit
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Stopping telemetry loops");
        self.shutdown_signal.store(true, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            handle.await?;
        }
        Ok(())
    }
}

impl Drop for TelemetryPoller {
    fn drop(&mut self) {
        self.shutdown_signal.store(true, Ordering::Relaxed);
    }
}
