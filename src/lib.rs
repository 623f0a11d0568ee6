//! Robopose - robot pose record, replay and jog workbench
//!
//! Persists named Cartesian and joint-space poses in SQLite, keeps the schema
//! current through an idempotent migration pass, and dispatches motion to a
//! robot controller behind the [`RobotLink`] trait.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use robopose::{AppConfig, CartesianPose, ConsoleTelemetry, PoseService, SimulatedLink};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load_or_default("config/default_config.yaml")?;
//!     let link = Arc::new(SimulatedLink::new(&config.robot.host));
//!     let service = PoseService::new(config, link, Arc::new(ConsoleTelemetry::pretty()))?;
//!
//!     service.save_pose(&CartesianPose::new("pick", [400.0, 0.0, 300.0, 180.0, 0.0, 0.0])).await?;
//!     service.move_to_named(robopose::PoseKind::Cartesian, "pick", None).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **PoseService**: session assembly emitting front-end signals
//! - **PoseStore**: tcp/joints repositories over one database file
//! - **SchemaMigrator**: error-classifying migration runner
//! - **MotionDispatcher**: move, jog and stop against a `RobotLink`
//! - **TelemetryPoller**: fixed-rate status and motion readers

pub mod config;
pub mod database;
pub mod dispatcher;
pub mod error;
pub mod link;
pub mod migrations;
pub mod model;
pub mod service;
pub mod signals;
pub mod sim;
pub mod store;
pub mod telemetry;

pub use config::{AppConfig, DatabaseConfig, MotionConfig, RobotConfig, TelemetryConfig};
pub use database::Database;
pub use dispatcher::{CartesianAxis, Direction, DispatchError, JointIndex, MotionDispatcher};
pub use error::{PoseError, Result};
pub use link::{JointMove, LinkError, RobotLink, StateSnapshot};
pub use migrations::{MigrationOutcome, MigrationReport, SchemaMigrator, SkipReason};
pub use model::{CartesianPose, JointPose, PoseKind, PoseOffset, StoredPose};
pub use service::{OperatorError, PoseService};
pub use signals::{MotionTelemetry, RobotStateTriple, Signal};
pub use sim::SimulatedLink;
pub use store::{CrossDelete, DeleteOutcome, PoseStore, Repository};
pub use telemetry::{ChannelTelemetry, ConsoleTelemetry, NoOpTelemetry, TelemetryPoller, TelemetryPublisher};
