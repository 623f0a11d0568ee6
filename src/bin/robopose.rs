//! Robopose operator CLI
//!
//! Record, edit, replay and jog robot poses from the command line. The
//! vendor controller SDK is not bundled, so motion is driven through the
//! in-process simulated controller addressed at the configured host.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use robopose::{
    config::DEFAULT_CONFIG_PATH, AppConfig, CartesianAxis, CartesianPose, ConsoleTelemetry,
    DeleteOutcome, Direction, JointIndex, JointPose, PoseKind, PoseOffset, PoseService,
    PoseStore, SimulatedLink, StoredPose,
};
use robopose::model::UNKNOWN_CONFIG;

#[derive(Parser)]
#[command(name = "robopose")]
#[command(about = "Record, replay and jog robot poses")]
#[command(version)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Pose database file, overriding the configured path
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Controller address, overriding the configured host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Args {
    fn get_config_path(&self) -> PathBuf {
        self.config
            .clone()
            .or_else(|| std::env::var("ROBOPOSE_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations and report each unit
    Migrate,
    /// List stored poses from both tables
    List {
        /// Print the merged list as JSON
        #[arg(long)]
        json: bool,
    },
    /// Save a Cartesian pose: x y z rx ry rz (mm, deg)
    Save {
        name: String,
        #[arg(num_args = 6, allow_negative_numbers = true)]
        values: Vec<f64>,
        /// Arm configuration index (-1 = unknown)
        #[arg(long = "arm-config", default_value_t = -1, allow_negative_numbers = true)]
        arm_config: i32,
    },
    /// Save a joint pose: j1 .. j6 (deg)
    SaveJoint {
        name: String,
        #[arg(num_args = 6, allow_negative_numbers = true)]
        values: Vec<f64>,
        /// Arm configuration index (-1 = unknown)
        #[arg(long = "arm-config", default_value_t = -1, allow_negative_numbers = true)]
        arm_config: i32,
    },
    /// Save the robot's current pose under a name
    Capture {
        name: String,
        /// Record joint angles instead of the tool pose
        #[arg(long)]
        joint: bool,
    },
    /// Replace a Cartesian pose, optionally renaming it
    Update {
        name: String,
        #[arg(num_args = 6, allow_negative_numbers = true)]
        values: Vec<f64>,
        #[arg(long)]
        rename: Option<String>,
        /// Arm configuration index; keeps the stored one when omitted
        #[arg(long = "arm-config", allow_negative_numbers = true)]
        arm_config: Option<i32>,
    },
    /// Replace a joint pose, optionally renaming it
    UpdateJoint {
        name: String,
        #[arg(num_args = 6, allow_negative_numbers = true)]
        values: Vec<f64>,
        #[arg(long)]
        rename: Option<String>,
        /// Arm configuration index; keeps the stored one when omitted
        #[arg(long = "arm-config", allow_negative_numbers = true)]
        arm_config: Option<i32>,
    },
    /// Set the stored offset of a pose
    Offset {
        kind: PoseKind,
        name: String,
        #[arg(num_args = 6, allow_negative_numbers = true)]
        values: Vec<f64>,
    },
    /// Delete a pose by name, from one table or both
    Delete {
        name: String,
        #[arg(long)]
        kind: Option<PoseKind>,
    },
    /// Delete every stored pose
    DeleteAll,
    /// Move to a stored pose
    Move {
        kind: PoseKind,
        name: String,
        /// Offset applied instead of the stored one: dx dy dz drx dry drz
        #[arg(long, num_args = 6, allow_negative_numbers = true)]
        offset: Option<Vec<f64>>,
    },
    /// Step the tool along one Cartesian axis
    Jog {
        axis: CartesianAxis,
        #[arg(allow_hyphen_values = true)]
        direction: Direction,
        #[arg(long, default_value_t = 5.0)]
        step: f64,
    },
    /// Step a single joint
    JogJoint {
        joint: JointIndex,
        #[arg(allow_hyphen_values = true)]
        direction: Direction,
        #[arg(long, default_value_t = 5.0)]
        step: f64,
    },
    /// Stop all motion
    Stop,
    /// Show connection, current pose and joint angles
    Status,
    /// Stream controller telemetry to stdout
    Monitor {
        /// Stop after this many seconds (runs until Ctrl-C otherwise)
        #[arg(long)]
        duration_secs: Option<u64>,
    },
}

fn six(values: &[f64], what: &str) -> Result<[f64; 6]> {
    values
        .try_into()
        .map_err(|_| anyhow::anyhow!("{} needs exactly 6 values, got {}", what, values.len()))
}

/// Explicit value, else the stored record's configuration, else unknown
fn resolve_arm_config(
    service: &PoseService,
    kind: PoseKind,
    name: &str,
    explicit: Option<i32>,
) -> Result<i32> {
    if let Some(config) = explicit {
        return Ok(config);
    }
    let stored = match kind {
        PoseKind::Cartesian => service.store().cartesian().find(name)?.map(|p| p.config),
        PoseKind::Joint => service.store().joints().find(name)?.map(|p| p.config),
    };
    Ok(stored.unwrap_or(UNKNOWN_CONFIG))
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", text);
    Ok(())
}

fn print_poses(poses: &[StoredPose]) {
    if poses.is_empty() {
        println!("No stored poses");
        return;
    }
    for pose in poses {
        match pose {
            StoredPose::Cartesian(p) => println!(
                "[cartesian] {:<20} x={:.3} y={:.3} z={:.3} rx={:.3} ry={:.3} rz={:.3} config={}",
                p.name, p.x, p.y, p.z, p.rx, p.ry, p.rz, p.config
            ),
            StoredPose::Joint(p) => println!(
                "[joint]     {:<20} j1={:.3} j2={:.3} j3={:.3} j4={:.3} j5={:.3} j6={:.3}",
                p.name, p.j1, p.j2, p.j3, p.j4, p.j5, p.j6
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = args.get_config_path();
    let mut config = AppConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    if let Some(database) = &args.database {
        config = config.with_database_path(database);
    }
    if let Some(host) = &args.host {
        config.robot.host = host.clone();
    }

    if let Err(e) = run(args, config).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(args: Args, config: AppConfig) -> Result<()> {
    if let Commands::Migrate = args.command {
        let (_, report) = PoseStore::open_with_report(&config.database)
            .context("Schema migration failed")?;
        for (unit, outcome) in &report.units {
            println!("{:<40} {:?}", unit, outcome);
        }
        info!("{} migration units applied", report.applied());
        return Ok(());
    }

    let link = Arc::new(SimulatedLink::new(&config.robot.host));
    let publisher = Arc::new(if args.pretty {
        ConsoleTelemetry::pretty()
    } else {
        ConsoleTelemetry::new()
    });
    let mut service = PoseService::new(config, link, publisher)
        .context("Failed to open pose database")?;

    match args.command {
        // Reported before the service is opened
        Commands::Migrate => {}
        Commands::List { json } => {
            let poses = service.store().load_all_poses()?;
            if json {
                print_json(&poses, args.pretty)?;
            } else {
                print_poses(&poses);
            }
        }
        Commands::Save { name, values, arm_config } => {
            let pose = CartesianPose::new(name, six(&values, "save")?).with_config(arm_config);
            service.save_pose(&pose).await?;
        }
        Commands::SaveJoint { name, values, arm_config } => {
            let pose = JointPose::new(name, six(&values, "save-joint")?).with_config(arm_config);
            service.save_joint_pose(&pose).await?;
        }
        Commands::Capture { name, joint } => {
            if joint {
                let pose = service.capture_joint_pose(&name).await?;
                info!("Captured joint pose '{}'", pose.name);
            } else {
                let pose = service.capture_pose(&name).await?;
                info!("Captured pose '{}' (config {})", pose.name, pose.config);
            }
        }
        Commands::Update { name, values, rename, arm_config } => {
            let config = resolve_arm_config(&service, PoseKind::Cartesian, &name, arm_config)?;
            let pose = CartesianPose::new(rename.unwrap_or_else(|| name.clone()), six(&values, "update")?)
                .with_config(config);
            service.update_pose(&name, &pose).await?;
        }
        Commands::UpdateJoint { name, values, rename, arm_config } => {
            let config = resolve_arm_config(&service, PoseKind::Joint, &name, arm_config)?;
            let pose = JointPose::new(rename.unwrap_or_else(|| name.clone()), six(&values, "update-joint")?)
                .with_config(config);
            service.update_joint_pose(&name, &pose).await?;
        }
        Commands::Offset { kind, name, values } => {
            let offset = PoseOffset::from_array(six(&values, "offset")?);
            service.update_offset(kind, &name, &offset).await?;
        }
        Commands::Delete { name, kind } => match kind {
            Some(kind) => {
                if service.delete_pose_by_kind(&name, kind).await? == DeleteOutcome::NotFound {
                    warn!("No {} pose named '{}'", kind, name);
                }
            }
            None => {
                let outcome = service.delete_pose(&name).await?;
                if outcome.cartesian == DeleteOutcome::NotFound && outcome.joint == DeleteOutcome::NotFound {
                    warn!("No pose named '{}'", name);
                }
            }
        },
        Commands::DeleteAll => {
            service.delete_all_poses().await?;
        }
        Commands::Move { kind, name, offset } => {
            let offset = offset
                .map(|v| six(&v, "offset").map(PoseOffset::from_array))
                .transpose()?;
            service
                .move_to_named(kind, &name, offset.as_ref())
                .await
                .with_context(|| format!("Move to {} pose '{}' failed", kind, name))?;
        }
        Commands::Jog { axis, direction, step } => {
            service.jog_cartesian(axis, direction, step).await.context("Jog failed")?;
        }
        Commands::JogJoint { joint, direction, step } => {
            service.jog_joint(joint, direction, step).await.context("Joint jog failed")?;
        }
        Commands::Stop => {
            service.stop().await;
        }
        Commands::Status => {
            service.refresh_connection_status().await;
            service.sample_current_pose().await?;
            service.sample_current_joint_pose().await?;
        }
        Commands::Monitor { duration_secs } => {
            service.start_telemetry();
            match duration_secs {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => {
                    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
                    info!("Shutdown signal received");
                }
            }
            service.stop_telemetry().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use robopose::NoOpTelemetry;
    use std::path::Path;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("robopose").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_command_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_save_keeps_global_config_path_separate() {
        let args = parse(&["-d", "p.db", "save", "pick", "1", "2", "3", "4", "5", "6"]);
        assert_eq!(args.config, None);
        assert_eq!(args.database, Some(PathBuf::from("p.db")));
        match args.command {
            Commands::Save { name, values, arm_config } => {
                assert_eq!(name, "pick");
                assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
                assert_eq!(arm_config, -1);
            }
            _ => panic!("expected save"),
        }

        let args = parse(&["--config", "robot.yaml", "save", "pick", "1", "2", "3", "4", "5", "6", "--arm-config", "3"]);
        assert_eq!(args.config, Some(PathBuf::from("robot.yaml")));
        assert!(matches!(args.command, Commands::Save { arm_config: 3, .. }));
    }

    #[test]
    fn test_update_arm_config_is_optional() {
        let args = parse(&["update", "n", "1", "1", "1", "1", "1", "1", "--arm-config", "2"]);
        assert!(matches!(args.command, Commands::Update { arm_config: Some(2), .. }));

        let args = parse(&["update-joint", "n", "0", "-90", "0", "0", "0", "0", "--rename", "m"]);
        match args.command {
            Commands::UpdateJoint { values, rename, arm_config, .. } => {
                assert_eq!(values[1], -90.0);
                assert_eq!(rename.as_deref(), Some("m"));
                assert_eq!(arm_config, None);
            }
            _ => panic!("expected update-joint"),
        }
    }

    #[test]
    fn test_motion_subcommands_parse() {
        let args = parse(&["jog", "x", "-"]);
        assert!(matches!(
            args.command,
            Commands::Jog { axis: CartesianAxis::X, direction: Direction::Negative, .. }
        ));

        let args = parse(&["jog-joint", "j3", "+", "--step", "2.5"]);
        match args.command {
            Commands::JogJoint { joint, direction, step } => {
                assert_eq!(joint, JointIndex::new(3).unwrap());
                assert_eq!(direction, Direction::Positive);
                assert_eq!(step, 2.5);
            }
            _ => panic!("expected jog-joint"),
        }

        let args = parse(&["move", "cartesian", "n", "--offset", "0", "0", "-10", "0", "0", "0"]);
        match args.command {
            Commands::Move { kind, name, offset } => {
                assert_eq!(kind, PoseKind::Cartesian);
                assert_eq!(name, "n");
                assert_eq!(offset, Some(vec![0.0, 0.0, -10.0, 0.0, 0.0, 0.0]));
            }
            _ => panic!("expected move"),
        }

        assert!(Args::try_parse_from(["robopose", "jog-joint", "7", "+"]).is_err());
    }

    #[test]
    fn test_remaining_subcommands_parse() {
        let cases: &[&[&str]] = &[
            &["migrate"],
            &["list", "--json"],
            &["save-joint", "home", "0", "0", "0", "0", "0", "0", "--arm-config", "1"],
            &["capture", "spot", "--joint"],
            &["offset", "joint", "home", "1", "0", "0", "0", "0", "0"],
            &["delete", "home", "--kind", "cartesian"],
            &["delete-all"],
            &["stop"],
            &["status"],
            &["monitor", "--duration-secs", "1"],
        ];
        for case in cases {
            assert!(
                Args::try_parse_from(std::iter::once("robopose").chain(case.iter().copied())).is_ok(),
                "failed to parse {:?}",
                case
            );
        }
        assert!(Args::try_parse_from(["robopose", "save", "pick", "1", "2", "3"]).is_err());
    }

    #[tokio::test]
    async fn test_update_without_arm_config_keeps_stored_value() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default().with_database_path(dir.path().join("poses.db"));
        config.database.migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("sql/migrations");
        let service = PoseService::new(
            config,
            Arc::new(SimulatedLink::new("10.0.0.2")),
            Arc::new(NoOpTelemetry),
        )
        .unwrap();

        service
            .save_pose(&CartesianPose::new("pick", [1.0; 6]).with_config(5))
            .await
            .unwrap();
        service
            .save_joint_pose(&JointPose::new("home", [0.0; 6]).with_config(2))
            .await
            .unwrap();

        assert_eq!(resolve_arm_config(&service, PoseKind::Cartesian, "pick", None).unwrap(), 5);
        assert_eq!(resolve_arm_config(&service, PoseKind::Joint, "home", None).unwrap(), 2);
        assert_eq!(resolve_arm_config(&service, PoseKind::Cartesian, "pick", Some(7)).unwrap(), 7);
        assert_eq!(
            resolve_arm_config(&service, PoseKind::Cartesian, "ghost", None).unwrap(),
            UNKNOWN_CONFIG
        );
    }
}
