//! Pose repositories
//!
//! `Repository<R>` implements CRUD for one pose table; `PoseStore` owns both
//! repositories plus the database handle and merges their listings for
//! display. Name uniqueness is enforced by a scan before each write rather
//! than by a database constraint.

use chrono::Local;
use rusqlite::{params, Row, Transaction};
use std::marker::PhantomData;
use tracing::{debug, info, warn};
use crate::{
    config::DatabaseConfig,
    database::Database,
    migrations::{MigrationReport, SchemaMigrator},
    model::{CartesianPose, JointPose, PoseKind, PoseOffset, StoredPose},
    PoseError, Result,
};

/// Columns shared by both pose tables after the six base columns
const OFFSET_COLUMNS: [&str; 6] = ["dx", "dy", "dz", "drx", "dry", "drz"];

/// Maps a pose record onto its table
pub trait PoseRecord: Sized + Clone {
    const TABLE: &'static str;
    const BASE_COLUMNS: [&'static str; 6];

    fn name(&self) -> &str;
    fn base(&self) -> [f64; 6];
    fn config(&self) -> i32;
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
    fn stamp(&mut self, id: i64, created_at: String);
}

fn offset_from_row(row: &Row<'_>) -> rusqlite::Result<PoseOffset> {
    Ok(PoseOffset {
        dx: row.get("dx")?,
        dy: row.get("dy")?,
        dz: row.get("dz")?,
        drx: row.get("drx")?,
        dry: row.get("dry")?,
        drz: row.get("drz")?,
    })
}

impl PoseRecord for CartesianPose {
    const TABLE: &'static str = "tcp";
    const BASE_COLUMNS: [&'static str; 6] = ["x", "y", "z", "rx", "ry", "rz"];

    fn name(&self) -> &str {
        &self.name
    }

    fn base(&self) -> [f64; 6] {
        CartesianPose::base(self)
    }

    fn config(&self) -> i32 {
        self.config
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            x: row.get("x")?,
            y: row.get("y")?,
            z: row.get("z")?,
            rx: row.get("rx")?,
            ry: row.get("ry")?,
            rz: row.get("rz")?,
            offset: offset_from_row(row)?,
            config: row.get("config")?,
            created_at: row.get("created_at")?,
        })
    }

    fn stamp(&mut self, id: i64, created_at: String) {
        self.id = Some(id);
        self.created_at = Some(created_at);
    }
}

impl PoseRecord for JointPose {
    const TABLE: &'static str = "joints";
    const BASE_COLUMNS: [&'static str; 6] = ["j1", "j2", "j3", "j4", "j5", "j6"];

    fn name(&self) -> &str {
        &self.name
    }

    fn base(&self) -> [f64; 6] {
        JointPose::base(self)
    }

    fn config(&self) -> i32 {
        self.config
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            j1: row.get("j1")?,
            j2: row.get("j2")?,
            j3: row.get("j3")?,
            j4: row.get("j4")?,
            j5: row.get("j5")?,
            j6: row.get("j6")?,
            offset: offset_from_row(row)?,
            config: row.get("config")?,
            created_at: row.get("created_at")?,
        })
    }

    fn stamp(&mut self, id: i64, created_at: String) {
        self.id = Some(id);
        self.created_at = Some(created_at);
    }
}

/// Result of a delete-by-name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

pub struct Repository<R: PoseRecord> {
    db: Database,
    _record: PhantomData<R>,
}

impl<R: PoseRecord> Repository<R> {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            _record: PhantomData,
        }
    }

    /// Every row in natural order
    pub fn list_all(&self) -> Result<Vec<R>> {
        self.db.with_transaction(|tx| Self::scan(tx))
    }

    pub fn find(&self, name: &str) -> Result<Option<R>> {
        Ok(self.list_all()?.into_iter().find(|r| r.name() == name))
    }

    /// Insert a new record, refusing a name already present in this table
    pub fn insert(&self, record: &R) -> Result<R> {
        self.db.with_transaction(|tx| {
            Self::ensure_name_free(tx, record.name(), None)?;

            let created_at = Local::now().to_rfc3339();
            let base = record.base();
            let sql = format!(
                "INSERT INTO {} (name, {}, config, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                R::TABLE,
                R::BASE_COLUMNS.join(", "),
            );
            tx.execute(
                &sql,
                params![record.name(), base[0], base[1], base[2], base[3], base[4], base[5], record.config(), created_at],
            )?;

            let mut stored = record.clone();
            stored.stamp(tx.last_insert_rowid(), created_at);
            debug!("Inserted '{}' into {}", stored.name(), R::TABLE);
            Ok(stored)
        })
    }

    /// Replace base fields and config of `previous_name`, renaming if needed
    pub fn update(&self, record: &R, previous_name: &str) -> Result<()> {
        self.db.with_transaction(|tx| {
            if record.name() != previous_name {
                Self::ensure_name_free(tx, record.name(), Some(previous_name))?;
            }

            let base = record.base();
            let assignments = R::BASE_COLUMNS
                .iter()
                .enumerate()
                .map(|(i, col)| format!("{} = ?{}", col, i + 2))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "UPDATE {} SET name = ?1, {}, config = ?8 WHERE name = ?9",
                R::TABLE,
                assignments,
            );
            let changed = tx.execute(
                &sql,
                params![record.name(), base[0], base[1], base[2], base[3], base[4], base[5], record.config(), previous_name],
            )?;

            if changed == 0 {
                return Err(PoseError::NotFound {
                    table: R::TABLE,
                    name: previous_name.to_string(),
                });
            }
            Ok(())
        })
    }

    /// Replace only the offset columns of `name`
    pub fn update_offset(&self, name: &str, offset: &PoseOffset) -> Result<()> {
        self.db.with_transaction(|tx| {
            let assignments = OFFSET_COLUMNS
                .iter()
                .enumerate()
                .map(|(i, col)| format!("{} = ?{}", col, i + 1))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!("UPDATE {} SET {} WHERE name = ?7", R::TABLE, assignments);
            let changed = tx.execute(
                &sql,
                params![offset.dx, offset.dy, offset.dz, offset.drx, offset.dry, offset.drz, name],
            )?;

            if changed == 0 {
                return Err(PoseError::NotFound {
                    table: R::TABLE,
                    name: name.to_string(),
                });
            }
            Ok(())
        })
    }

    pub fn delete(&self, name: &str) -> Result<DeleteOutcome> {
        self.db.with_transaction(|tx| {
            let sql = format!("DELETE FROM {} WHERE name = ?1", R::TABLE);
            let removed = tx.execute(&sql, params![name])?;
            Ok(if removed == 0 {
                DeleteOutcome::NotFound
            } else {
                DeleteOutcome::Deleted
            })
        })
    }

    /// Remove every row, returning how many were removed
    pub fn delete_all(&self) -> Result<usize> {
        self.db.with_transaction(|tx| {
            let removed = tx.execute(&format!("DELETE FROM {}", R::TABLE), [])?;
            Ok(removed)
        })
    }

    fn scan(tx: &Transaction<'_>) -> Result<Vec<R>> {
        let mut stmt = tx.prepare(&format!("SELECT * FROM {} ORDER BY rowid", R::TABLE))?;
        let rows = stmt.query_map([], |row| R::from_row(row))?;
        let records = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn ensure_name_free(tx: &Transaction<'_>, name: &str, ignoring: Option<&str>) -> Result<()> {
        let taken = Self::scan(tx)?
            .iter()
            .any(|r| r.name() == name && Some(r.name()) != ignoring);
        if taken {
            return Err(PoseError::DuplicateName {
                table: R::TABLE,
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

/// Which tables held a name removed by `delete_everywhere`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossDelete {
    pub cartesian: DeleteOutcome,
    pub joint: DeleteOutcome,
}

pub struct PoseStore {
    db: Database,
    cartesian: Repository<CartesianPose>,
    joints: Repository<JointPose>,
}

impl PoseStore {
    /// Open the database at `config.path` and bring its schema up to date
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let (store, _) = Self::open_with_report(config)?;
        Ok(store)
    }

    pub fn open_with_report(config: &DatabaseConfig) -> Result<(Self, MigrationReport)> {
        info!("Opening pose database: {}", config.path.display());
        let db = Database::new(&config.path);
        let report = SchemaMigrator::new(db.clone(), &config.migrations_dir)?.apply_all()?;
        Ok((Self::from_database(db), report))
    }

    /// Wrap an already-migrated database
    pub fn from_database(db: Database) -> Self {
        Self {
            cartesian: Repository::new(db.clone()),
            joints: Repository::new(db.clone()),
            db,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn cartesian(&self) -> &Repository<CartesianPose> {
        &self.cartesian
    }

    pub fn joints(&self) -> &Repository<JointPose> {
        &self.joints
    }

    /// Cartesian rows followed by joint rows, each tagged with its kind
    pub fn load_all_poses(&self) -> Result<Vec<StoredPose>> {
        let mut all: Vec<StoredPose> = self
            .cartesian
            .list_all()?
            .into_iter()
            .map(StoredPose::Cartesian)
            .collect();
        all.extend(self.joints.list_all()?.into_iter().map(StoredPose::Joint));
        Ok(all)
    }

    pub fn delete_by_kind(&self, name: &str, kind: PoseKind) -> Result<DeleteOutcome> {
        match kind {
            PoseKind::Cartesian => self.cartesian.delete(name),
            PoseKind::Joint => self.joints.delete(name),
        }
    }

    /// Delete `name` from both tables; a table without the name is not an error
    pub fn delete_everywhere(&self, name: &str) -> Result<CrossDelete> {
        let result = CrossDelete {
            cartesian: self.cartesian.delete(name)?,
            joint: self.joints.delete(name)?,
        };
        if result.cartesian == DeleteOutcome::NotFound && result.joint == DeleteOutcome::NotFound {
            warn!("Pose '{}' not present in either table", name);
        }
        Ok(result)
    }

    pub fn delete_all(&self) -> Result<usize> {
        Ok(self.cartesian.delete_all()? + self.joints.delete_all()?)
    }
}
