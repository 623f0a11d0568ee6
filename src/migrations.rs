//! Schema migration runner
//!
//! Applies the ordered `*.sql` units of a migration directory to the pose
//! database. Units are not tracked in a ledger; instead the runner is safe to
//! re-run because known "already applied" failures are classified and
//! skipped. A fresh database created at the latest shape and an old database
//! needing incremental evolution both converge when given the same list.

use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use crate::{database::Database, PoseError, Result};

/// Why a unit was skipped after its execution failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Duplicate column or object already exists
    AlreadyApplied,
    /// The renamed or altered table does not exist
    MissingTable,
    /// A rename target is already taken
    RenameTargetExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationOutcome {
    Applied,
    /// Additive-column unit whose columns were all present before running
    SkippedColumnsPresent,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub units: Vec<(String, MigrationOutcome)>,
}

impl MigrationReport {
    pub fn applied(&self) -> usize {
        self.units
            .iter()
            .filter(|(_, outcome)| *outcome == MigrationOutcome::Applied)
            .count()
    }

    pub fn outcome(&self, unit: &str) -> Option<MigrationOutcome> {
        self.units
            .iter()
            .find(|(name, _)| name == unit)
            .map(|(_, outcome)| *outcome)
    }
}

pub struct SchemaMigrator {
    db: Database,
    migrations_dir: PathBuf,
    add_column: Regex,
}

impl SchemaMigrator {
    pub fn new(db: Database, migrations_dir: impl Into<PathBuf>) -> Result<Self> {
        let add_column = Regex::new(
            r#"(?is)^\s*ALTER\s+TABLE\s+[`"\[]?(\w+)[`"\]]?\s+ADD\s+(?:COLUMN\s+)?[`"\[]?(\w+)[`"\]]?"#,
        )?;

        Ok(Self {
            db,
            migrations_dir: migrations_dir.into(),
            add_column,
        })
    }

    /// Migration files sorted by file name
    pub fn units(&self) -> Result<Vec<PathBuf>> {
        if !self.migrations_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut units = Vec::new();
        for entry in fs::read_dir(&self.migrations_dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().map_or(false, |ext| ext == "sql") {
                units.push(path);
            }
        }
        units.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(units)
    }

    /// Apply every unit in order, aborting on the first fatal failure
    pub fn apply_all(&self) -> Result<MigrationReport> {
        info!("Applying migrations from {} to {}", self.migrations_dir.display(), self.db.path().display());

        let units = self.units()?;
        if units.is_empty() {
            warn!("No migrations found in {}", self.migrations_dir.display());
            return Ok(MigrationReport::default());
        }

        let mut report = MigrationReport::default();
        for unit in &units {
            let outcome = self.apply_unit(unit)?;
            report.units.push((unit_name(unit), outcome));
        }

        info!("Database ready ({} of {} migrations applied)", report.applied(), units.len());
        Ok(report)
    }

    /// Apply only the newest unit
    pub fn apply_latest(&self) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();
        match self.units()?.last() {
            Some(unit) => {
                let outcome = self.apply_unit(unit)?;
                report.units.push((unit_name(unit), outcome));
            }
            None => warn!("No migrations found in {}", self.migrations_dir.display()),
        }
        Ok(report)
    }

    fn apply_unit(&self, path: &Path) -> Result<MigrationOutcome> {
        let name = unit_name(path);
        let script = fs::read_to_string(path)?;

        if self.columns_already_present(&script)? {
            info!("Migration {}: columns already exist, skipping", name);
            return Ok(MigrationOutcome::SkippedColumnsPresent);
        }

        let result = self.db.with_transaction(|tx| {
            tx.execute_batch(&script)?;
            Ok(())
        });

        match result {
            Ok(()) => {
                info!("Applied migration: {}", name);
                Ok(MigrationOutcome::Applied)
            }
            Err(PoseError::StoreIo(e)) => match classify_failure(&e.to_string(), &script) {
                Some(reason) => {
                    info!("Migration {}: {:?} ({}), skipping", name, reason, e);
                    Ok(MigrationOutcome::Skipped(reason))
                }
                None => Err(PoseError::MigrationFatal {
                    unit: name,
                    message: e.to_string(),
                }),
            },
            Err(e) => Err(PoseError::MigrationFatal {
                unit: name,
                message: e.to_string(),
            }),
        }
    }

    /// True when the unit only adds columns and every one of them exists
    fn columns_already_present(&self, script: &str) -> Result<bool> {
        let statements = split_statements(script);
        if statements.is_empty() {
            return Ok(false);
        }

        let mut targets = Vec::with_capacity(statements.len());
        for statement in &statements {
            match self.add_column.captures(statement) {
                Some(caps) => targets.push((caps[1].to_string(), caps[2].to_string())),
                None => return Ok(false),
            }
        }

        for (table, column) in &targets {
            if !self.db.column_exists(table, column)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Decide whether a failed unit is a tolerated re-application
pub fn classify_failure(message: &str, script: &str) -> Option<SkipReason> {
    let message = message.to_lowercase();
    let script = script.to_lowercase();
    let renames = script.contains("rename to");
    let adds_column = script.contains("add column");

    if message.contains("duplicate column") || message.contains("already exists") {
        Some(SkipReason::AlreadyApplied)
    } else if message.contains("no such table") && (renames || adds_column) {
        Some(SkipReason::MissingTable)
    } else if message.contains("another table or index with this name") && renames {
        Some(SkipReason::RenameTargetExists)
    } else {
        None
    }
}

/// Non-empty statements with `--` line comments removed
fn split_statements(script: &str) -> Vec<String> {
    let stripped: String = script
        .lines()
        .map(|line| match line.find("--") {
            Some(idx) => &line[..idx],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n");

    stripped
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn unit_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shipped_migrations() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("sql/migrations")
    }

    fn schema(db: &Database) -> Vec<(String, Vec<String>)> {
        ["tcp", "joints"]
            .iter()
            .map(|t| (t.to_string(), db.table_columns(t).unwrap()))
            .collect()
    }

    fn write_unit(dir: &Path, name: &str, sql: &str) {
        fs::write(dir.join(name), sql).unwrap();
    }

    #[test]
    fn test_apply_all_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("poses.db"));
        let migrator = SchemaMigrator::new(db.clone(), shipped_migrations()).unwrap();

        let first = migrator.apply_all().unwrap();
        assert_eq!(first.applied(), first.units.len());
        let after_first = schema(&db);

        let second = migrator.apply_all().unwrap();
        assert_eq!(second.applied(), 0);
        assert_eq!(schema(&db), after_first);

        let tcp = &after_first[0].1;
        for column in ["id", "name", "x", "rz", "config", "created_at", "dx", "drz"] {
            assert!(tcp.contains(&column.to_string()), "tcp missing {}", column);
        }
        assert_eq!(tcp.iter().filter(|c| *c == "config").count(), 1);
    }

    #[test]
    fn test_additive_units_are_prechecked() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("poses.db"));
        let migrator = SchemaMigrator::new(db, shipped_migrations()).unwrap();

        migrator.apply_all().unwrap();
        let second = migrator.apply_all().unwrap();
        assert_eq!(
            second.outcome("0002_add_config_to_tcp.sql"),
            Some(MigrationOutcome::SkippedColumnsPresent)
        );
        assert_eq!(
            second.outcome("0001_create_tcp.sql"),
            Some(MigrationOutcome::Skipped(SkipReason::AlreadyApplied))
        );
    }

    #[test]
    fn test_baseline_database_converges() {
        let dir = tempfile::tempdir().unwrap();

        // Reference: incremental evolution from empty
        let reference = Database::new(dir.path().join("reference.db"));
        SchemaMigrator::new(reference.clone(), shipped_migrations()).unwrap().apply_all().unwrap();

        // Database created directly at the latest shape of the tcp table
        let baseline = Database::new(dir.path().join("baseline.db"));
        baseline
            .with_transaction(|tx| {
                tx.execute_batch(
                    "CREATE TABLE tcp (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        name TEXT NOT NULL,
                        x REAL NOT NULL, y REAL NOT NULL, z REAL NOT NULL,
                        rx REAL NOT NULL, ry REAL NOT NULL, rz REAL NOT NULL,
                        created_at TEXT NOT NULL,
                        config INTEGER NOT NULL DEFAULT -1,
                        dx REAL NOT NULL DEFAULT 0, dy REAL NOT NULL DEFAULT 0,
                        dz REAL NOT NULL DEFAULT 0, drx REAL NOT NULL DEFAULT 0,
                        dry REAL NOT NULL DEFAULT 0, drz REAL NOT NULL DEFAULT 0
                    );",
                )?;
                Ok(())
            })
            .unwrap();
        SchemaMigrator::new(baseline.clone(), shipped_migrations()).unwrap().apply_all().unwrap();

        assert_eq!(schema(&baseline), schema(&reference));
    }

    #[test]
    fn test_missing_table_rename_and_add_column_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let units = dir.path().join("migrations");
        fs::create_dir(&units).unwrap();
        write_unit(&units, "0001_rename_legacy.sql", "ALTER TABLE legacy RENAME TO points;");
        write_unit(&units, "0002_add_column.sql", "ALTER TABLE ghost ADD COLUMN note TEXT;");

        let migrator = SchemaMigrator::new(Database::new(dir.path().join("poses.db")), &units).unwrap();
        let report = migrator.apply_all().unwrap();
        assert_eq!(
            report.outcome("0001_rename_legacy.sql"),
            Some(MigrationOutcome::Skipped(SkipReason::MissingTable))
        );
        assert_eq!(
            report.outcome("0002_add_column.sql"),
            Some(MigrationOutcome::Skipped(SkipReason::MissingTable))
        );
    }

    #[test]
    fn test_rename_onto_existing_table_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let units = dir.path().join("migrations");
        fs::create_dir(&units).unwrap();
        write_unit(&units, "0001_tables.sql", "CREATE TABLE a (v INTEGER); CREATE TABLE b (v INTEGER);");
        write_unit(&units, "0002_rename.sql", "ALTER TABLE a RENAME TO b;");

        let db = Database::new(dir.path().join("poses.db"));
        let report = SchemaMigrator::new(db.clone(), &units).unwrap().apply_all().unwrap();
        assert_eq!(report.outcome("0001_tables.sql"), Some(MigrationOutcome::Applied));
        assert!(matches!(
            report.outcome("0002_rename.sql"),
            Some(MigrationOutcome::Skipped(_))
        ));
        assert!(db.table_exists("a").unwrap());
    }

    #[test]
    fn test_unknown_failure_is_fatal_and_stops_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let units = dir.path().join("migrations");
        fs::create_dir(&units).unwrap();
        write_unit(&units, "0001_broken.sql", "CREATE TABLE broken (;");
        write_unit(&units, "0002_never.sql", "CREATE TABLE never (v INTEGER);");

        let db = Database::new(dir.path().join("poses.db"));
        let err = SchemaMigrator::new(db.clone(), &units).unwrap().apply_all().unwrap_err();
        match err {
            PoseError::MigrationFatal { unit, .. } => assert_eq!(unit, "0001_broken.sql"),
            other => panic!("expected MigrationFatal, got {:?}", other),
        }
        assert!(!db.table_exists("never").unwrap());
    }

    #[test]
    fn test_failed_unit_leaves_no_partial_effect() {
        let dir = tempfile::tempdir().unwrap();
        let units = dir.path().join("migrations");
        fs::create_dir(&units).unwrap();
        write_unit(&units, "0001_base.sql", "CREATE TABLE t (a INTEGER);");
        write_unit(
            &units,
            "0002_two_columns.sql",
            "ALTER TABLE t ADD COLUMN b INTEGER; ALTER TABLE t ADD COLUMN a INTEGER;",
        );

        let db = Database::new(dir.path().join("poses.db"));
        let report = SchemaMigrator::new(db.clone(), &units).unwrap().apply_all().unwrap();
        assert_eq!(
            report.outcome("0002_two_columns.sql"),
            Some(MigrationOutcome::Skipped(SkipReason::AlreadyApplied))
        );
        assert_eq!(db.table_columns("t").unwrap(), vec!["a".to_string()]);
    }

    #[test]
    fn test_apply_latest_only_runs_newest_unit() {
        let dir = tempfile::tempdir().unwrap();
        let units = dir.path().join("migrations");
        fs::create_dir(&units).unwrap();
        write_unit(&units, "0002_second.sql", "CREATE TABLE second (v INTEGER);");
        write_unit(&units, "0001_first.sql", "CREATE TABLE first (v INTEGER);");
        write_unit(&units, "notes.txt", "not a migration");

        let db = Database::new(dir.path().join("poses.db"));
        let migrator = SchemaMigrator::new(db.clone(), &units).unwrap();
        assert_eq!(migrator.units().unwrap().len(), 2);

        let report = migrator.apply_latest().unwrap();
        assert_eq!(report.units.len(), 1);
        assert_eq!(report.outcome("0002_second.sql"), Some(MigrationOutcome::Applied));
        assert!(db.table_exists("second").unwrap());
        assert!(!db.table_exists("first").unwrap());
    }

    #[test]
    fn test_missing_directory_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let migrator = SchemaMigrator::new(Database::new(dir.path().join("poses.db")), dir.path().join("nope")).unwrap();
        assert!(migrator.apply_all().unwrap().units.is_empty());
        assert!(migrator.apply_latest().unwrap().units.is_empty());
    }

    #[test]
    fn test_classification_table() {
        assert_eq!(
            classify_failure("duplicate column name: config", "ALTER TABLE tcp ADD COLUMN config INTEGER"),
            Some(SkipReason::AlreadyApplied)
        );
        assert_eq!(
            classify_failure("no such table: tcp", "CREATE INDEX i ON tcp(name)"),
            None
        );
        assert_eq!(
            classify_failure("there is already another table or index with this name: b", "ALTER TABLE a RENAME TO b"),
            Some(SkipReason::RenameTargetExists)
        );
        assert_eq!(classify_failure("near \"(\": syntax error", "CREATE TABLE x (;"), None);
    }
}
