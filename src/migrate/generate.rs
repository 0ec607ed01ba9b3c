//! Snapshot-diffing migration generator.
//!
//! Output layout under the configured `out` directory:
//!
//! - `NNNN_<name>.sql` – one file per generated migration.
//! - `meta/_journal.json` – ordered list of generated migrations.
//! - `meta/NNNN_snapshot.json` – resolved schema after each migration,
//!   used as the diff base for the next run.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::migrate::config::{Dialect, MigrationConfig};
use crate::migrate::schema::{
    render_add_column, render_create_table, render_drop_column, render_drop_table, Schema,
};

const JOURNAL_VERSION: &str = "1";

/// Ordered record of generated migrations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    pub version: String,
    pub dialect: Dialect,
    #[serde(default)]
    pub entries: Vec<JournalEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub idx: u32,
    pub tag: String,
    /// Unix timestamp (seconds) when the migration was generated.
    pub when: u64,
}

/// Result of a `generate` run.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateOutcome {
    /// Written migration file, or `None` when the schema was unchanged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration: Option<PathBuf>,
    pub statements: usize,
}

/// Load and resolve the schema referenced by a config.
pub fn check(config: &MigrationConfig) -> Result<Schema> {
    Schema::load(&config.schema)?
        .resolve(config.casing)
        .with_context(|| format!("invalid schema at {}", config.schema.display()))
}

/// Diff the configured schema against the latest snapshot and write a
/// new migration when anything changed.
pub fn generate(config: &MigrationConfig, name: &str) -> Result<GenerateOutcome> {
    validate_migration_name(name)?;

    let schema = check(config)?;
    let meta_dir = config.out.join("meta");
    let journal_path = meta_dir.join("_journal.json");

    let mut journal = if journal_path.exists() {
        let contents = fs::read_to_string(&journal_path)
            .with_context(|| format!("failed to read journal at {}", journal_path.display()))?;
        let journal: Journal = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse journal at {}", journal_path.display()))?;
        if journal.dialect != config.dialect {
            bail!(
                "journal at {} was generated for {:?}, but the config targets {:?}",
                journal_path.display(),
                journal.dialect,
                config.dialect
            );
        }
        journal
    } else {
        Journal {
            version: JOURNAL_VERSION.to_string(),
            dialect: config.dialect,
            entries: Vec::new(),
        }
    };

    let previous = match journal.entries.last() {
        Some(entry) => load_snapshot(&snapshot_path(&meta_dir, entry.idx))?,
        None => Schema::default(),
    };

    let statements = diff_schemas(&previous, &schema, config.dialect)?;
    if statements.is_empty() {
        info!(out = %config.out.display(), "schema unchanged; no migration generated");
        return Ok(GenerateOutcome {
            migration: None,
            statements: 0,
        });
    }

    let idx = journal.entries.last().map(|e| e.idx + 1).unwrap_or(0);
    let tag = format!("{idx:04}_{name}");

    fs::create_dir_all(&meta_dir)
        .with_context(|| format!("failed to create {}", meta_dir.display()))?;

    let migration_path = config.out.join(format!("{tag}.sql"));
    let mut body = statements.join("\n\n");
    body.push('\n');
    fs::write(&migration_path, body)
        .with_context(|| format!("failed to write {}", migration_path.display()))?;

    let snapshot = serde_json::to_string_pretty(&schema)?;
    fs::write(snapshot_path(&meta_dir, idx), snapshot)?;

    journal.entries.push(JournalEntry {
        idx,
        tag: tag.clone(),
        when: crate::store::current_epoch_seconds(),
    });
    fs::write(&journal_path, serde_json::to_string_pretty(&journal)?)?;

    info!(
        migration = %migration_path.display(),
        statements = statements.len(),
        "generated migration"
    );

    Ok(GenerateOutcome {
        migration: Some(migration_path),
        statements: statements.len(),
    })
}

/// Compute the statements that move `old` to `new`.
///
/// Statements come in four phases: column drops, table drops (reverse
/// `old` order), table creates (`new` order), then column adds. Foreign
/// keys are gone before their targets are dropped, and targets exist
/// before anything references them.
pub fn diff_schemas(old: &Schema, new: &Schema, dialect: Dialect) -> Result<Vec<String>> {
    let mut drop_columns = Vec::new();
    let mut drop_tables = Vec::new();
    let mut creates = Vec::new();
    let mut add_columns = Vec::new();

    for table in old.tables.iter().rev() {
        if new.table(&table.name).is_none() {
            debug!(table = %table.name, "dropping table");
            drop_tables.push(render_drop_table(&table.name));
        }
    }

    for table in &new.tables {
        let Some(existing) = old.table(&table.name) else {
            debug!(table = %table.name, "creating table");
            creates.push(render_create_table(table, dialect, false));
            continue;
        };

        for column in &existing.columns {
            if table.column(&column.name).is_some() {
                continue;
            }
            let constrained =
                column.primary_key || column.unique || column.references.is_some();
            if dialect == Dialect::Sqlite && constrained {
                bail!(
                    "sqlite cannot drop constrained column `{}.{}` (primary key, unique or \
                     foreign key); recreate the table instead",
                    table.name,
                    column.name
                );
            }
            drop_columns.push(render_drop_column(&table.name, &column.name));
        }

        for column in &table.columns {
            match existing.column(&column.name) {
                Some(previous) if previous == column => {}
                Some(_) => bail!(
                    "column `{}.{}` changed definition; altering columns is not supported",
                    table.name,
                    column.name
                ),
                None => {
                    if column.primary_key || !column.nullable {
                        bail!(
                            "column `{}.{}` must be nullable to be added to an existing table",
                            table.name,
                            column.name
                        );
                    }
                    add_columns.extend(render_add_column(&table.name, column, dialect));
                }
            }
        }
    }

    let mut statements = drop_columns;
    statements.extend(drop_tables);
    statements.extend(creates);
    statements.extend(add_columns);
    Ok(statements)
}

fn snapshot_path(meta_dir: &Path, idx: u32) -> PathBuf {
    meta_dir.join(format!("{idx:04}_snapshot.json"))
}

fn load_snapshot(path: &Path) -> Result<Schema> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot at {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse snapshot at {}", path.display()))
}

fn validate_migration_name(name: &str) -> Result<()> {
    if name.is_empty()
        || !name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
    {
        bail!("migration name may only contain ASCII letters, digits, `_` and `-`: {name:?}");
    }
    Ok(())
}
