//! Migration configuration and SQL generation.
//!
//! A migration config names a dialect (`sqlite` or `postgresql`), the
//! connection credentials, the identifier casing, a schema file, and an
//! output directory. `generate` diffs the schema against the last
//! generated snapshot and writes the SQL needed to move between them.

pub mod config;
pub mod generate;
pub mod schema;

pub use config::{Casing, DbCredentials, Dialect, Driver, MigrationConfig};
pub use generate::{check, diff_schemas, generate, GenerateOutcome, Journal, JournalEntry};
pub use schema::{builtin, render_create_table, Column, ColumnType, Schema, Table};
