//! Persistence backends and related types.
//!
//! This module defines the pluggable backend abstraction used by the
//! services plus two implementations:
//!
//! - a file backend that keeps JSONL files under a `.stockroom/`
//!   directory, and
//! - a SQLite backend whose tables come from the built-in relational
//!   schema shared with the migration generator.

mod backend;
mod file;
pub mod models;
mod sqlite;

pub use backend::{open_backend, StoreBackend};
pub use file::FileStoreBackend;
pub use models::{NewSaleLineRecord, StoreCounts, StoreMeta, STORE_SCHEMA_VERSION};
pub use sqlite::SqliteStoreBackend;

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Result};
use thiserror::Error;

use crate::models::{StoreBackendKind, StoreConfig, StoreSummary};

/// The configured store does not exist on disk.
#[derive(Debug, Error)]
#[error("store not found at {}", path.display())]
pub struct StoreNotFound {
    pub path: PathBuf,
}

/// Open a store that must already exist.
///
/// Unlike `open_backend`, this refuses to create a missing store; the
/// error then downcasts to `StoreNotFound`.
pub fn open_existing(config: &StoreConfig) -> Result<Box<dyn StoreBackend>> {
    if !config.store_path.exists() {
        return Err(StoreNotFound {
            path: config.store_path.clone(),
        }
        .into());
    }
    match config.backend {
        StoreBackendKind::File if !config.store_path.is_dir() => {
            bail!(
                "file backend requires store_path to be a directory; got {}",
                config.store_path.display()
            );
        }
        StoreBackendKind::Sqlite if !config.store_path.is_file() => {
            bail!(
                "sqlite backend requires store_path to be a file; got {}",
                config.store_path.display()
            );
        }
        _ => {}
    }

    open_backend(config)
}

/// Read-only helper to inspect an existing store.
pub fn get_store_info(config: &StoreConfig) -> Result<StoreSummary> {
    let backend = open_existing(config)?;
    summarize(backend.as_ref())
}

/// Build a summary for an already opened backend.
pub fn summarize(backend: &dyn StoreBackend) -> Result<StoreSummary> {
    let meta = backend.load_meta()?;
    let counts = backend.counts()?;

    Ok(StoreSummary {
        backend: backend.kind(),
        store_path: backend.store_path().to_path_buf(),
        stores: counts.stores,
        items: counts.items,
        sales: counts.sales,
        schema_version: Some(meta.schema_version),
        tool_version: Some(meta.tool_version),
        created_at: format_timestamp_iso8601(meta.created_at),
        updated_at: format_timestamp_iso8601(meta.updated_at),
    })
}

pub(crate) fn current_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub(crate) fn format_timestamp_iso8601(secs: u64) -> Option<String> {
    use time::{format_description::well_known::Rfc3339, OffsetDateTime};

    let ts = secs as i64;
    let dt = OffsetDateTime::from_unix_timestamp(ts).ok()?;
    Some(dt.format(&Rfc3339).unwrap_or_else(|_| dt.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewStore;
    use tempfile::tempdir;

    #[test]
    fn info_requires_existing_store() {
        let dir = tempdir().expect("tempdir");
        let config = StoreConfig {
            backend: StoreBackendKind::File,
            store_path: dir.path().join(".stockroom"),
        };

        let err = get_store_info(&config).expect_err("missing store");
        assert!(err.to_string().contains("store not found at"));
        let missing = err.downcast::<StoreNotFound>().expect("typed error");
        assert_eq!(missing.path, config.store_path);
        assert!(!config.store_path.exists());
    }

    #[test]
    fn info_reports_counts_for_both_backends() {
        let dir = tempdir().expect("tempdir");

        for config in [
            StoreConfig {
                backend: StoreBackendKind::File,
                store_path: dir.path().join(".stockroom"),
            },
            StoreConfig {
                backend: StoreBackendKind::Sqlite,
                store_path: dir.path().join("store.sqlite"),
            },
        ] {
            {
                let mut backend = open_backend(&config).expect("open");
                backend
                    .insert_store(&NewStore {
                        name: "Main".to_string(),
                        location: Some("Harbour St".to_string()),
                    })
                    .expect("store");
            }

            let summary = get_store_info(&config).expect("info");
            assert_eq!(summary.backend, config.backend);
            assert_eq!(summary.stores, 1);
            assert_eq!(summary.items, 0);
            assert_eq!(summary.schema_version.as_deref(), Some(STORE_SCHEMA_VERSION));
            assert!(summary.updated_at.is_some());
        }
    }

    #[test]
    fn timestamps_format_as_rfc3339() {
        assert_eq!(
            format_timestamp_iso8601(0).as_deref(),
            Some("1970-01-01T00:00:00Z")
        );
    }
}
