//! Persistence-only records used by store backends.

use serde::{Deserialize, Serialize};

/// Current on-disk schema version written by both backends.
pub const STORE_SCHEMA_VERSION: &str = "1";

/// Metadata for an entire data store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMeta {
    /// Schema version for the store on disk.
    pub schema_version: String,
    /// Version of the stockroom tool that last wrote the store.
    pub tool_version: String,
    /// Unix timestamp (seconds since epoch) when the store was created.
    pub created_at: u64,
    /// Unix timestamp (seconds since epoch) of the last write.
    pub updated_at: u64,
}

impl StoreMeta {
    pub(crate) fn fresh() -> Self {
        let now = crate::store::current_epoch_seconds();
        Self {
            schema_version: STORE_SCHEMA_VERSION.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A sale line after validation, with its unit price resolved.
#[derive(Debug, Clone, Copy)]
pub struct NewSaleLineRecord {
    pub sale_id: u64,
    pub item_id: u64,
    pub quantity: i64,
    pub unit_price: i64,
}

/// Row counts used by store summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub stores: u64,
    pub items: u64,
    pub sales: u64,
}
