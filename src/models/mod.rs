//! Shared data models for entities, requests, and results.
//!
//! These types form the stable JSON API surface used by the CLI and
//! the HTTP server.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::query::{FieldSpec, FieldType, Filterable, Scalar};

/// Schema version for `LookupResult` and `BatchSummary` JSON payloads.
///
/// This version follows semver semantics (MAJOR.MINOR.PATCH):
/// - MAJOR: Breaking changes to required fields or field semantics.
/// - MINOR: Backward-compatible additions (new optional fields).
/// - PATCH: Documentation or internal changes only.
pub const RESULT_VERSION: &str = "1.0.0";

/// A physical or logical shop that owns items and records sales.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Unix timestamp (seconds) when the store was created.
    pub created_at: u64,
}

/// Input for creating a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStore {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// A stocked item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: u64,
    pub name: String,
    /// Optional stock-keeping unit; unique across items when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    /// Price in minor currency units.
    pub price: i64,
    pub quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<u64>,
    pub created_at: u64,
}

/// Input for creating an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    pub price: i64,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<u64>,
}

/// Header record for a sale. Its lines are stored separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
    /// Sum of `quantity * unit_price` over the sale's lines.
    pub total: i64,
    pub created_at: u64,
}

/// Input for creating a sale header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSale {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
}

/// A single line of a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    pub id: u64,
    pub sale_id: u64,
    pub item_id: u64,
    pub quantity: i64,
    pub unit_price: i64,
}

/// Input for a sale line.
///
/// When `unit_price` is omitted the item's current price is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSaleLine {
    pub item_id: u64,
    pub quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<i64>,
}

const ITEM_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "id",
        ty: FieldType::Integer,
    },
    FieldSpec {
        name: "name",
        ty: FieldType::Text,
    },
    FieldSpec {
        name: "sku",
        ty: FieldType::Text,
    },
    FieldSpec {
        name: "price",
        ty: FieldType::Integer,
    },
    FieldSpec {
        name: "quantity",
        ty: FieldType::Integer,
    },
    FieldSpec {
        name: "store_id",
        ty: FieldType::Integer,
    },
    FieldSpec {
        name: "created_at",
        ty: FieldType::Integer,
    },
];

impl Filterable for Item {
    const ENTITY: &'static str = "item";
    const DEFAULT_TEXT_FIELD: Option<&'static str> = Some("name");

    fn fields() -> &'static [FieldSpec] {
        ITEM_FIELDS
    }

    fn field_value(&self, field: &str) -> Option<Scalar> {
        match field {
            "id" => Some(Scalar::Integer(self.id as i64)),
            "name" => Some(Scalar::Text(self.name.clone())),
            "sku" => self.sku.clone().map(Scalar::Text),
            "price" => Some(Scalar::Integer(self.price)),
            "quantity" => Some(Scalar::Integer(self.quantity)),
            "store_id" => self.store_id.map(|id| Scalar::Integer(id as i64)),
            "created_at" => Some(Scalar::Integer(self.created_at as i64)),
            _ => None,
        }
    }
}

const SALE_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "id",
        ty: FieldType::Integer,
    },
    FieldSpec {
        name: "store_id",
        ty: FieldType::Integer,
    },
    FieldSpec {
        name: "customer",
        ty: FieldType::Text,
    },
    FieldSpec {
        name: "total",
        ty: FieldType::Integer,
    },
    FieldSpec {
        name: "created_at",
        ty: FieldType::Integer,
    },
];

impl Filterable for Sale {
    const ENTITY: &'static str = "sale";
    const DEFAULT_TEXT_FIELD: Option<&'static str> = Some("customer");

    fn fields() -> &'static [FieldSpec] {
        SALE_FIELDS
    }

    fn field_value(&self, field: &str) -> Option<Scalar> {
        match field {
            "id" => Some(Scalar::Integer(self.id as i64)),
            "store_id" => self.store_id.map(|id| Scalar::Integer(id as i64)),
            "customer" => self.customer.clone().map(Scalar::Text),
            "total" => Some(Scalar::Integer(self.total)),
            "created_at" => Some(Scalar::Integer(self.created_at as i64)),
            _ => None,
        }
    }
}

/// Persistence backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendKind {
    /// JSONL files under a directory.
    File,
    /// A single SQLite database file.
    Sqlite,
}

/// Location and kind of the data store a request operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackendKind,
    /// Directory for the file backend, database file for SQLite.
    pub store_path: PathBuf,
}

/// Which entity a lookup targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupTarget {
    #[default]
    Items,
    Sales,
}

/// Request body for a filtered lookup.
///
/// `filter` uses the JSON filter form and `query` the compact DSL.
/// When both are present their clauses are combined with AND.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupRequest {
    pub store: StoreConfig,
    #[serde(default)]
    pub target: LookupTarget,
    #[serde(default)]
    pub filter: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Summary information for a lookup result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupSummary {
    /// Number of records returned.
    pub total_matches: u64,
    /// True if more records matched than `limit` allowed.
    pub truncated: bool,
}

/// Top-level result for a lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupResult {
    /// Schema version for this result payload.
    pub version: String,
    pub target: LookupTarget,
    /// Matching items, ordered by id. Empty for sale lookups.
    #[serde(default)]
    pub items: Vec<Item>,
    /// Matching sales, ordered by id. Empty for item lookups.
    #[serde(default)]
    pub sales: Vec<Sale>,
    pub summary: LookupSummary,
}

/// A single failed entry in a bulk operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    /// Position of the entry in the input sequence.
    pub index: usize,
    pub error: String,
}

/// Outcome of a bulk operation where partial success is expected.
///
/// `values` holds the successfully produced records in input order;
/// `failures` names each rejected input by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary<T> {
    pub version: String,
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    #[serde(default = "Vec::new")]
    pub values: Vec<T>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<BatchFailure>,
}

impl<T> Default for BatchSummary<T> {
    fn default() -> Self {
        Self {
            version: RESULT_VERSION.to_string(),
            total: 0,
            succeeded: 0,
            failed: 0,
            values: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> BatchSummary<T> {
    /// Record a successful entry.
    pub fn record_success(&mut self, value: T) {
        self.total += 1;
        self.succeeded += 1;
        self.values.push(value);
    }

    /// Record a failed entry at input position `index`.
    pub fn record_failure(&mut self, index: usize, error: impl ToString) {
        self.total += 1;
        self.failed += 1;
        self.failures.push(BatchFailure {
            index,
            error: error.to_string(),
        });
    }

    /// True when no entry failed.
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Request body for bulk item creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateItemsRequest {
    pub store: StoreConfig,
    pub items: Vec<NewItem>,
}

/// Request body for bulk store creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStoresRequest {
    pub store: StoreConfig,
    pub stores: Vec<NewStore>,
}

/// Request body for recording a sale with its lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSaleRequest {
    pub store: StoreConfig,
    #[serde(default)]
    pub sale: NewSale,
    pub lines: Vec<NewSaleLine>,
}

/// A committed sale together with its lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleReceipt {
    pub sale: Sale,
    #[serde(default)]
    pub lines: Vec<SaleLine>,
}

/// Summary of a data store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSummary {
    pub backend: StoreBackendKind,
    pub store_path: PathBuf,
    pub stores: u64,
    pub items: u64,
    pub sales: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_version: Option<String>,
    /// RFC 3339 timestamp when the store was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// RFC 3339 timestamp of the last write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_summary_of_items_round_trips_through_json() {
        let mut summary = BatchSummary::default();
        summary.record_success(Item {
            id: 1,
            name: "Mug".to_string(),
            sku: Some("M-1".to_string()),
            price: 400,
            quantity: 3,
            store_id: None,
            created_at: 0,
        });
        summary.record_failure(1, "price must be >= 0; got -1");

        let json = serde_json::to_string(&summary).expect("serialize");
        let back: BatchSummary<Item> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, summary);
    }

    #[test]
    fn batch_summary_without_values_deserializes_empty() {
        let back: BatchSummary<Store> = serde_json::from_str(
            r#"{"version":"1.0.0","total":1,"succeeded":0,"failed":1,
                "failures":[{"index":0,"error":"store name must not be empty"}]}"#,
        )
        .expect("deserialize");
        assert!(back.values.is_empty());
        assert_eq!(back.failures[0].index, 0);
    }
}
