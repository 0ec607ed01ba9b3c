//! Store backend abstraction and helpers.
//!
//! The `StoreBackend` trait provides a common interface that the
//! services can use without depending on concrete implementations.
//! Each mutating method is its own commit boundary: once it returns
//! `Ok`, the write is durable.

use std::path::Path;

use anyhow::Result;

use crate::models::{
    Item, NewItem, NewSale, NewStore, Sale, SaleLine, Store, StoreBackendKind, StoreConfig,
};
use crate::query::Filter;
use crate::store::models::{NewSaleLineRecord, StoreCounts, StoreMeta};

/// Pluggable persistence backend used by the services.
pub trait StoreBackend {
    /// Kind of backend implementation.
    fn kind(&self) -> StoreBackendKind;

    /// Root path for the on-disk store.
    fn store_path(&self) -> &Path;

    /// Load store metadata.
    fn load_meta(&self) -> Result<StoreMeta>;

    /// Persist store metadata.
    fn save_meta(&mut self, meta: &StoreMeta) -> Result<()>;

    /// Count stored rows per entity.
    fn counts(&self) -> Result<StoreCounts>;

    fn insert_store(&mut self, store: &NewStore) -> Result<Store>;

    fn get_store(&self, id: u64) -> Result<Option<Store>>;

    fn list_stores(&self) -> Result<Vec<Store>>;

    fn insert_item(&mut self, item: &NewItem) -> Result<Item>;

    fn get_item(&self, id: u64) -> Result<Option<Item>>;

    /// Items matching `filter`, ordered by id, at most `limit` of them.
    fn query_items(&self, filter: &Filter<Item>, limit: Option<usize>) -> Result<Vec<Item>>;

    fn insert_sale(&mut self, sale: &NewSale) -> Result<Sale>;

    fn get_sale(&self, id: u64) -> Result<Option<Sale>>;

    /// Sales matching `filter`, ordered by id, at most `limit` of them.
    fn query_sales(&self, filter: &Filter<Sale>, limit: Option<usize>) -> Result<Vec<Sale>>;

    /// Overwrite the stored total of a sale.
    fn set_sale_total(&mut self, sale_id: u64, total: i64) -> Result<()>;

    fn insert_sale_line(&mut self, line: &NewSaleLineRecord) -> Result<SaleLine>;

    /// Lines of a sale, ordered by id.
    fn list_sale_lines(&self, sale_id: u64) -> Result<Vec<SaleLine>>;
}

/// Helper to construct an appropriate backend from a generic config.
pub fn open_backend(config: &StoreConfig) -> Result<Box<dyn StoreBackend>> {
    match config.backend {
        StoreBackendKind::File => Ok(Box::new(crate::store::FileStoreBackend::open(
            &config.store_path,
        )?)),
        StoreBackendKind::Sqlite => Ok(Box::new(crate::store::SqliteStoreBackend::open(
            &config.store_path,
        )?)),
    }
}
