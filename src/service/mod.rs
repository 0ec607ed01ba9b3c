//! Result-as-value services over a `StoreBackend`.
//!
//! Every single-entity operation returns `ServiceResult<T>`. Bulk
//! operations return a `BatchSummary` inside `Ok` so partial success is
//! visible without being an error. `*_with` variants accept a
//! post-action hook that runs after the primary write has committed;
//! a hook failure is reported as `ServiceError::PostAction` and the
//! committed write is kept.

pub mod engine;
mod error;
mod items;
mod sales;
mod stores;

pub use engine::{
    get_store_info, run_create_items, run_create_stores, run_lookup, run_record_sale,
};
pub use error::{ServiceError, ServiceResult};
pub use items::ItemService;
pub use sales::SaleService;
pub use stores::StoreService;

use tracing::warn;

use crate::models::Store;
use crate::store::StoreBackend;

/// Run `hook` against a committed value, wrapping its failure.
pub(crate) fn run_post_action<T, H>(
    backend: &mut dyn StoreBackend,
    value: &T,
    committed: String,
    hook: H,
) -> ServiceResult<()>
where
    H: FnOnce(&mut dyn StoreBackend, &T) -> ServiceResult<()>,
{
    hook(backend, value).map_err(|source| {
        warn!(committed = %committed, error = %source, "post-action hook failed");
        ServiceError::PostAction {
            committed,
            source: Box::new(source),
        }
    })
}

pub(crate) fn trimmed_name(raw: &str, what: &str) -> ServiceResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ServiceError::validation(format!("{what} must not be empty")));
    }
    Ok(name.to_string())
}

pub(crate) fn require_non_negative(value: i64, what: &str) -> ServiceResult<()> {
    if value < 0 {
        return Err(ServiceError::validation(format!(
            "{what} must be >= 0; got {value}"
        )));
    }
    Ok(())
}

pub(crate) fn require_store(backend: &dyn StoreBackend, id: u64) -> ServiceResult<Store> {
    backend
        .get_store(id)?
        .ok_or(ServiceError::NotFound { entity: "store", id })
}
