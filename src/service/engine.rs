//! Request-level entry points.
//!
//! These functions take the JSON request types from `models`, open the
//! configured backend, and delegate to the services. The CLI calls them
//! directly and the HTTP server forwards to them unchanged.

use tracing::info;

use crate::models::{
    BatchSummary, CreateItemsRequest, CreateStoresRequest, Item, LookupRequest, LookupResult,
    LookupSummary, LookupTarget, RecordSaleRequest, SaleReceipt, Store, StoreConfig,
    StoreSummary, RESULT_VERSION,
};
use crate::query::{parse_filter_expr, Filter, Filterable};
use crate::service::error::ServiceResult;
use crate::service::{ItemService, SaleService, StoreService};
use crate::store::{open_backend, open_existing};

/// Run a filtered lookup of items or sales.
///
/// The filter is validated before the store is opened, so a malformed
/// filter never reaches a backend. Lookups are read-only and fail with
/// `StoreNotFound` instead of creating a missing store.
pub fn run_lookup(request: LookupRequest) -> ServiceResult<LookupResult> {
    let mut result = LookupResult {
        version: RESULT_VERSION.to_string(),
        target: request.target,
        items: Vec::new(),
        sales: Vec::new(),
        summary: LookupSummary {
            total_matches: 0,
            truncated: false,
        },
    };

    // Fetch one extra record to detect truncation.
    let fetch_limit = request.limit.map(|limit| limit.saturating_add(1));

    let truncated = match request.target {
        LookupTarget::Items => {
            let filter = build_filter::<Item>(&request)?;
            let mut backend = open_existing(&request.store)?;
            let mut items = ItemService::new(backend.as_mut()).find(&filter, fetch_limit)?;
            let truncated = truncate(&mut items, request.limit);
            result.items = items;
            truncated
        }
        LookupTarget::Sales => {
            let filter = build_filter::<crate::models::Sale>(&request)?;
            let mut backend = open_existing(&request.store)?;
            let mut sales = SaleService::new(backend.as_mut()).find(&filter, fetch_limit)?;
            let truncated = truncate(&mut sales, request.limit);
            result.sales = sales;
            truncated
        }
    };

    result.summary = LookupSummary {
        total_matches: (result.items.len() + result.sales.len()) as u64,
        truncated,
    };

    info!(
        entity = ?request.target,
        matches = result.summary.total_matches,
        truncated,
        "lookup finished"
    );
    Ok(result)
}

/// Combine the JSON filter and the DSL query of a request.
fn build_filter<T: Filterable>(request: &LookupRequest) -> ServiceResult<Filter<T>> {
    let mut filter = Filter::<T>::from_json(&request.filter)?;
    if let Some(query) = &request.query {
        filter.extend(parse_filter_expr::<T>(query)?);
    }
    Ok(filter)
}

fn truncate<T>(records: &mut Vec<T>, limit: Option<usize>) -> bool {
    match limit {
        Some(limit) if records.len() > limit => {
            records.truncate(limit);
            true
        }
        _ => false,
    }
}

pub fn run_create_items(request: CreateItemsRequest) -> ServiceResult<BatchSummary<Item>> {
    let mut backend = open_backend(&request.store)?;
    let summary = ItemService::new(backend.as_mut()).bulk_create(request.items)?;
    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        "items created"
    );
    Ok(summary)
}

pub fn run_create_stores(request: CreateStoresRequest) -> ServiceResult<BatchSummary<Store>> {
    let mut backend = open_backend(&request.store)?;
    let summary = StoreService::new(backend.as_mut()).bulk_create(request.stores)?;
    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        "stores created"
    );
    Ok(summary)
}

pub fn run_record_sale(request: RecordSaleRequest) -> ServiceResult<SaleReceipt> {
    let mut backend = open_backend(&request.store)?;
    let receipt = SaleService::new(backend.as_mut()).record(request.sale, request.lines)?;
    info!(
        sale_id = receipt.sale.id,
        lines = receipt.lines.len(),
        total = receipt.sale.total,
        "sale recorded"
    );
    Ok(receipt)
}

pub fn get_store_info(config: &StoreConfig) -> ServiceResult<StoreSummary> {
    Ok(crate::store::get_store_info(config)?)
}
