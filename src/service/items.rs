use tracing::{debug, warn};

use crate::models::{BatchSummary, Item, NewItem};
use crate::query::{Constraint, Filter, Scalar};
use crate::service::error::{ServiceError, ServiceResult};
use crate::service::{require_non_negative, require_store, trimmed_name};
use crate::store::StoreBackend;

/// Item operations over a borrowed backend.
pub struct ItemService<'a> {
    backend: &'a mut dyn StoreBackend,
}

impl<'a> ItemService<'a> {
    pub fn new(backend: &'a mut dyn StoreBackend) -> Self {
        Self { backend }
    }

    pub fn create(&mut self, new: NewItem) -> ServiceResult<Item> {
        let new = self.validate(new)?;
        let item = self.backend.insert_item(&new)?;
        debug!(id = item.id, name = %item.name, "created item");
        Ok(item)
    }

    /// Create an item, then run `hook` against the committed record.
    pub fn create_with<H>(&mut self, new: NewItem, hook: H) -> ServiceResult<Item>
    where
        H: FnOnce(&mut dyn StoreBackend, &Item) -> ServiceResult<()>,
    {
        let item = self.create(new)?;
        super::run_post_action(&mut *self.backend, &item, format!("item {}", item.id), hook)?;
        Ok(item)
    }

    /// Create each item independently. Rejected entries are recorded in
    /// the summary and do not stop the remaining ones.
    pub fn bulk_create(&mut self, news: Vec<NewItem>) -> ServiceResult<BatchSummary<Item>> {
        let mut summary = BatchSummary::default();

        for (index, new) in news.into_iter().enumerate() {
            match self.create(new) {
                Ok(item) => summary.record_success(item),
                Err(err) => {
                    warn!(index, error = %err, "item rejected");
                    summary.record_failure(index, err);
                }
            }
        }

        Ok(summary)
    }

    pub fn bulk_create_with<H>(
        &mut self,
        news: Vec<NewItem>,
        hook: H,
    ) -> ServiceResult<BatchSummary<Item>>
    where
        H: FnOnce(&mut dyn StoreBackend, &BatchSummary<Item>) -> ServiceResult<()>,
    {
        let summary = self.bulk_create(news)?;
        let committed = format!("{} of {} items", summary.succeeded, summary.total);
        super::run_post_action(&mut *self.backend, &summary, committed, hook)?;
        Ok(summary)
    }

    pub fn get(&self, id: u64) -> ServiceResult<Item> {
        self.backend
            .get_item(id)?
            .ok_or(ServiceError::NotFound { entity: "item", id })
    }

    pub fn find(&self, filter: &Filter<Item>, limit: Option<usize>) -> ServiceResult<Vec<Item>> {
        Ok(self.backend.query_items(filter, limit)?)
    }

    fn validate(&self, new: NewItem) -> ServiceResult<NewItem> {
        let name = trimmed_name(&new.name, "item name")?;
        require_non_negative(new.price, "price")?;
        require_non_negative(new.quantity, "quantity")?;
        if let Some(store_id) = new.store_id {
            require_store(&*self.backend, store_id)?;
        }

        let sku = match new.sku.as_deref().map(str::trim) {
            None => None,
            Some("") => return Err(ServiceError::validation("sku must not be empty")),
            Some(sku) => {
                let filter = Filter::<Item>::all()
                    .with("sku", Constraint::Eq(Scalar::Text(sku.to_string())))?;
                if !self.backend.query_items(&filter, Some(1))?.is_empty() {
                    return Err(ServiceError::validation(format!(
                        "sku `{sku}` is already in use"
                    )));
                }
                Some(sku.to_string())
            }
        };

        Ok(NewItem {
            name,
            sku,
            price: new.price,
            quantity: new.quantity,
            store_id: new.store_id,
        })
    }
}
