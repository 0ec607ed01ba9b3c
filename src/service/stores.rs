use tracing::{debug, warn};

use crate::models::{BatchSummary, NewStore, Store};
use crate::service::error::{ServiceError, ServiceResult};
use crate::service::trimmed_name;
use crate::store::StoreBackend;

pub struct StoreService<'a> {
    backend: &'a mut dyn StoreBackend,
}

impl<'a> StoreService<'a> {
    pub fn new(backend: &'a mut dyn StoreBackend) -> Self {
        Self { backend }
    }

    pub fn create(&mut self, new: NewStore) -> ServiceResult<Store> {
        let name = trimmed_name(&new.name, "store name")?;
        let location = new
            .location
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());

        let store = self.backend.insert_store(&NewStore { name, location })?;
        debug!(id = store.id, name = %store.name, "created store");
        Ok(store)
    }

    pub fn bulk_create(&mut self, news: Vec<NewStore>) -> ServiceResult<BatchSummary<Store>> {
        let mut summary = BatchSummary::default();

        for (index, new) in news.into_iter().enumerate() {
            match self.create(new) {
                Ok(store) => summary.record_success(store),
                Err(err) => {
                    warn!(index, error = %err, "store rejected");
                    summary.record_failure(index, err);
                }
            }
        }

        Ok(summary)
    }

    pub fn get(&self, id: u64) -> ServiceResult<Store> {
        self.backend
            .get_store(id)?
            .ok_or(ServiceError::NotFound { entity: "store", id })
    }

    pub fn list(&self) -> ServiceResult<Vec<Store>> {
        Ok(self.backend.list_stores()?)
    }
}
