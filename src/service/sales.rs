use tracing::{debug, warn};

use crate::models::{BatchSummary, NewSale, NewSaleLine, Sale, SaleLine, SaleReceipt};
use crate::query::Filter;
use crate::service::error::{ServiceError, ServiceResult};
use crate::service::{require_non_negative, require_store};
use crate::store::{NewSaleLineRecord, StoreBackend};

pub struct SaleService<'a> {
    backend: &'a mut dyn StoreBackend,
}

impl<'a> SaleService<'a> {
    pub fn new(backend: &'a mut dyn StoreBackend) -> Self {
        Self { backend }
    }

    /// Create a sale header with a zero total.
    pub fn create(&mut self, new: NewSale) -> ServiceResult<Sale> {
        if let Some(store_id) = new.store_id {
            require_store(&*self.backend, store_id)?;
        }
        let customer = match new.customer.as_deref().map(str::trim) {
            None => None,
            Some("") => return Err(ServiceError::validation("customer must not be empty")),
            Some(customer) => Some(customer.to_string()),
        };

        let sale = self.backend.insert_sale(&NewSale {
            store_id: new.store_id,
            customer,
        })?;
        debug!(id = sale.id, "created sale");
        Ok(sale)
    }

    pub fn create_with<H>(&mut self, new: NewSale, hook: H) -> ServiceResult<Sale>
    where
        H: FnOnce(&mut dyn StoreBackend, &Sale) -> ServiceResult<()>,
    {
        let sale = self.create(new)?;
        super::run_post_action(&mut *self.backend, &sale, format!("sale {}", sale.id), hook)?;
        Ok(sale)
    }

    /// Add one line to an existing sale. The sale total is not touched.
    pub fn add_line(&mut self, sale_id: u64, line: &NewSaleLine) -> ServiceResult<SaleLine> {
        if line.quantity <= 0 {
            return Err(ServiceError::validation(format!(
                "quantity must be > 0; got {}",
                line.quantity
            )));
        }
        if let Some(unit_price) = line.unit_price {
            require_non_negative(unit_price, "unit_price")?;
        }
        self.get(sale_id)?;
        let item = self
            .backend
            .get_item(line.item_id)?
            .ok_or(ServiceError::NotFound {
                entity: "item",
                id: line.item_id,
            })?;

        let record = NewSaleLineRecord {
            sale_id,
            item_id: item.id,
            quantity: line.quantity,
            unit_price: line.unit_price.unwrap_or(item.price),
        };
        let created = self.backend.insert_sale_line(&record)?;
        debug!(sale_id, item_id = item.id, "added sale line");
        Ok(created)
    }

    pub fn bulk_add_lines(
        &mut self,
        sale_id: u64,
        lines: &[NewSaleLine],
    ) -> ServiceResult<BatchSummary<SaleLine>> {
        let mut summary = BatchSummary::default();

        for (index, line) in lines.iter().enumerate() {
            match self.add_line(sale_id, line) {
                Ok(line) => summary.record_success(line),
                Err(err) => {
                    warn!(sale_id, index, error = %err, "sale line rejected");
                    summary.record_failure(index, err);
                }
            }
        }

        Ok(summary)
    }

    /// Record a sale and its lines.
    ///
    /// The header is written first; lines are added by a post-action
    /// hook which also sets the total. If any line is rejected the
    /// header stays committed and the error is a `PostAction` wrapping
    /// the batch failure.
    pub fn record(&mut self, new: NewSale, lines: Vec<NewSaleLine>) -> ServiceResult<SaleReceipt> {
        if lines.is_empty() {
            return Err(ServiceError::validation("a sale needs at least one line"));
        }

        let mut recorded = Vec::new();
        let mut total = 0;
        let sale = self.create_with(new, |backend, sale| {
            let summary = SaleService::new(&mut *backend)
                .bulk_add_lines(sale.id, &lines)?
                .into_result()?;
            total = sale_total(&summary.values)?;
            backend.set_sale_total(sale.id, total)?;
            recorded = summary.values;
            Ok(())
        })?;

        Ok(SaleReceipt {
            sale: Sale { total, ..sale },
            lines: recorded,
        })
    }

    pub fn get(&self, id: u64) -> ServiceResult<Sale> {
        self.backend
            .get_sale(id)?
            .ok_or(ServiceError::NotFound { entity: "sale", id })
    }

    pub fn receipt(&self, id: u64) -> ServiceResult<SaleReceipt> {
        Ok(SaleReceipt {
            sale: self.get(id)?,
            lines: self.backend.list_sale_lines(id)?,
        })
    }

    pub fn find(&self, filter: &Filter<Sale>, limit: Option<usize>) -> ServiceResult<Vec<Sale>> {
        Ok(self.backend.query_sales(filter, limit)?)
    }
}

fn sale_total(lines: &[SaleLine]) -> ServiceResult<i64> {
    lines.iter().try_fold(0i64, |acc, line| {
        line.quantity
            .checked_mul(line.unit_price)
            .and_then(|amount| acc.checked_add(amount))
            .ok_or_else(|| ServiceError::validation("sale total overflows"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewItem;
    use crate::query::parse_filter_expr;
    use crate::service::ItemService;
    use crate::store::SqliteStoreBackend;
    use tempfile::tempdir;

    fn seeded(dir: &std::path::Path) -> SqliteStoreBackend {
        let mut backend = SqliteStoreBackend::open(&dir.join("store.sqlite")).expect("open");
        let mut items = ItemService::new(&mut backend);
        for (name, price) in [("Kettle", 2500), ("Mug", 400)] {
            items
                .create(NewItem {
                    name: name.to_string(),
                    sku: None,
                    price,
                    quantity: 10,
                    store_id: None,
                })
                .expect("item");
        }
        backend
    }

    fn line(item_id: u64, quantity: i64) -> NewSaleLine {
        NewSaleLine {
            item_id,
            quantity,
            unit_price: None,
        }
    }

    #[test]
    fn record_adds_lines_and_sets_total() {
        let dir = tempdir().expect("tempdir");
        let mut backend = seeded(dir.path());
        let mut sales = SaleService::new(&mut backend);

        let receipt = sales
            .record(
                NewSale {
                    store_id: None,
                    customer: Some("Ana".to_string()),
                },
                vec![
                    line(1, 1),
                    NewSaleLine {
                        unit_price: Some(350),
                        ..line(2, 4)
                    },
                ],
            )
            .expect("record");

        assert_eq!(receipt.sale.total, 2500 + 4 * 350);
        assert_eq!(receipt.lines.len(), 2);
        assert_eq!(receipt.lines[0].unit_price, 2500);

        let stored = sales.receipt(receipt.sale.id).expect("receipt");
        assert_eq!(stored.sale.total, receipt.sale.total);

        let found = sales
            .find(&parse_filter_expr("Ana total:>=3000").expect("filter"), None)
            .expect("find");
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn rejected_line_surfaces_as_post_action_batch_error() {
        let dir = tempdir().expect("tempdir");
        let mut backend = seeded(dir.path());
        let mut sales = SaleService::new(&mut backend);

        let err = sales
            .record(NewSale::default(), vec![line(1, 1), line(77, 1), line(2, 0)])
            .expect_err("bad lines");

        match err {
            ServiceError::PostAction { committed, source } => {
                assert_eq!(committed, "sale 1");
                match *source {
                    ServiceError::Batch {
                        failed,
                        total,
                        index,
                        ..
                    } => assert_eq!((failed, total, index), (2, 3, 1)),
                    other => panic!("expected batch error, got {other:?}"),
                }
            }
            other => panic!("expected post-action error, got {other:?}"),
        }

        // Header and the accepted line are committed; the total is not set.
        let stored = sales.receipt(1).expect("receipt");
        assert_eq!(stored.sale.total, 0);
        assert_eq!(stored.lines.len(), 1);
    }

    #[test]
    fn empty_sale_is_rejected_before_any_write() {
        let dir = tempdir().expect("tempdir");
        let mut backend = seeded(dir.path());
        let mut sales = SaleService::new(&mut backend);

        let err = sales
            .record(NewSale::default(), Vec::new())
            .expect_err("no lines");
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(matches!(
            sales.get(1),
            Err(ServiceError::NotFound { entity: "sale", id: 1 })
        ));
    }
}
