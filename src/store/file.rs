//! File-based store backend.
//!
//! This backend stores data under a directory (`.stockroom/` by
//! default):
//! - `meta.json`
//! - `stores.jsonl`
//! - `items.jsonl`
//! - `sales.jsonl`
//! - `sale_lines.jsonl`
//!
//! All records are loaded into memory on open. Inserts append a single
//! JSON line; updates rewrite the affected file through a temporary
//! file and a rename. Lookups are sequential scans.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{Item, NewItem, NewSale, NewStore, Sale, SaleLine, Store, StoreBackendKind};
use crate::query::{Filter, Filterable};
use crate::store::backend::StoreBackend;
use crate::store::models::{NewSaleLineRecord, StoreCounts, StoreMeta, STORE_SCHEMA_VERSION};

const STORES_FILE: &str = "stores.jsonl";
const ITEMS_FILE: &str = "items.jsonl";
const SALES_FILE: &str = "sales.jsonl";
const SALE_LINES_FILE: &str = "sale_lines.jsonl";

/// File-backed implementation of `StoreBackend`.
pub struct FileStoreBackend {
    root: PathBuf,
    meta: StoreMeta,
    stores: Vec<Store>,
    items: Vec<Item>,
    sales: Vec<Sale>,
    sale_lines: Vec<SaleLine>,
}

impl FileStoreBackend {
    /// Open (or create) a file-based store at the given directory.
    pub fn open(store_path: &Path) -> Result<Self> {
        if store_path.exists() && !store_path.is_dir() {
            bail!(
                "file backend requires store_path to be a directory; got {}",
                store_path.display()
            );
        }
        fs::create_dir_all(store_path)
            .with_context(|| format!("failed to create store at {}", store_path.display()))?;

        let meta_path = store_path.join("meta.json");
        let meta = if meta_path.exists() {
            let file = File::open(&meta_path)?;
            let meta: StoreMeta = serde_json::from_reader(file)
                .with_context(|| format!("failed to parse {}", meta_path.display()))?;
            if meta.schema_version != STORE_SCHEMA_VERSION {
                bail!(
                    "unsupported store schema version {}; expected {}",
                    meta.schema_version,
                    STORE_SCHEMA_VERSION
                );
            }
            meta
        } else {
            let meta = StoreMeta::fresh();
            serde_json::to_writer(File::create(&meta_path)?, &meta)?;
            meta
        };

        Ok(Self {
            root: store_path.to_path_buf(),
            meta,
            stores: load_jsonl(&store_path.join(STORES_FILE))?,
            items: load_jsonl(&store_path.join(ITEMS_FILE))?,
            sales: load_jsonl(&store_path.join(SALES_FILE))?,
            sale_lines: load_jsonl(&store_path.join(SALE_LINES_FILE))?,
        })
    }

    fn path(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    fn touch(&mut self) -> Result<()> {
        let mut meta = self.meta.clone();
        meta.updated_at = crate::store::current_epoch_seconds();
        self.save_meta(&meta)
    }
}

impl StoreBackend for FileStoreBackend {
    fn kind(&self) -> StoreBackendKind {
        StoreBackendKind::File
    }

    fn store_path(&self) -> &Path {
        &self.root
    }

    fn load_meta(&self) -> Result<StoreMeta> {
        Ok(self.meta.clone())
    }

    fn save_meta(&mut self, meta: &StoreMeta) -> Result<()> {
        let file = File::create(self.path("meta.json"))?;
        serde_json::to_writer(file, meta)?;
        self.meta = meta.clone();
        Ok(())
    }

    fn counts(&self) -> Result<StoreCounts> {
        Ok(StoreCounts {
            stores: self.stores.len() as u64,
            items: self.items.len() as u64,
            sales: self.sales.len() as u64,
        })
    }

    fn insert_store(&mut self, store: &NewStore) -> Result<Store> {
        let record = Store {
            id: next_id(self.stores.iter().map(|s| s.id)),
            name: store.name.clone(),
            location: store.location.clone(),
            created_at: crate::store::current_epoch_seconds(),
        };

        append_jsonl(&self.path(STORES_FILE), &record)?;
        self.stores.push(record.clone());
        self.touch()?;
        Ok(record)
    }

    fn get_store(&self, id: u64) -> Result<Option<Store>> {
        Ok(self.stores.iter().find(|s| s.id == id).cloned())
    }

    fn list_stores(&self) -> Result<Vec<Store>> {
        Ok(self.stores.clone())
    }

    fn insert_item(&mut self, item: &NewItem) -> Result<Item> {
        let record = Item {
            id: next_id(self.items.iter().map(|i| i.id)),
            name: item.name.clone(),
            sku: item.sku.clone(),
            price: item.price,
            quantity: item.quantity,
            store_id: item.store_id,
            created_at: crate::store::current_epoch_seconds(),
        };

        append_jsonl(&self.path(ITEMS_FILE), &record)?;
        self.items.push(record.clone());
        self.touch()?;
        Ok(record)
    }

    fn get_item(&self, id: u64) -> Result<Option<Item>> {
        Ok(self.items.iter().find(|i| i.id == id).cloned())
    }

    fn query_items(&self, filter: &Filter<Item>, limit: Option<usize>) -> Result<Vec<Item>> {
        Ok(scan(&self.items, filter, limit))
    }

    fn insert_sale(&mut self, sale: &NewSale) -> Result<Sale> {
        let record = Sale {
            id: next_id(self.sales.iter().map(|s| s.id)),
            store_id: sale.store_id,
            customer: sale.customer.clone(),
            total: 0,
            created_at: crate::store::current_epoch_seconds(),
        };

        append_jsonl(&self.path(SALES_FILE), &record)?;
        self.sales.push(record.clone());
        self.touch()?;
        Ok(record)
    }

    fn get_sale(&self, id: u64) -> Result<Option<Sale>> {
        Ok(self.sales.iter().find(|s| s.id == id).cloned())
    }

    fn query_sales(&self, filter: &Filter<Sale>, limit: Option<usize>) -> Result<Vec<Sale>> {
        Ok(scan(&self.sales, filter, limit))
    }

    fn set_sale_total(&mut self, sale_id: u64, total: i64) -> Result<()> {
        let Some(slot) = self.sales.iter_mut().find(|s| s.id == sale_id) else {
            bail!("sale {sale_id} not found");
        };
        slot.total = total;

        rewrite_jsonl(&self.path(SALES_FILE), &self.sales)?;
        self.touch()
    }

    fn insert_sale_line(&mut self, line: &NewSaleLineRecord) -> Result<SaleLine> {
        let record = SaleLine {
            id: next_id(self.sale_lines.iter().map(|l| l.id)),
            sale_id: line.sale_id,
            item_id: line.item_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
        };

        append_jsonl(&self.path(SALE_LINES_FILE), &record)?;
        self.sale_lines.push(record.clone());
        self.touch()?;
        Ok(record)
    }

    fn list_sale_lines(&self, sale_id: u64) -> Result<Vec<SaleLine>> {
        Ok(self
            .sale_lines
            .iter()
            .filter(|l| l.sale_id == sale_id)
            .cloned()
            .collect())
    }
}

fn next_id(ids: impl Iterator<Item = u64>) -> u64 {
    ids.max().unwrap_or(0).saturating_add(1)
}

/// Records are kept in insertion order, which is also id order.
fn scan<T: Filterable + Clone>(records: &[T], filter: &Filter<T>, limit: Option<usize>) -> Vec<T> {
    records
        .iter()
        .filter(|r| filter.matches(r))
        .take(limit.unwrap_or(usize::MAX))
        .cloned()
        .collect()
}

fn load_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let record: T = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid record", path.display(), lineno + 1))?;
        records.push(record);
    }

    Ok(records)
}

fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, record)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

fn rewrite_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let tmp_path = path.with_extension("jsonl.tmp");

    let file = File::create(&tmp_path)?;
    let mut writer = BufWriter::new(file);

    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }

    writer.flush()?;
    fs::rename(tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse_filter_expr;
    use tempfile::tempdir;

    fn new_item(name: &str, price: i64) -> NewItem {
        NewItem {
            name: name.to_string(),
            sku: None,
            price,
            quantity: 1,
            store_id: None,
        }
    }

    #[test]
    fn file_backend_persists_across_reopen() {
        let dir = tempdir().expect("tempdir");
        let root = dir.path().join(".stockroom");

        {
            let mut backend = FileStoreBackend::open(&root).expect("backend");
            let store = backend
                .insert_store(&NewStore {
                    name: "Main".to_string(),
                    location: None,
                })
                .expect("store");
            assert_eq!(store.id, 1);

            for (name, price) in [("a", 100), ("b", 500), ("c", 900)] {
                backend.insert_item(&new_item(name, price)).expect("item");
            }

            let sale = backend.insert_sale(&NewSale::default()).expect("sale");
            backend
                .insert_sale_line(&NewSaleLineRecord {
                    sale_id: sale.id,
                    item_id: 2,
                    quantity: 2,
                    unit_price: 500,
                })
                .expect("line");
            backend.set_sale_total(sale.id, 1000).expect("total");
        }

        let backend = FileStoreBackend::open(&root).expect("reopen");
        assert_eq!(
            backend.counts().expect("counts"),
            StoreCounts {
                stores: 1,
                items: 3,
                sales: 1,
            }
        );

        let filter = parse_filter_expr::<Item>("price:400..1000").expect("filter");
        let items = backend.query_items(&filter, None).expect("query");
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);

        let limited = backend.query_items(&filter, Some(1)).expect("query");
        assert_eq!(limited.len(), 1);

        let sale = backend.get_sale(1).expect("get").expect("sale");
        assert_eq!(sale.total, 1000);
        assert_eq!(backend.list_sale_lines(1).expect("lines").len(), 1);
    }

    #[test]
    fn file_backend_rejects_plain_file_path() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("store.sqlite");
        fs::write(&path, b"").expect("write");

        let err = FileStoreBackend::open(&path).err().expect("error");
        assert!(err.to_string().contains("requires store_path to be a directory"));
    }
}
