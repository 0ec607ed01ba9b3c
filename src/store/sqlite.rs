//! SQLite-based store backend.
//!
//! Tables are created from the built-in relational schema rendered
//! for the sqlite dialect (`stores`, `items`, `sales`, `sale_lines`),
//! plus a backend-private `meta(key, value)` table.
//!
//! Filters are compiled into a parameterized `WHERE` clause. Field
//! names come from the entity's static field list, so they are safe to
//! splice into SQL; all operands are bound as parameters. The SQLite
//! connection is configured with:
//!
//! - `foreign_keys = ON` so sale lines cascade with their sale.
//! - `journal_mode = WAL` for concurrent readers and a single writer.
//! - `synchronous = NORMAL` as a balance between safety and speed.
//! - `busy_timeout` to avoid transient `database is locked` errors.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};

use crate::migrate::{builtin, render_create_table, Dialect};
use crate::models::{Item, NewItem, NewSale, NewStore, Sale, SaleLine, Store, StoreBackendKind};
use crate::query::{Constraint, Filter, Filterable, Scalar};
use crate::store::backend::StoreBackend;
use crate::store::models::{NewSaleLineRecord, StoreCounts, StoreMeta, STORE_SCHEMA_VERSION};

const ITEM_COLUMNS: &str = "id, name, sku, price, quantity, store_id, created_at";
const SALE_COLUMNS: &str = "id, store_id, customer, total, created_at";

/// SQLite-backed implementation of `StoreBackend`.
pub struct SqliteStoreBackend {
    path: PathBuf,
    conn: Connection,
}

impl SqliteStoreBackend {
    /// Open (or create) a SQLite store at the given path.
    pub fn open(store_path: &Path) -> Result<Self> {
        if let Some(parent) = store_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        if store_path.is_dir() {
            bail!(
                "sqlite backend requires store_path to be a file; got {}",
                store_path.display()
            );
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        let conn = Connection::open_with_flags(store_path, flags)
            .with_context(|| format!("failed to open sqlite store at {}", store_path.display()))?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(std::time::Duration::from_millis(5000))?;

        Self::initialize_schema(&conn)?;

        let mut backend = Self {
            path: store_path.to_path_buf(),
            conn,
        };

        let meta = backend.read_meta()?;
        match meta {
            Some(meta) if meta.schema_version != STORE_SCHEMA_VERSION => {
                bail!(
                    "unsupported store schema version {}; expected {}",
                    meta.schema_version,
                    STORE_SCHEMA_VERSION
                );
            }
            Some(_) => {}
            None => backend.save_meta(&StoreMeta::fresh())?,
        }

        Ok(backend)
    }

    fn initialize_schema(conn: &Connection) -> Result<()> {
        let mut ddl = String::from(
            "CREATE TABLE IF NOT EXISTS meta (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );\n",
        );

        for table in &builtin().tables {
            ddl.push_str(&render_create_table(table, Dialect::Sqlite, true));
            ddl.push('\n');
        }

        ddl.push_str(
            "CREATE INDEX IF NOT EXISTS idx_items_price ON items(price);
            CREATE INDEX IF NOT EXISTS idx_items_name ON items(name);
            CREATE INDEX IF NOT EXISTS idx_items_store_id ON items(store_id);
            CREATE INDEX IF NOT EXISTS idx_sales_store_id ON sales(store_id);
            CREATE INDEX IF NOT EXISTS idx_sale_lines_sale_id ON sale_lines(sale_id);",
        );

        conn.execute_batch(&ddl)?;
        Ok(())
    }

    fn read_meta(&self) -> Result<Option<StoreMeta>> {
        let mut stmt = self.conn.prepare("SELECT key, value FROM meta")?;
        let rows = stmt.query_map([], |row| {
            let key: String = row.get(0)?;
            let value: String = row.get(1)?;
            Ok((key, value))
        })?;

        let mut map = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            map.insert(key, value);
        }

        if map.is_empty() {
            return Ok(None);
        }

        let schema_version = map
            .get("schema_version")
            .cloned()
            .unwrap_or_else(|| STORE_SCHEMA_VERSION.to_string());
        let tool_version = map
            .get("tool_version")
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        let created_at = map
            .get("created_at")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        let updated_at = map
            .get("updated_at")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(created_at);

        Ok(Some(StoreMeta {
            schema_version,
            tool_version,
            created_at,
            updated_at,
        }))
    }

    fn touch(&self) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('updated_at', ?1)",
            params![crate::store::current_epoch_seconds().to_string()],
        )?;
        Ok(())
    }

    fn count(&self, table: &str) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(n as u64)
    }

    fn select<T, F>(
        &self,
        table: &str,
        columns: &str,
        filter: &Filter<T>,
        limit: Option<usize>,
        map_row: F,
    ) -> Result<Vec<T>>
    where
        T: Filterable,
        F: Fn(&Row<'_>) -> rusqlite::Result<T>,
    {
        let (where_clause, mut values) = compile_filter(filter);

        let mut sql = format!("SELECT {columns} FROM {table}");
        if !where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        sql.push_str(" ORDER BY id ASC");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT ?{}", values.len() + 1));
            values.push(SqlValue::Integer(limit as i64));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| map_row(row))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

/// Compile a filter into a `WHERE` clause body and its bound values.
///
/// An empty filter yields an empty clause. Comparisons against NULL
/// columns evaluate to NULL in SQL and so never match, which mirrors
/// `Filter::matches`.
pub(crate) fn compile_filter<T: Filterable>(filter: &Filter<T>) -> (String, Vec<SqlValue>) {
    fn bind(scalar: &Scalar, values: &mut Vec<SqlValue>) -> String {
        values.push(match scalar {
            Scalar::Integer(v) => SqlValue::Integer(*v),
            Scalar::Text(v) => SqlValue::Text(v.clone()),
        });
        format!("?{}", values.len())
    }

    let mut parts = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();

    for clause in filter.clauses() {
        let column = clause.field;
        let part = match &clause.constraint {
            Constraint::Eq(v) => format!("{column} = {}", bind(v, &mut values)),
            Constraint::Ne(v) => format!("{column} <> {}", bind(v, &mut values)),
            Constraint::Gt(v) => format!("{column} > {}", bind(v, &mut values)),
            Constraint::Gte(v) => format!("{column} >= {}", bind(v, &mut values)),
            Constraint::Lt(v) => format!("{column} < {}", bind(v, &mut values)),
            Constraint::Lte(v) => format!("{column} <= {}", bind(v, &mut values)),
            Constraint::Between { low, high } => {
                let low = bind(low, &mut values);
                let high = bind(high, &mut values);
                format!("{column} BETWEEN {low} AND {high}")
            }
            Constraint::In(options) => {
                let placeholders = options
                    .iter()
                    .map(|v| bind(v, &mut values))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{column} IN ({placeholders})")
            }
            Constraint::Contains(needle) => {
                let p = bind(&Scalar::Text(needle.clone()), &mut values);
                format!("instr({column}, {p}) > 0")
            }
        };
        parts.push(part);
    }

    (parts.join(" AND "), values)
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    let id: i64 = row.get(0)?;
    let store_id: Option<i64> = row.get(5)?;
    let created_at: i64 = row.get(6)?;

    Ok(Item {
        id: id as u64,
        name: row.get(1)?,
        sku: row.get(2)?,
        price: row.get(3)?,
        quantity: row.get(4)?,
        store_id: store_id.map(|id| id as u64),
        created_at: created_at as u64,
    })
}

fn sale_from_row(row: &Row<'_>) -> rusqlite::Result<Sale> {
    let id: i64 = row.get(0)?;
    let store_id: Option<i64> = row.get(1)?;
    let created_at: i64 = row.get(4)?;

    Ok(Sale {
        id: id as u64,
        store_id: store_id.map(|id| id as u64),
        customer: row.get(2)?,
        total: row.get(3)?,
        created_at: created_at as u64,
    })
}

fn store_from_row(row: &Row<'_>) -> rusqlite::Result<Store> {
    let id: i64 = row.get(0)?;
    let created_at: i64 = row.get(3)?;

    Ok(Store {
        id: id as u64,
        name: row.get(1)?,
        location: row.get(2)?,
        created_at: created_at as u64,
    })
}

fn sale_line_from_row(row: &Row<'_>) -> rusqlite::Result<SaleLine> {
    let id: i64 = row.get(0)?;
    let sale_id: i64 = row.get(1)?;
    let item_id: i64 = row.get(2)?;

    Ok(SaleLine {
        id: id as u64,
        sale_id: sale_id as u64,
        item_id: item_id as u64,
        quantity: row.get(3)?,
        unit_price: row.get(4)?,
    })
}

impl StoreBackend for SqliteStoreBackend {
    fn kind(&self) -> StoreBackendKind {
        StoreBackendKind::Sqlite
    }

    fn store_path(&self) -> &Path {
        &self.path
    }

    fn load_meta(&self) -> Result<StoreMeta> {
        Ok(self.read_meta()?.unwrap_or_else(StoreMeta::fresh))
    }

    fn save_meta(&mut self, meta: &StoreMeta) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM meta", [])?;

        {
            let mut stmt = tx.prepare("INSERT INTO meta (key, value) VALUES (?1, ?2)")?;

            let rows = [
                ("schema_version", meta.schema_version.clone()),
                ("tool_version", meta.tool_version.clone()),
                ("created_at", meta.created_at.to_string()),
                ("updated_at", meta.updated_at.to_string()),
            ];

            for (key, value) in rows {
                stmt.execute(params![key, value])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn counts(&self) -> Result<StoreCounts> {
        Ok(StoreCounts {
            stores: self.count("stores")?,
            items: self.count("items")?,
            sales: self.count("sales")?,
        })
    }

    fn insert_store(&mut self, store: &NewStore) -> Result<Store> {
        let created_at = crate::store::current_epoch_seconds();
        self.conn.execute(
            "INSERT INTO stores (name, location, created_at) VALUES (?1, ?2, ?3)",
            params![store.name, store.location, created_at as i64],
        )?;
        let id = self.conn.last_insert_rowid();
        self.touch()?;

        Ok(Store {
            id: id as u64,
            name: store.name.clone(),
            location: store.location.clone(),
            created_at,
        })
    }

    fn get_store(&self, id: u64) -> Result<Option<Store>> {
        let store = self
            .conn
            .query_row(
                "SELECT id, name, location, created_at FROM stores WHERE id = ?1",
                params![id as i64],
                store_from_row,
            )
            .optional()?;
        Ok(store)
    }

    fn list_stores(&self) -> Result<Vec<Store>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, location, created_at FROM stores ORDER BY id ASC")?;
        let rows = stmt.query_map([], store_from_row)?;

        let mut stores = Vec::new();
        for row in rows {
            stores.push(row?);
        }
        Ok(stores)
    }

    fn insert_item(&mut self, item: &NewItem) -> Result<Item> {
        let created_at = crate::store::current_epoch_seconds();
        self.conn.execute(
            "INSERT INTO items (name, sku, price, quantity, store_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                item.name,
                item.sku,
                item.price,
                item.quantity,
                item.store_id.map(|id| id as i64),
                created_at as i64
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.touch()?;

        Ok(Item {
            id: id as u64,
            name: item.name.clone(),
            sku: item.sku.clone(),
            price: item.price,
            quantity: item.quantity,
            store_id: item.store_id,
            created_at,
        })
    }

    fn get_item(&self, id: u64) -> Result<Option<Item>> {
        let item = self
            .conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
                params![id as i64],
                item_from_row,
            )
            .optional()?;
        Ok(item)
    }

    fn query_items(&self, filter: &Filter<Item>, limit: Option<usize>) -> Result<Vec<Item>> {
        self.select("items", ITEM_COLUMNS, filter, limit, item_from_row)
    }

    fn insert_sale(&mut self, sale: &NewSale) -> Result<Sale> {
        let created_at = crate::store::current_epoch_seconds();
        self.conn.execute(
            "INSERT INTO sales (store_id, customer, total, created_at) VALUES (?1, ?2, 0, ?3)",
            params![
                sale.store_id.map(|id| id as i64),
                sale.customer,
                created_at as i64
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.touch()?;

        Ok(Sale {
            id: id as u64,
            store_id: sale.store_id,
            customer: sale.customer.clone(),
            total: 0,
            created_at,
        })
    }

    fn get_sale(&self, id: u64) -> Result<Option<Sale>> {
        let sale = self
            .conn
            .query_row(
                &format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"),
                params![id as i64],
                sale_from_row,
            )
            .optional()?;
        Ok(sale)
    }

    fn query_sales(&self, filter: &Filter<Sale>, limit: Option<usize>) -> Result<Vec<Sale>> {
        self.select("sales", SALE_COLUMNS, filter, limit, sale_from_row)
    }

    fn set_sale_total(&mut self, sale_id: u64, total: i64) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE sales SET total = ?1 WHERE id = ?2",
            params![total, sale_id as i64],
        )?;
        if changed == 0 {
            bail!("sale {sale_id} not found");
        }
        self.touch()
    }

    fn insert_sale_line(&mut self, line: &NewSaleLineRecord) -> Result<SaleLine> {
        self.conn.execute(
            "INSERT INTO sale_lines (sale_id, item_id, quantity, unit_price)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                line.sale_id as i64,
                line.item_id as i64,
                line.quantity,
                line.unit_price
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.touch()?;

        Ok(SaleLine {
            id: id as u64,
            sale_id: line.sale_id,
            item_id: line.item_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
        })
    }

    fn list_sale_lines(&self, sale_id: u64) -> Result<Vec<SaleLine>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, sale_id, item_id, quantity, unit_price
             FROM sale_lines WHERE sale_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![sale_id as i64], sale_line_from_row)?;

        let mut lines = Vec::new();
        for row in rows {
            lines.push(row?);
        }
        Ok(lines)
    }
}
