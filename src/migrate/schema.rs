//! Relational schema model shared by the migration generator and the
//! SQLite backend.
//!
//! A schema file is TOML:
//!
//! ```toml
//! [[tables]]
//! name = "saleLines"
//!
//! [[tables.columns]]
//! name = "id"
//! type = "integer"
//! primary_key = true
//!
//! [[tables.columns]]
//! name = "saleId"
//! type = "integer"
//! references = { table = "sales", column = "id", on_delete = "cascade" }
//! ```
//!
//! `Schema::resolve` applies the configured casing and validates the
//! result; only resolved schemas are rendered or snapshotted.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::migrate::config::{Casing, Dialect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Text,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    #[default]
    NoAction,
    Cascade,
    SetNull,
    Restrict,
}

/// Foreign key target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub table: String,
    pub column: String,
    #[serde(default)]
    pub on_delete: OnDelete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Reference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub tables: Vec<Table>,
}

impl Schema {
    /// Read an unresolved schema from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read schema file at {}", path.display()))?;
        let schema: Schema = toml::from_str(&contents)
            .with_context(|| format!("failed to parse TOML schema at {}", path.display()))?;
        Ok(schema)
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Apply `casing` to every identifier and validate the result.
    pub fn resolve(mut self, casing: Casing) -> Result<Self> {
        for table in &mut self.tables {
            table.name = casing.apply(&table.name);
            for column in &mut table.columns {
                column.name = casing.apply(&column.name);
                if let Some(reference) = &mut column.references {
                    reference.table = casing.apply(&reference.table);
                    reference.column = casing.apply(&reference.column);
                }
            }
        }

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        let mut seen_tables = HashSet::new();

        for (position, table) in self.tables.iter().enumerate() {
            validate_identifier(&table.name, "table name")?;
            if !seen_tables.insert(table.name.as_str()) {
                bail!("duplicate table `{}`", table.name);
            }
            if table.columns.is_empty() {
                bail!("table `{}` has no columns", table.name);
            }

            let mut seen_columns = HashSet::new();
            let mut primary_keys = 0;

            for column in &table.columns {
                validate_identifier(&column.name, "column name")?;
                if !seen_columns.insert(column.name.as_str()) {
                    bail!("duplicate column `{}.{}`", table.name, column.name);
                }

                if column.primary_key {
                    primary_keys += 1;
                    if column.ty != ColumnType::Integer || column.nullable {
                        bail!(
                            "primary key `{}.{}` must be a non-null integer",
                            table.name,
                            column.name
                        );
                    }
                }

                if let Some(reference) = &column.references {
                    // Targets must already be defined so that creation order
                    // in generated migrations is always valid.
                    let target = self.tables[..=position]
                        .iter()
                        .find(|t| t.name == reference.table)
                        .ok_or_else(|| {
                            anyhow::anyhow!(
                                "`{}.{}` references table `{}` which is not defined before it",
                                table.name,
                                column.name,
                                reference.table
                            )
                        })?;
                    let target_column = target.column(&reference.column).ok_or_else(|| {
                        anyhow::anyhow!(
                            "`{}.{}` references unknown column `{}.{}`",
                            table.name,
                            column.name,
                            reference.table,
                            reference.column
                        )
                    })?;
                    if target_column.ty != column.ty {
                        bail!(
                            "`{}.{}` and its referenced column `{}.{}` have different types",
                            table.name,
                            column.name,
                            reference.table,
                            reference.column
                        );
                    }
                    if reference.on_delete == OnDelete::SetNull && !column.nullable {
                        bail!(
                            "`{}.{}` uses on_delete = \"set_null\" but is not nullable",
                            table.name,
                            column.name
                        );
                    }
                }
            }

            if primary_keys > 1 {
                bail!("table `{}` declares more than one primary key", table.name);
            }
        }

        Ok(())
    }
}

/// The schema used by the SQLite store backend.
pub fn builtin() -> Schema {
    fn col(name: &str, ty: ColumnType) -> Column {
        Column {
            name: name.to_string(),
            ty,
            nullable: false,
            primary_key: false,
            unique: false,
            references: None,
        }
    }

    fn pk() -> Column {
        Column {
            primary_key: true,
            ..col("id", ColumnType::Integer)
        }
    }

    fn nullable(column: Column) -> Column {
        Column {
            nullable: true,
            ..column
        }
    }

    fn refs(column: Column, table: &str, on_delete: OnDelete) -> Column {
        Column {
            references: Some(Reference {
                table: table.to_string(),
                column: "id".to_string(),
                on_delete,
            }),
            ..column
        }
    }

    Schema {
        tables: vec![
            Table {
                name: "stores".to_string(),
                columns: vec![
                    pk(),
                    col("name", ColumnType::Text),
                    nullable(col("location", ColumnType::Text)),
                    col("created_at", ColumnType::Integer),
                ],
            },
            Table {
                name: "items".to_string(),
                columns: vec![
                    pk(),
                    col("name", ColumnType::Text),
                    Column {
                        unique: true,
                        ..nullable(col("sku", ColumnType::Text))
                    },
                    col("price", ColumnType::Integer),
                    col("quantity", ColumnType::Integer),
                    refs(
                        nullable(col("store_id", ColumnType::Integer)),
                        "stores",
                        OnDelete::SetNull,
                    ),
                    col("created_at", ColumnType::Integer),
                ],
            },
            Table {
                name: "sales".to_string(),
                columns: vec![
                    pk(),
                    refs(
                        nullable(col("store_id", ColumnType::Integer)),
                        "stores",
                        OnDelete::SetNull,
                    ),
                    nullable(col("customer", ColumnType::Text)),
                    col("total", ColumnType::Integer),
                    col("created_at", ColumnType::Integer),
                ],
            },
            Table {
                name: "sale_lines".to_string(),
                columns: vec![
                    pk(),
                    refs(
                        col("sale_id", ColumnType::Integer),
                        "sales",
                        OnDelete::Cascade,
                    ),
                    refs(
                        col("item_id", ColumnType::Integer),
                        "items",
                        OnDelete::Restrict,
                    ),
                    col("quantity", ColumnType::Integer),
                    col("unit_price", ColumnType::Integer),
                ],
            },
        ],
    }
}

/// Render a `CREATE TABLE` statement for the given dialect.
pub fn render_create_table(table: &Table, dialect: Dialect, if_not_exists: bool) -> String {
    let columns = table
        .columns
        .iter()
        .map(|c| format!("    {}", render_column(c, dialect)))
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        "CREATE TABLE {}{} (\n{}\n);",
        if if_not_exists { "IF NOT EXISTS " } else { "" },
        quote(&table.name),
        columns
    )
}

pub fn render_drop_table(table: &str) -> String {
    format!("DROP TABLE {};", quote(table))
}

/// Render the statements that add `column` to an existing table.
///
/// SQLite cannot add a `UNIQUE` column, so there the constraint becomes
/// a separate unique index.
pub fn render_add_column(table: &str, column: &Column, dialect: Dialect) -> Vec<String> {
    match dialect {
        Dialect::Sqlite if column.unique => {
            let plain = Column {
                unique: false,
                ..column.clone()
            };
            vec![
                format!(
                    "ALTER TABLE {} ADD COLUMN {};",
                    quote(table),
                    render_column(&plain, dialect)
                ),
                format!(
                    "CREATE UNIQUE INDEX {} ON {}({});",
                    quote(&unique_index_name(table, &column.name)),
                    quote(table),
                    quote(&column.name)
                ),
            ]
        }
        _ => vec![format!(
            "ALTER TABLE {} ADD COLUMN {};",
            quote(table),
            render_column(column, dialect)
        )],
    }
}

pub fn unique_index_name(table: &str, column: &str) -> String {
    format!("{table}_{column}_unique")
}

pub fn render_drop_column(table: &str, column: &str) -> String {
    format!("ALTER TABLE {} DROP COLUMN {};", quote(table), quote(column))
}

fn render_column(column: &Column, dialect: Dialect) -> String {
    let ty = match (column.ty, column.primary_key, dialect) {
        (ColumnType::Integer, true, Dialect::Postgresql) => "BIGSERIAL",
        (ColumnType::Integer, false, Dialect::Postgresql) => "BIGINT",
        (ColumnType::Integer, _, Dialect::Sqlite) => "INTEGER",
        (ColumnType::Text, _, _) => "TEXT",
    };

    let mut def = format!("{} {}", quote(&column.name), ty);

    if column.primary_key {
        def.push_str(" PRIMARY KEY");
    } else {
        if !column.nullable {
            def.push_str(" NOT NULL");
        }
        if column.unique {
            def.push_str(" UNIQUE");
        }
    }

    if let Some(reference) = &column.references {
        def.push_str(&format!(
            " REFERENCES {}({})",
            quote(&reference.table),
            quote(&reference.column)
        ));
        match reference.on_delete {
            OnDelete::NoAction => {}
            OnDelete::Cascade => def.push_str(" ON DELETE CASCADE"),
            OnDelete::SetNull => def.push_str(" ON DELETE SET NULL"),
            OnDelete::Restrict => def.push_str(" ON DELETE RESTRICT"),
        }
    }

    def
}

fn quote(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

/// Check that an identifier only uses ASCII alphanumerics and underscores.
pub fn validate_identifier(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{what} must not be empty");
    }

    let valid = value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if !valid || value.starts_with(|ch: char| ch.is_ascii_digit()) {
        bail!("{what} may only contain ASCII letters, digits and underscores: {value}");
    }

    Ok(())
}

/// Convert `camelCase`/`PascalCase` identifiers to `snake_case`.
///
/// Runs of capitals are kept together (`HTTPCode` → `http_code`).
pub fn to_snake_case(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 4);

    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_ascii_uppercase() {
            let prev = if i > 0 { Some(chars[i - 1]) } else { None };
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_ascii_uppercase() => {
                    next.map(|n| n.is_ascii_lowercase()).unwrap_or(false)
                }
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_conversion() {
        assert_eq!(to_snake_case("saleLines"), "sale_lines");
        assert_eq!(to_snake_case("storeId"), "store_id");
        assert_eq!(to_snake_case("HTTPCode"), "http_code");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
        assert_eq!(to_snake_case("line2Total"), "line2_total");
    }

    #[test]
    fn builtin_schema_resolves() {
        let schema = builtin().resolve(Casing::SnakeCase).expect("resolve");
        assert_eq!(schema.tables.len(), 4);
        assert!(schema.table("sale_lines").is_some());
    }

    #[test]
    fn renders_dialect_specific_types() {
        let schema = builtin();
        let items = schema.table("items").expect("items");

        let sqlite = render_create_table(items, Dialect::Sqlite, true);
        assert!(sqlite.starts_with("CREATE TABLE IF NOT EXISTS \"items\""));
        assert!(sqlite.contains("\"id\" INTEGER PRIMARY KEY"));
        assert!(sqlite.contains("\"sku\" TEXT UNIQUE"));
        assert!(sqlite.contains(
            "\"store_id\" INTEGER REFERENCES \"stores\"(\"id\") ON DELETE SET NULL"
        ));

        let pg = render_create_table(items, Dialect::Postgresql, false);
        assert!(pg.starts_with("CREATE TABLE \"items\""));
        assert!(pg.contains("\"id\" BIGSERIAL PRIMARY KEY"));
        assert!(pg.contains("\"price\" BIGINT NOT NULL"));
    }

    #[test]
    fn forward_references_are_rejected() {
        let toml = r#"
[[tables]]
name = "lines"
[[tables.columns]]
name = "id"
type = "integer"
primary_key = true
[[tables.columns]]
name = "orderId"
type = "integer"
references = { table = "orders", column = "id" }

[[tables]]
name = "orders"
[[tables.columns]]
name = "id"
type = "integer"
primary_key = true
"#;
        let schema: Schema = toml::from_str(toml).expect("parse");
        let err = schema.resolve(Casing::SnakeCase).expect_err("forward ref");
        assert!(err.to_string().contains("not defined before it"));
    }

    #[test]
    fn casing_applies_to_references() {
        let toml = r#"
[[tables]]
name = "shopStores"
[[tables.columns]]
name = "id"
type = "integer"
primary_key = true

[[tables]]
name = "stockItems"
[[tables.columns]]
name = "shopStoreId"
type = "integer"
nullable = true
references = { table = "shopStores", column = "id", on_delete = "set_null" }
"#;
        let schema: Schema = toml::from_str(toml).expect("parse");
        let resolved = schema.resolve(Casing::SnakeCase).expect("resolve");
        let column = resolved
            .table("stock_items")
            .and_then(|t| t.column("shop_store_id"))
            .expect("column");
        assert_eq!(
            column.references.as_ref().map(|r| r.table.as_str()),
            Some("shop_stores")
        );
    }

    #[test]
    fn invalid_identifiers_and_duplicate_primary_keys_fail() {
        assert!(validate_identifier("items; DROP", "table name").is_err());
        assert!(validate_identifier("1items", "table name").is_err());

        let toml = r#"
[[tables]]
name = "t"
[[tables.columns]]
name = "a"
type = "integer"
primary_key = true
[[tables.columns]]
name = "b"
type = "integer"
primary_key = true
"#;
        let schema: Schema = toml::from_str(toml).expect("parse");
        assert!(schema.resolve(Casing::Preserve).is_err());
    }
}
