use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;

use crate::models::{
    CreateItemsRequest, CreateStoresRequest, LookupRequest, LookupTarget, NewItem, NewSale,
    NewSaleLine, NewStore, RecordSaleRequest, StoreBackendKind, StoreConfig,
};

/// Top-level CLI entrypoint for `stockroom`.
#[derive(Parser, Debug)]
#[command(
    name = "stockroom",
    about = "Item, store and sale records with structured filters and SQL migrations",
    author = "stockroom developers",
    subcommand_required = false,
    arg_required_else_help = false
)]
pub struct Cli {
    /// Print the JSON schema version used for `--format=json` output
    /// and exit.
    #[arg(long = "schema-version")]
    pub schema_version: bool,

    /// Enable debug logging (overridden by `RUST_LOG`).
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Look up items or sales with a filter.
    Find(FindArgs),
    /// Create a store.
    AddStore(AddStoreArgs),
    /// Create an item.
    AddItem(AddItemArgs),
    /// Bulk-create items from a JSON file.
    Import(ImportArgs),
    /// Record a sale with one or more lines.
    Sale(SaleArgs),
    /// Inspect an existing store without modifying it.
    Info(InfoArgs),
    /// Generate or check SQL migrations.
    #[command(subcommand)]
    Migrate(MigrateCommand),
    /// Run a long-lived HTTP+JSON daemon.
    Serve(ServeArgs),
}

/// CLI representation of output format.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Table,
    Json,
}

/// CLI representation of store backend kind.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendArg {
    File,
    Sqlite,
}

/// CLI representation of a lookup target.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetArg {
    Items,
    Sales,
}

/// Store selection shared by every data subcommand.
#[derive(Args, Debug, Default, Clone)]
pub struct StoreArgs {
    /// Store backend to use.
    ///
    /// When omitted, the backend is inferred from `--store-path`: a
    /// `.sqlite` extension selects SQLite, anything else the file
    /// backend.
    #[arg(long = "backend", value_enum)]
    pub backend: Option<StoreBackendArg>,

    /// Location of the store.
    ///
    /// For the file backend this is a directory (default ".stockroom").
    /// For the SQLite backend this is a database file (default
    /// ".stockroom/store.sqlite").
    #[arg(long = "store-path")]
    pub store_path: Option<PathBuf>,
}

/// Options for delegating a command to a running daemon.
#[derive(Args, Debug, Default, Clone)]
pub struct ServerArgs {
    /// Optional server URL for delegating the command to a daemon.
    ///
    /// When set (either via this flag or the `STOCKROOM_SERVER_URL`
    /// environment variable), the CLI sends the request to the HTTP
    /// server instead of opening the store locally. Use `--no-server`
    /// to override this and force local execution.
    #[arg(long = "server", env = "STOCKROOM_SERVER_URL")]
    pub server: Option<String>,

    /// Disable use of any configured server and force local execution.
    #[arg(long = "no-server")]
    pub no_server: bool,
}

/// Arguments specific to the `find` subcommand.
#[derive(Args, Debug)]
pub struct FindArgs {
    /// Filter expression in the compact DSL, e.g. `price:500..550`.
    pub query: Option<String>,

    /// Filter in JSON form, e.g. `{"price":{"between":[500,550]}}`.
    ///
    /// Combined with the DSL query using AND when both are given.
    #[arg(long = "filter")]
    pub filter: Option<String>,

    /// Entity to look up.
    #[arg(long = "target", value_enum, default_value_t = TargetArg::Items)]
    pub target: TargetArg,

    /// Maximum number of records to return.
    #[arg(long = "limit")]
    pub limit: Option<usize>,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Output format (text, table, or json).
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(flatten)]
    pub server: ServerArgs,
}

/// Arguments specific to the `add-store` subcommand.
#[derive(Args, Debug)]
pub struct AddStoreArgs {
    /// Store name.
    pub name: String,

    /// Optional free-form location.
    #[arg(long = "location")]
    pub location: Option<String>,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Output format (text or json).
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(flatten)]
    pub server: ServerArgs,
}

/// Arguments specific to the `add-item` subcommand.
#[derive(Args, Debug)]
pub struct AddItemArgs {
    /// Item name.
    pub name: String,

    /// Price in minor currency units (e.g. cents).
    #[arg(long = "price")]
    pub price: i64,

    /// Units in stock.
    #[arg(long = "quantity", default_value_t = 0)]
    pub quantity: i64,

    /// Optional stock-keeping unit; must be unique.
    #[arg(long = "sku")]
    pub sku: Option<String>,

    /// Id of the owning store.
    #[arg(long = "store-id")]
    pub store_id: Option<u64>,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Output format (text or json).
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(flatten)]
    pub server: ServerArgs,
}

/// Arguments specific to the `import` subcommand.
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// JSON file holding an array of items.
    pub file: PathBuf,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Output format (text or json).
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(flatten)]
    pub server: ServerArgs,
}

/// Arguments specific to the `sale` subcommand.
#[derive(Args, Debug)]
pub struct SaleArgs {
    /// Sale line as `ITEM_ID:QUANTITY` or `ITEM_ID:QUANTITY@UNIT_PRICE`.
    ///
    /// Repeat the flag for several lines.
    #[arg(long = "line", value_parser = parse_sale_line, required = true)]
    pub lines: Vec<NewSaleLine>,

    /// Optional customer name.
    #[arg(long = "customer")]
    pub customer: Option<String>,

    /// Id of the store the sale happened in.
    #[arg(long = "store-id")]
    pub store_id: Option<u64>,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Output format (text or json).
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(flatten)]
    pub server: ServerArgs,
}

/// Arguments specific to the `info` subcommand.
#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Output format (text or json).
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(flatten)]
    pub server: ServerArgs,
}

/// Migration subcommands.
#[derive(Subcommand, Debug)]
pub enum MigrateCommand {
    /// Diff the schema against the last snapshot and write a migration.
    Generate(MigrateGenerateArgs),
    /// Validate the migration config and schema without writing.
    Check(MigrateCheckArgs),
}

#[derive(Args, Debug)]
pub struct MigrateGenerateArgs {
    /// Migration config file (TOML).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Tag used in the migration file name.
    #[arg(long = "name", default_value = "migration")]
    pub name: String,

    /// Output format (text or json).
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct MigrateCheckArgs {
    /// Migration config file (TOML).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
}

/// Arguments specific to the `serve` subcommand.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to, e.g. "127.0.0.1:7878".
    #[arg(long = "addr", default_value = "127.0.0.1:7878")]
    pub addr: String,
}

/// Parse `ITEM_ID:QUANTITY[@UNIT_PRICE]`.
pub fn parse_sale_line(raw: &str) -> Result<NewSaleLine, String> {
    let (item, rest) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected ITEM_ID:QUANTITY[@UNIT_PRICE], got `{raw}`"))?;
    let (quantity, unit_price) = match rest.split_once('@') {
        Some((quantity, price)) => (quantity, Some(price)),
        None => (rest, None),
    };

    let item_id = item
        .trim()
        .parse::<u64>()
        .map_err(|_| format!("invalid item id `{item}`"))?;
    let quantity = quantity
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("invalid quantity `{quantity}`"))?;
    let unit_price = unit_price
        .map(|p| {
            p.trim()
                .parse::<i64>()
                .map_err(|_| format!("invalid unit price `{p}`"))
        })
        .transpose()?;

    Ok(NewSaleLine {
        item_id,
        quantity,
        unit_price,
    })
}

impl StoreArgs {
    /// Resolve backend and path, applying the default locations.
    pub fn to_config(&self) -> StoreConfig {
        let backend_arg = match (&self.backend, &self.store_path) {
            (Some(kind), _) => *kind,
            (None, Some(path)) => {
                if path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|ext| ext.eq_ignore_ascii_case("sqlite"))
                    .unwrap_or(false)
                {
                    StoreBackendArg::Sqlite
                } else {
                    StoreBackendArg::File
                }
            }
            (None, None) => StoreBackendArg::File,
        };

        let backend = match backend_arg {
            StoreBackendArg::File => StoreBackendKind::File,
            StoreBackendArg::Sqlite => StoreBackendKind::Sqlite,
        };

        let store_path = match (&self.store_path, backend_arg) {
            (Some(path), _) => path.clone(),
            (None, StoreBackendArg::File) => PathBuf::from(".stockroom"),
            (None, StoreBackendArg::Sqlite) => PathBuf::from(".stockroom").join("store.sqlite"),
        };

        StoreConfig {
            backend,
            store_path,
        }
    }
}

impl ServerArgs {
    pub fn effective_url(&self) -> Option<String> {
        if self.no_server {
            None
        } else {
            self.server.clone()
        }
    }
}

/// Build a `LookupRequest` from CLI `FindArgs`.
pub fn lookup_request_from_args(args: &FindArgs) -> Result<LookupRequest> {
    let filter = match &args.filter {
        Some(raw) => serde_json::from_str(raw).context("--filter is not valid JSON")?,
        None => serde_json::Value::Null,
    };

    Ok(LookupRequest {
        store: args.store.to_config(),
        target: match args.target {
            TargetArg::Items => LookupTarget::Items,
            TargetArg::Sales => LookupTarget::Sales,
        },
        filter,
        query: args.query.clone().filter(|q| !q.trim().is_empty()),
        limit: args.limit,
    })
}

pub fn create_store_request_from_args(args: &AddStoreArgs) -> CreateStoresRequest {
    CreateStoresRequest {
        store: args.store.to_config(),
        stores: vec![NewStore {
            name: args.name.clone(),
            location: args.location.clone(),
        }],
    }
}

pub fn create_item_request_from_args(args: &AddItemArgs) -> CreateItemsRequest {
    CreateItemsRequest {
        store: args.store.to_config(),
        items: vec![NewItem {
            name: args.name.clone(),
            sku: args.sku.clone(),
            price: args.price,
            quantity: args.quantity,
            store_id: args.store_id,
        }],
    }
}

/// Build a bulk `CreateItemsRequest` from a JSON array file.
pub fn import_request_from_args(args: &ImportArgs) -> Result<CreateItemsRequest> {
    let items = read_items_file(&args.file)?;
    Ok(CreateItemsRequest {
        store: args.store.to_config(),
        items,
    })
}

fn read_items_file(path: &Path) -> Result<Vec<NewItem>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read import file at {}", path.display()))?;
    let items: Vec<NewItem> = serde_json::from_str(&contents).with_context(|| {
        format!(
            "failed to parse {}: expected a JSON array of items",
            path.display()
        )
    })?;
    if items.is_empty() {
        bail!("import file {} contains no items", path.display());
    }
    Ok(items)
}

pub fn record_sale_request_from_args(args: &SaleArgs) -> RecordSaleRequest {
    RecordSaleRequest {
        store: args.store.to_config(),
        sale: NewSale {
            store_id: args.store_id,
            customer: args.customer.clone(),
        },
        lines: args.lines.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn store_config_defaults_to_file_backend() {
        let config = StoreArgs::default().to_config();
        assert_eq!(config.backend, StoreBackendKind::File);
        assert_eq!(config.store_path, PathBuf::from(".stockroom"));

        let config = StoreArgs {
            backend: Some(StoreBackendArg::Sqlite),
            store_path: None,
        }
        .to_config();
        assert_eq!(config.store_path, PathBuf::from(".stockroom/store.sqlite"));
    }

    #[test]
    fn store_backend_is_inferred_from_extension() {
        let config = StoreArgs {
            backend: None,
            store_path: Some(PathBuf::from("data/shop.SQLITE")),
        }
        .to_config();
        assert_eq!(config.backend, StoreBackendKind::Sqlite);

        let config = StoreArgs {
            backend: None,
            store_path: Some(PathBuf::from("data/shop")),
        }
        .to_config();
        assert_eq!(config.backend, StoreBackendKind::File);
    }

    #[test]
    fn sale_lines_parse_with_optional_price() {
        assert_eq!(
            parse_sale_line("3:2").expect("line"),
            NewSaleLine {
                item_id: 3,
                quantity: 2,
                unit_price: None,
            }
        );
        assert_eq!(
            parse_sale_line("3:2@450").expect("line").unit_price,
            Some(450)
        );
        assert!(parse_sale_line("3").is_err());
        assert!(parse_sale_line("x:2").is_err());
        assert!(parse_sale_line("3:2@cheap").is_err());
    }

    #[test]
    fn lookup_request_combines_json_filter_and_query() {
        let args = FindArgs {
            query: Some("widget".to_string()),
            filter: Some(r#"{"price":{"between":[500,550]}}"#.to_string()),
            target: TargetArg::Items,
            limit: Some(5),
            store: StoreArgs::default(),
            format: OutputFormat::Json,
            server: ServerArgs::default(),
        };

        let request = lookup_request_from_args(&args).expect("request");
        assert_eq!(request.query.as_deref(), Some("widget"));
        assert_eq!(request.filter["price"]["between"][1], 550);
        assert_eq!(request.limit, Some(5));

        let bad = FindArgs {
            filter: Some("{price".to_string()),
            ..args
        };
        assert!(lookup_request_from_args(&bad).is_err());
    }

    #[test]
    fn import_reads_json_array() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("items.json");
        fs::write(
            &path,
            r#"[{"name":"Mug","price":400},{"name":"Kettle","price":2500,"quantity":3}]"#,
        )
        .expect("write");

        let items = read_items_file(&path).expect("items");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].quantity, 0);
        assert_eq!(items[1].quantity, 3);

        fs::write(&path, "[]").expect("write");
        assert!(read_items_file(&path).is_err());
    }

    #[test]
    fn server_flag_is_ignored_with_no_server() {
        let args = ServerArgs {
            server: Some("http://127.0.0.1:7878".to_string()),
            no_server: true,
        };
        assert_eq!(args.effective_url(), None);
    }
}
