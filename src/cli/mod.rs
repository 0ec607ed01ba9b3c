use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing::info;

use crate::migrate::{self, MigrationConfig};
use crate::models::{StoreConfig, RESULT_VERSION};
use crate::server;
use crate::service::engine;

mod args;
mod config;
mod format;
mod http_backend;

pub use args::{
    AddItemArgs, AddStoreArgs, Cli, Commands, FindArgs, ImportArgs, InfoArgs, MigrateCommand,
    OutputFormat, SaleArgs, ServeArgs, ServerArgs, StoreArgs,
};

use config::{
    apply_find_config_defaults, apply_http_config_defaults, apply_migrate_config_defaults,
    apply_serve_config_defaults, apply_store_config_defaults, load_cli_config, CliConfig,
};
use http_backend::HttpStoreClient;

/// Entry point for the CLI binary.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    crate::logging::init_cli_logger(cli.verbose);

    if cli.schema_version {
        println!("Result JSON schema version: {}", RESULT_VERSION);
        return Ok(());
    }

    let cli_config = load_cli_config()?;

    match cli.command {
        Some(Commands::Find(mut find_args)) => {
            if let Some(ref config) = cli_config {
                apply_find_config_defaults(config, &mut find_args);
            }

            let mut request = args::lookup_request_from_args(&find_args)?;
            let result = if let Some(server_url) = find_args.server.effective_url() {
                request.store = absolute_store(request.store)?;
                HttpStoreClient::new(server_url)?.search(&request)?
            } else {
                engine::run_lookup(request)?
            };

            match find_args.format {
                OutputFormat::Text => format::print_lookup_text(&result),
                OutputFormat::Table => format::print_lookup_table(&result),
                OutputFormat::Json => format::print_json(&result),
            }
        }
        Some(Commands::AddStore(mut add_args)) => {
            apply_data_defaults(&cli_config, &mut add_args.store, &mut add_args.server);

            let mut request = args::create_store_request_from_args(&add_args);
            let summary = if let Some(server_url) = add_args.server.effective_url() {
                request.store = absolute_store(request.store)?;
                HttpStoreClient::new(server_url)?.create_stores(&request)?
            } else {
                engine::run_create_stores(request)?
            };

            // A single-entry batch that failed is a command failure.
            let summary = summary.into_result()?;
            match add_args.format {
                OutputFormat::Json => format::print_json(&summary),
                OutputFormat::Text | OutputFormat::Table => {
                    format::print_batch_text(&summary, "store", |s| format!("#{} {}", s.id, s.name))
                }
            }
        }
        Some(Commands::AddItem(mut add_args)) => {
            apply_data_defaults(&cli_config, &mut add_args.store, &mut add_args.server);

            let mut request = args::create_item_request_from_args(&add_args);
            let summary = if let Some(server_url) = add_args.server.effective_url() {
                request.store = absolute_store(request.store)?;
                HttpStoreClient::new(server_url)?.create_items(&request)?
            } else {
                engine::run_create_items(request)?
            };

            let summary = summary.into_result()?;
            match add_args.format {
                OutputFormat::Json => format::print_json(&summary),
                OutputFormat::Text | OutputFormat::Table => {
                    format::print_batch_text(&summary, "item", |i| {
                        format!("#{} {} price={}", i.id, i.name, i.price)
                    })
                }
            }
        }
        Some(Commands::Import(mut import_args)) => {
            apply_data_defaults(&cli_config, &mut import_args.store, &mut import_args.server);

            let mut request = args::import_request_from_args(&import_args)?;
            let summary = if let Some(server_url) = import_args.server.effective_url() {
                request.store = absolute_store(request.store)?;
                HttpStoreClient::new(server_url)?.create_items(&request)?
            } else {
                engine::run_create_items(request)?
            };

            // Partial success is reported, not treated as an error.
            match import_args.format {
                OutputFormat::Json => format::print_json(&summary),
                OutputFormat::Text | OutputFormat::Table => {
                    format::print_batch_text(&summary, "item", |i| {
                        format!("#{} {} price={}", i.id, i.name, i.price)
                    })
                }
            }
        }
        Some(Commands::Sale(mut sale_args)) => {
            apply_data_defaults(&cli_config, &mut sale_args.store, &mut sale_args.server);

            let mut request = args::record_sale_request_from_args(&sale_args);
            let receipt = if let Some(server_url) = sale_args.server.effective_url() {
                request.store = absolute_store(request.store)?;
                HttpStoreClient::new(server_url)?.record_sale(&request)?
            } else {
                engine::run_record_sale(request)?
            };

            match sale_args.format {
                OutputFormat::Json => format::print_json(&receipt),
                OutputFormat::Text | OutputFormat::Table => format::print_receipt_text(&receipt),
            }
        }
        Some(Commands::Info(mut info_args)) => {
            apply_data_defaults(&cli_config, &mut info_args.store, &mut info_args.server);

            let config = info_args.store.to_config();
            let summary = if let Some(server_url) = info_args.server.effective_url() {
                HttpStoreClient::new(server_url)?.store_info(&absolute_store(config)?)?
            } else {
                engine::get_store_info(&config)?
            };

            match info_args.format {
                OutputFormat::Text | OutputFormat::Table => {
                    format::print_store_summary_text(&summary)
                }
                OutputFormat::Json => format::print_json(&summary),
            }
        }
        Some(Commands::Migrate(MigrateCommand::Generate(mut gen_args))) => {
            let config = load_migration_config(&cli_config, &mut gen_args.config)?;
            let outcome = migrate::generate(&config, &gen_args.name)?;

            match gen_args.format {
                OutputFormat::Json => format::print_json(&outcome),
                OutputFormat::Text | OutputFormat::Table => format::print_migration_text(&outcome),
            }
        }
        Some(Commands::Migrate(MigrateCommand::Check(mut check_args))) => {
            let config = load_migration_config(&cli_config, &mut check_args.config)?;
            let schema = migrate::check(&config)?;

            println!(
                "ok: {} tables, dialect {:?}, output {}",
                schema.tables.len(),
                config.dialect,
                config.out.display()
            );
            Ok(())
        }
        Some(Commands::Serve(mut serve_args)) => {
            if let Some(ref config) = cli_config {
                apply_serve_config_defaults(config, &mut serve_args);
            }

            let addr: SocketAddr = serve_args
                .addr
                .parse()
                .with_context(|| format!("invalid listen address `{}`", serve_args.addr))?;
            println!("Starting stockroom HTTP server on http://{addr}");
            info!(%addr, "starting server");

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;

            runtime.block_on(server::run(addr))?;
            Ok(())
        }
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn apply_data_defaults(
    cli_config: &Option<CliConfig>,
    store: &mut StoreArgs,
    server: &mut ServerArgs,
) {
    if let Some(config) = cli_config {
        apply_store_config_defaults(config, store);
        apply_http_config_defaults(config, server);
    }
}

fn load_migration_config(
    cli_config: &Option<CliConfig>,
    path: &mut Option<PathBuf>,
) -> Result<MigrationConfig> {
    if let Some(config) = cli_config {
        apply_migrate_config_defaults(config, path);
    }

    let path = path
        .as_deref()
        .context("no migration config given; pass --config or set [migrate] config")?;
    MigrationConfig::load(path)
}

/// Resolve a relative store path against the current directory so the
/// daemon opens the same store regardless of its own working directory.
fn absolute_store(mut config: StoreConfig) -> Result<StoreConfig> {
    if config.store_path.is_relative() {
        let cwd = std::env::current_dir().context("failed to read current directory")?;
        config.store_path = cwd.join(&config.store_path);
    }
    Ok(config)
}
