use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::args::{FindArgs, OutputFormat, ServeArgs, ServerArgs, StoreArgs, StoreBackendArg};

/// Top-level representation of `.stockroom/config.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub store: Option<StoreSection>,

    #[serde(default)]
    pub find: Option<FindSection>,

    #[serde(default)]
    pub migrate: Option<MigrateSection>,

    #[serde(default)]
    pub serve: Option<ServeSection>,

    #[serde(default)]
    pub http: Option<HttpSection>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StoreSection {
    #[serde(default)]
    pub backend: Option<StoreBackendArg>,
    #[serde(default, alias = "store_path")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FindSection {
    #[serde(default)]
    pub format: Option<OutputFormat>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub no_server: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MigrateSection {
    #[serde(default)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServeSection {
    #[serde(default)]
    pub addr: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HttpSection {
    #[serde(default)]
    pub server_url: Option<String>,
}

/// Discover and load a project-local `.stockroom/config.toml` (or
/// `.stockroom/stockroom.toml`) starting from the current working
/// directory and walking up parent directories.
pub fn load_cli_config() -> Result<Option<CliConfig>> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let config_path = find_project_config(&cwd);

    let Some(path) = config_path else {
        return Ok(None);
    };

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: CliConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse TOML config at {}", path.display()))?;

    tracing::debug!(path = %path.display(), "loaded project config");
    Ok(Some(config))
}

fn find_project_config(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);

    while let Some(current) = dir {
        let stockroom_dir = current.join(".stockroom");
        let config_toml = stockroom_dir.join("config.toml");
        if config_toml.is_file() {
            return Some(config_toml);
        }

        let stockroom_toml = stockroom_dir.join("stockroom.toml");
        if stockroom_toml.is_file() {
            return Some(stockroom_toml);
        }

        dir = current.parent();
    }

    None
}

pub fn apply_store_config_defaults(config: &CliConfig, args: &mut StoreArgs) {
    if let Some(store) = &config.store {
        if args.backend.is_none() {
            if let Some(backend) = store.backend {
                args.backend = Some(backend);
            }
        }

        if args.store_path.is_none() {
            if let Some(path) = &store.path {
                args.store_path = Some(path.clone());
            }
        }
    }
}

/// Fall back to the global `[http] server_url` when no server is set.
pub fn apply_http_config_defaults(config: &CliConfig, args: &mut ServerArgs) {
    if args.server.is_none() {
        if let Some(http) = &config.http {
            if let Some(url) = &http.server_url {
                args.server = Some(url.clone());
            }
        }
    }
}

pub fn apply_find_config_defaults(config: &CliConfig, args: &mut FindArgs) {
    apply_store_config_defaults(config, &mut args.store);

    if let Some(find) = &config.find {
        if matches!(args.format, OutputFormat::Text) {
            if let Some(format) = find.format {
                args.format = format;
            }
        }

        if args.limit.is_none() {
            if let Some(limit) = find.limit {
                args.limit = Some(limit);
            }
        }

        if args.server.server.is_none() {
            if let Some(server) = &find.server {
                args.server.server = Some(server.clone());
            }
        }

        if !args.server.no_server {
            if let Some(true) = find.no_server {
                args.server.no_server = true;
            }
        }
    }

    apply_http_config_defaults(config, &mut args.server);
}

pub fn apply_migrate_config_defaults(config: &CliConfig, path: &mut Option<PathBuf>) {
    if path.is_none() {
        if let Some(migrate) = &config.migrate {
            if let Some(config_path) = &migrate.config {
                *path = Some(config_path.clone());
            }
        }
    }
}

pub fn apply_serve_config_defaults(config: &CliConfig, args: &mut ServeArgs) {
    if let Some(serve) = &config.serve {
        if args.addr == "127.0.0.1:7878" {
            if let Some(addr) = &serve.addr {
                args.addr = addr.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::TargetArg;
    use tempfile::tempdir;

    fn find_args() -> FindArgs {
        FindArgs {
            query: None,
            filter: None,
            target: TargetArg::Items,
            limit: None,
            store: StoreArgs::default(),
            format: OutputFormat::Text,
            server: ServerArgs::default(),
        }
    }

    #[test]
    fn config_is_discovered_from_nested_directories() {
        let dir = tempdir().expect("tempdir");
        let root = dir.path();
        fs::create_dir_all(root.join(".stockroom")).expect("mkdir");
        fs::write(root.join(".stockroom/stockroom.toml"), "").expect("write");
        let nested = root.join("a/b");
        fs::create_dir_all(&nested).expect("mkdir nested");

        let found = find_project_config(&nested).expect("config");
        assert_eq!(found, root.join(".stockroom/stockroom.toml"));
    }

    #[test]
    fn find_defaults_fill_only_unset_flags() {
        let config: CliConfig = toml::from_str(
            r#"
[store]
backend = "sqlite"
path = "data/shop.sqlite"

[find]
format = "json"
limit = 20

[http]
server_url = "http://127.0.0.1:7878"
"#,
        )
        .expect("parse");

        let mut args = find_args();
        args.limit = Some(3);
        apply_find_config_defaults(&config, &mut args);

        assert_eq!(args.store.backend, Some(StoreBackendArg::Sqlite));
        assert_eq!(args.store.store_path, Some(PathBuf::from("data/shop.sqlite")));
        assert_eq!(args.format, OutputFormat::Json);
        assert_eq!(args.limit, Some(3));
        assert_eq!(args.server.server.as_deref(), Some("http://127.0.0.1:7878"));
    }

    #[test]
    fn find_section_can_disable_server() {
        let config: CliConfig = toml::from_str(
            r#"
[find]
no_server = true
"#,
        )
        .expect("parse");

        let mut args = find_args();
        args.server.server = Some("http://127.0.0.1:9".to_string());
        apply_find_config_defaults(&config, &mut args);
        assert_eq!(args.server.effective_url(), None);
    }

    #[test]
    fn migrate_and_serve_defaults() {
        let config: CliConfig = toml::from_str(
            r#"
[migrate]
config = "stockroom.sqlite.toml"

[serve]
addr = "0.0.0.0:9000"
"#,
        )
        .expect("parse");

        let mut path = None;
        apply_migrate_config_defaults(&config, &mut path);
        assert_eq!(path, Some(PathBuf::from("stockroom.sqlite.toml")));

        let mut serve = ServeArgs {
            addr: "127.0.0.1:7878".to_string(),
        };
        apply_serve_config_defaults(&config, &mut serve);
        assert_eq!(serve.addr, "0.0.0.0:9000");
    }
}
