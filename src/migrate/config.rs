use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::migrate::schema::to_snake_case;

/// SQL dialect targeted by generated migrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    Postgresql,
}

/// Optional driver refinement for a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    /// Embedded Postgres running against a local data directory.
    Pglite,
}

/// Identifier casing applied to schema names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Casing {
    #[default]
    SnakeCase,
    Preserve,
}

impl Casing {
    pub fn apply(self, identifier: &str) -> String {
        match self {
            Casing::SnakeCase => to_snake_case(identifier),
            Casing::Preserve => identifier.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbCredentials {
    pub url: String,
}

/// A migration configuration file.
///
/// ```toml
/// dialect = "postgresql"
/// driver = "pglite"
/// casing = "snake_case"
/// schema = "./schema.toml"
/// out = "./migrations"
///
/// [db_credentials]
/// url = "./pgdata"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    pub dialect: Dialect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<Driver>,
    pub db_credentials: DbCredentials,
    #[serde(default)]
    pub casing: Casing,
    /// Schema TOML file.
    pub schema: PathBuf,
    /// Directory receiving migrations and their metadata.
    pub out: PathBuf,
}

impl MigrationConfig {
    /// Load a config file, resolving relative `schema`/`out` paths
    /// against the file's directory, and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read migration config at {}", path.display()))?;
        let mut config: MigrationConfig = toml::from_str(&contents).with_context(|| {
            format!("failed to parse TOML migration config at {}", path.display())
        })?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        if config.schema.is_relative() {
            config.schema = base.join(&config.schema);
        }
        if config.out.is_relative() {
            config.out = base.join(&config.out);
        }

        config
            .validate()
            .with_context(|| format!("invalid migration config at {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.db_credentials.url.trim();
        if url.is_empty() {
            bail!("db_credentials.url must not be empty");
        }

        match (self.dialect, self.driver) {
            (Dialect::Sqlite, Some(driver)) => {
                bail!("driver {driver:?} is not supported with the sqlite dialect")
            }
            (Dialect::Sqlite, None) | (Dialect::Postgresql, Some(Driver::Pglite)) => {
                validate_file_location(url)
            }
            (Dialect::Postgresql, None) => {
                let parsed = Url::parse(url)
                    .with_context(|| format!("invalid postgresql connection URL: {url}"))?;
                match parsed.scheme() {
                    "postgres" | "postgresql" => Ok(()),
                    other => bail!("unsupported postgresql URL scheme: {other}"),
                }
            }
        }
    }
}

/// Accept a plain file path or a `file:` URL.
fn validate_file_location(value: &str) -> Result<()> {
    if value.contains('\0') {
        bail!("db_credentials.url contains null bytes");
    }

    match Url::parse(value) {
        Ok(parsed) if parsed.scheme() == "file" => Ok(()),
        Ok(parsed) if parsed.scheme().len() > 1 => {
            bail!(
                "expected a file path or file: URL, got a {} URL",
                parsed.scheme()
            )
        }
        // Relative paths (and drive letters) are not URLs.
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(dialect: Dialect, driver: Option<Driver>, url: &str) -> MigrationConfig {
        MigrationConfig {
            dialect,
            driver,
            db_credentials: DbCredentials {
                url: url.to_string(),
            },
            casing: Casing::SnakeCase,
            schema: PathBuf::from("schema.toml"),
            out: PathBuf::from("migrations"),
        }
    }

    #[test]
    fn sqlite_accepts_paths_and_file_urls() {
        assert!(config(Dialect::Sqlite, None, "./local.db").validate().is_ok());
        assert!(config(Dialect::Sqlite, None, "file:./local.db")
            .validate()
            .is_ok());
        assert!(config(Dialect::Sqlite, None, "postgres://localhost/db")
            .validate()
            .is_err());
        assert!(config(Dialect::Sqlite, Some(Driver::Pglite), "./local.db")
            .validate()
            .is_err());
    }

    #[test]
    fn postgresql_requires_postgres_url_unless_pglite() {
        assert!(config(Dialect::Postgresql, None, "postgres://u:p@localhost:5432/shop")
            .validate()
            .is_ok());
        assert!(config(Dialect::Postgresql, None, "postgresql://localhost/shop")
            .validate()
            .is_ok());
        assert!(config(Dialect::Postgresql, None, "./pgdata")
            .validate()
            .is_err());
        assert!(config(Dialect::Postgresql, None, "mysql://localhost/shop")
            .validate()
            .is_err());
        assert!(config(Dialect::Postgresql, Some(Driver::Pglite), "./pgdata")
            .validate()
            .is_ok());
    }

    #[test]
    fn load_resolves_paths_relative_to_config_file() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("stockroom.sqlite.toml");
        fs::write(
            &path,
            r#"
dialect = "sqlite"
schema = "./db/schema.toml"
out = "./migrations"

[db_credentials]
url = "file:./local.db"
"#,
        )
        .expect("write config");

        let config = MigrationConfig::load(&path).expect("load");
        assert_eq!(config.dialect, Dialect::Sqlite);
        assert_eq!(config.casing, Casing::SnakeCase);
        assert_eq!(config.schema, tmp.path().join("./db/schema.toml"));
        assert_eq!(config.out, tmp.path().join("./migrations"));
    }

    #[test]
    fn load_rejects_unknown_dialect() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("bad.toml");
        fs::write(
            &path,
            r#"
dialect = "oracle"
schema = "schema.toml"
out = "migrations"

[db_credentials]
url = "x"
"#,
        )
        .expect("write config");

        assert!(MigrationConfig::load(&path).is_err());
    }
}
