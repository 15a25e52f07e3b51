use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::parser::columns::ColumnStrategy;
use crate::parser::ParseOptions;

const DEFAULT_FILE: &str = "meter_ingest";
const ENV_PREFIX: &str = "METER";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,
    /// Leading rows scanned for Model/Type/Class/Const.
    pub metadata_rows: usize,
    pub column_strategy: ColumnStrategy,
    pub merge_header: bool,
    pub default_uploader: String,
    pub organization: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            db_path: PathBuf::from("data/meter_test.sqlite"),
            metadata_rows: 6,
            column_strategy: ColumnStrategy::Fixed,
            merge_header: false,
            default_uploader: "Technician".to_string(),
            organization: "Ghana Standards Authority".to_string(),
        }
    }
}

impl Settings {
    /// Defaults, then `meter_ingest.toml` (or `config_file`), then `METER_*`
    /// environment variables.
    pub fn load(config_file: Option<&Path>) -> Result<Settings> {
        let mut builder = Config::builder();
        builder = match config_file {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_FILE).required(false)),
        };
        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        Ok(settings)
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            metadata_rows: self.metadata_rows,
            organization: self.organization.clone(),
            strategy: self.column_strategy,
            merge_header: self.merge_header,
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_template() {
        let s = Settings::default();
        assert_eq!(s.metadata_rows, 6);
        assert_eq!(s.column_strategy, ColumnStrategy::Fixed);
        assert_eq!(s.default_uploader, "Technician");
        assert!(!s.merge_header);
    }

    #[test]
    fn file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("meter_ingest_{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "db_path = \"/tmp/x.sqlite\"\ncolumn_strategy = \"label\"\nmerge_header = true\n",
        )
        .unwrap();
        let s = Settings::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(s.db_path, PathBuf::from("/tmp/x.sqlite"));
        assert_eq!(s.column_strategy, ColumnStrategy::Label);
        assert!(s.merge_header);
        assert_eq!(s.metadata_rows, 6);
        assert_eq!(s.organization, "Ghana Standards Authority");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let path = std::env::temp_dir().join("meter_ingest_does_not_exist.toml");
        assert!(Settings::load(Some(&path)).is_err());
    }
}
