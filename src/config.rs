//! Service configuration: data locations, listener and load settings.
//!
//! Values come from built-in defaults, then an optional YAML file, then
//! command-line flags.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use encoding_rs::{Encoding, UTF_8};
use serde::{Deserialize, Serialize};

use crate::{cli, io_utils, options::TAG_SAMPLE_LIMIT};

pub const CACHE_FILE: &str = "transactions.bin";
pub const DATABASE_FILE: &str = "transactions.db";
pub const SOURCE_FILE: &str = "transactions.csv";

/// Fixed locations of the three tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub cache: PathBuf,
    pub database: PathBuf,
    /// Delimited source candidates, in lookup order.
    pub sources: Vec<PathBuf>,
}

impl DataPaths {
    pub fn under(root: &Path) -> Self {
        Self {
            cache: root.join(CACHE_FILE),
            database: root.join(DATABASE_FILE),
            sources: vec![root.join("data").join(SOURCE_FILE), root.join(SOURCE_FILE)],
        }
    }
}

impl Default for DataPaths {
    fn default() -> Self {
        Self::under(Path::new("."))
    }
}

/// Everything the tier resolver needs to read the sources.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub paths: DataPaths,
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
}

impl SourceSettings {
    pub fn new(paths: DataPaths) -> Self {
        Self {
            paths,
            delimiter: None,
            encoding: UTF_8,
        }
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self::new(DataPaths::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub source_paths: Vec<PathBuf>,
    #[serde(default)]
    pub delimiter: Option<String>,
    #[serde(default)]
    pub input_encoding: Option<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_tag_sample_limit")]
    pub tag_sample_limit: usize,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_tag_sample_limit() -> usize {
    TAG_SAMPLE_LIMIT
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            cache_path: None,
            database_path: None,
            source_paths: Vec::new(),
            delimiter: None,
            input_encoding: None,
            host: default_host(),
            port: default_port(),
            tag_sample_limit: default_tag_sample_limit(),
        }
    }
}

impl ServiceConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)
            .with_context(|| format!("Parsing config file {path:?}"))?;
        Ok(config)
    }

    pub fn data_paths(&self) -> DataPaths {
        let mut paths = DataPaths::under(&self.data_dir);
        if let Some(cache) = &self.cache_path {
            paths.cache = cache.clone();
        }
        if let Some(database) = &self.database_path {
            paths.database = database.clone();
        }
        if !self.source_paths.is_empty() {
            paths.sources = self.source_paths.clone();
        }
        paths
    }

    pub fn source_settings(&self) -> Result<SourceSettings> {
        let delimiter = self
            .delimiter
            .as_deref()
            .map(cli::parse_delimiter)
            .transpose()
            .map_err(anyhow::Error::msg)
            .context("Resolving configured delimiter")?;
        Ok(SourceSettings {
            paths: self.data_paths(),
            delimiter,
            encoding: io_utils::resolve_encoding(self.input_encoding.as_deref())?,
        })
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
