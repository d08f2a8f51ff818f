pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod filter;
pub mod io_utils;
pub mod normalize;
pub mod options;
pub mod query;
pub mod record;
pub mod server;
pub mod service;
pub mod source;
pub mod store;
pub mod table;
pub mod tiers;

use std::{env, sync::Arc, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use itertools::Itertools;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cli::{Cli, Commands, SourceArgs},
    config::ServiceConfig,
    filter::FilterSpec,
    query::{QueryRequest, SortDirection},
    service::DatasetService,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("txn_view", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => handle_serve(&args),
        Commands::Query(args) => handle_query(&args),
        Commands::Options(args) => handle_options(&args.source),
        Commands::Warm(args) => handle_warm(&args.source),
    }
}

/// Layers command-line flags over the YAML file (or built-in defaults).
pub fn resolve_config(args: &SourceArgs) -> Result<ServiceConfig> {
    let mut config = match &args.config {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(cache) = &args.cache {
        config.cache_path = Some(cache.clone());
    }
    if let Some(database) = &args.database {
        config.database_path = Some(database.clone());
    }
    if !args.sources.is_empty() {
        config.source_paths = args.sources.clone();
    }
    if let Some(encoding) = &args.input_encoding {
        config.input_encoding = Some(encoding.clone());
    }
    if let Some(limit) = args.tag_sample_limit {
        config.tag_sample_limit = limit;
    }
    debug!("Resolved configuration: {config:?}");
    Ok(config)
}

fn build_service(config: &ServiceConfig, args: &SourceArgs) -> Result<DatasetService> {
    let mut settings = config.source_settings()?;
    if args.delimiter.is_some() {
        settings.delimiter = args.delimiter;
    }
    Ok(DatasetService::with_tag_sample_limit(
        settings,
        config.tag_sample_limit,
    ))
}

fn handle_serve(args: &cli::ServeArgs) -> Result<()> {
    let mut config = resolve_config(&args.source)?;
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    let service = Arc::new(build_service(&config, &args.source)?);
    let runtime = tokio::runtime::Runtime::new().context("Starting async runtime")?;
    runtime.block_on(server::serve(service, &config.socket_addr()))
}

fn handle_query(args: &cli::QueryArgs) -> Result<()> {
    let config = resolve_config(&args.source)?;
    let service = build_service(&config, &args.source)?;
    let request = QueryRequest {
        page: args.page,
        page_size: args.page_size,
        sort_field: Some(args.sort_field.clone()),
        sort_dir: SortDirection::parse(&args.sort_dir),
        search: args.search.clone(),
        filters: FilterSpec::parse(args.filters.as_deref()),
    };
    debug!("Query request: {request:?}");
    let page = service.query(&request)?;
    if args.table {
        let snapshot = service.ensure_loaded()?;
        let columns = table::resolve_columns(&args.columns, &snapshot.dataset)?;
        print!("{}", table::render_page(&page, &columns));
    } else {
        let json = serde_json::to_string_pretty(&page).context("Serializing query page")?;
        println!("{json}");
    }
    Ok(())
}

fn handle_options(args: &SourceArgs) -> Result<()> {
    let config = resolve_config(args)?;
    let service = build_service(&config, args)?;
    let options = service.filter_options()?;
    let json = serde_json::to_string_pretty(&options).context("Serializing filter options")?;
    println!("{json}");
    Ok(())
}

fn handle_warm(args: &SourceArgs) -> Result<()> {
    let config = resolve_config(args)?;
    let service = build_service(&config, args)?;
    let snapshot = service.ensure_loaded()?;
    let tier = snapshot
        .tier
        .map(|tier| tier.to_string())
        .unwrap_or_else(|| "memory".to_string());
    println!(
        "Loaded {} record(s) from {tier}",
        snapshot.dataset.len()
    );

    let cache_path = &service.settings().paths.cache;
    match cache::column_summary(cache_path) {
        Ok(summary) => {
            info!(
                "Cached columns: {}",
                summary
                    .iter()
                    .map(|(name, rows)| format!("{name}={rows}"))
                    .join(", ")
            );
            println!(
                "Binary cache {} holds {} column(s)",
                cache_path.display(),
                summary.len()
            );
        }
        Err(err) => {
            warn!("Could not read binary cache {cache_path:?}: {err:#}");
            println!("No binary cache written at {}", cache_path.display());
        }
    }
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
