use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Serve and query a transaction dataset", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load the dataset and serve the JSON query API
    Serve(ServeArgs),
    /// Run a single paginated query and print the page
    Query(QueryArgs),
    /// Print the distinct values available for filtering
    Options(OptionsArgs),
    /// Load the dataset through the tiers and refresh the binary cache
    Warm(WarmArgs),
}

/// Where the dataset lives and how to read it.
#[derive(Debug, Args, Default, Clone)]
pub struct SourceArgs {
    /// YAML service configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Directory holding the cache, database and source files
    #[arg(long = "data-dir")]
    pub data_dir: Option<PathBuf>,
    /// Binary cache file (defaults to <data-dir>/transactions.bin)
    #[arg(long)]
    pub cache: Option<PathBuf>,
    /// SQLite database file (defaults to <data-dir>/transactions.db)
    #[arg(long)]
    pub database: Option<PathBuf>,
    /// Delimited source candidates, tried in order (repeatable)
    #[arg(long = "source", action = clap::ArgAction::Append)]
    pub sources: Vec<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the source file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Records scanned when collecting the tag list
    #[arg(long = "tag-sample-limit")]
    pub tag_sample_limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Interface to bind (defaults to 0.0.0.0)
    #[arg(long)]
    pub host: Option<String>,
    /// Port to listen on (defaults to 8000)
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// One-based page number
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    pub page: i64,
    /// Records per page
    #[arg(long = "page-size", default_value_t = 10, allow_negative_numbers = true)]
    pub page_size: i64,
    /// Case-insensitive search over customer name and phone number
    #[arg(short = 'q', long = "search", default_value = "")]
    pub search: String,
    /// Field to sort by
    #[arg(long = "sort-field", default_value = "Date")]
    pub sort_field: String,
    /// Sort direction (`asc` or `desc`)
    #[arg(long = "sort-dir", default_value = "desc")]
    pub sort_dir: String,
    /// JSON filter object, e.g. '{"customerRegions":["North"]}'
    #[arg(long)]
    pub filters: Option<String>,
    /// Render the page as an elastic table instead of JSON
    #[arg(long)]
    pub table: bool,
    /// Columns shown in table mode
    #[arg(short = 'C', long = "columns", value_delimiter = ',')]
    pub columns: Vec<String>,
}

#[derive(Debug, Args)]
pub struct OptionsArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Debug, Args)]
pub struct WarmArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_aliases() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter("pipe"), Ok(b'|'));
        assert_eq!(parse_delimiter(";"), Ok(b';'));
        assert!(parse_delimiter("").is_err());
        assert!(parse_delimiter("ab").is_err());
        assert!(parse_delimiter("é").is_err());
    }

    #[test]
    fn query_defaults_match_the_http_defaults() {
        let cli = Cli::try_parse_from(["txn-view", "query"]).unwrap();
        let Commands::Query(args) = cli.command else {
            panic!("expected query command");
        };
        assert_eq!(args.page, 1);
        assert_eq!(args.page_size, 10);
        assert_eq!(args.sort_field, "Date");
        assert_eq!(args.sort_dir, "desc");
        assert!(args.search.is_empty());
        assert!(!args.table);
    }

    #[test]
    fn source_flags_are_shared_by_every_command() {
        let cli = Cli::try_parse_from([
            "txn-view",
            "warm",
            "--data-dir",
            "/srv",
            "--source",
            "a.csv",
            "--source",
            "b.csv",
            "--delimiter",
            "tab",
        ])
        .unwrap();
        let Commands::Warm(args) = cli.command else {
            panic!("expected warm command");
        };
        assert_eq!(args.source.data_dir, Some(PathBuf::from("/srv")));
        assert_eq!(args.source.sources.len(), 2);
        assert_eq!(args.source.delimiter, Some(b'\t'));
    }
}
