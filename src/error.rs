use std::path::PathBuf;

use thiserror::Error;

/// Failure to produce a dataset from any tier.
///
/// Cache and relational-store failures are logged and fall through; only the
/// delimited source, the last tier, can fail a load.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("No dataset source configured")]
    NoSourceConfigured,
    #[error("Dataset source not found: {path:?}")]
    SourceNotFound { path: PathBuf },
    #[error("Failed to read dataset source {path:?}: {reason:#}")]
    SourceUnreadable { path: PathBuf, reason: anyhow::Error },
}
