//! Tiered dataset loading: binary cache, then relational store, then the raw
//! delimited source.
//!
//! The first tier that yields data wins. Store and source tables go through
//! the normalizer and are written back to the binary cache; a failed cache
//! write is logged and never fails the load.

use std::{fmt, path::Path};

use log::{info, warn};

use crate::{
    cache,
    config::SourceSettings,
    error::LoadError,
    normalize::{NormalizeReport, normalize_with_report},
    record::Dataset,
    source, store,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    BinaryCache,
    RelationalStore,
    DelimitedSource,
}

impl Tier {
    fn as_str(self) -> &'static str {
        match self {
            Tier::BinaryCache => "binary cache",
            Tier::RelationalStore => "relational store",
            Tier::DelimitedSource => "delimited source",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct LoadOutcome {
    pub dataset: Dataset,
    pub tier: Tier,
    /// Absent for the binary cache, which is stored pre-normalized.
    pub report: Option<NormalizeReport>,
}

pub fn resolve(settings: &SourceSettings) -> Result<LoadOutcome, LoadError> {
    let paths = &settings.paths;

    if paths.cache.is_file() {
        info!("Loading data from binary cache {:?}", paths.cache);
        match cache::load(&paths.cache) {
            Ok(dataset) => {
                return Ok(LoadOutcome {
                    dataset,
                    tier: Tier::BinaryCache,
                    report: None,
                });
            }
            Err(err) => warn!("Could not read binary cache {:?}: {err:#}", paths.cache),
        }
    }

    if paths.database.is_file() {
        info!("Loading data from relational store {:?}", paths.database);
        match store::read_table(&paths.database) {
            Ok(table) => {
                let (dataset, report) = normalize_with_report(table);
                persist(&dataset, &paths.cache);
                return Ok(LoadOutcome {
                    dataset,
                    tier: Tier::RelationalStore,
                    report: Some(report),
                });
            }
            Err(err) => warn!(
                "Could not load from relational store {:?}: {err:#}",
                paths.database
            ),
        }
    }

    let path = source::locate(&paths.sources).ok_or(LoadError::NoSourceConfigured)?;
    if !path.is_file() {
        return Err(LoadError::SourceNotFound {
            path: path.to_path_buf(),
        });
    }
    info!("Loading data from delimited source {path:?}");
    let table = source::read_table(path, settings.delimiter, settings.encoding).map_err(
        |reason| LoadError::SourceUnreadable {
            path: path.to_path_buf(),
            reason,
        },
    )?;
    let (dataset, report) = normalize_with_report(table);
    persist(&dataset, &paths.cache);
    Ok(LoadOutcome {
        dataset,
        tier: Tier::DelimitedSource,
        report: Some(report),
    })
}

fn persist(dataset: &Dataset, path: &Path) {
    match cache::save(dataset, path) {
        Ok(()) => info!("Saved {} row(s) to binary cache {path:?}", dataset.len()),
        Err(err) => warn!("Could not save binary cache {path:?}: {err:#}"),
    }
}
