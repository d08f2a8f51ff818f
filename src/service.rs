//! Process-wide dataset state.
//!
//! The dataset and its filter options are loaded at most once per process.
//! Concurrent first requests wait on a single loader; once published the
//! snapshot is read without locking. A failed load publishes nothing, so the
//! next request retries.

use std::sync::{
    Arc, Mutex, OnceLock, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use log::{debug, info, warn};

use crate::{
    config::SourceSettings,
    error::LoadError,
    options::{self, FilterOptions, TAG_SAMPLE_LIMIT},
    query::{self, QueryPage, QueryRequest},
    record::Dataset,
    tiers::{self, Tier},
};

#[derive(Debug)]
pub struct DatasetSnapshot {
    pub dataset: Dataset,
    pub filter_options: FilterOptions,
    /// `None` when the dataset was handed in rather than loaded.
    pub tier: Option<Tier>,
}

#[derive(Debug)]
pub struct DatasetService {
    settings: SourceSettings,
    tag_sample_limit: usize,
    loaded: OnceLock<Arc<DatasetSnapshot>>,
    init_lock: Mutex<()>,
    loads: AtomicUsize,
}

impl DatasetService {
    pub fn new(settings: SourceSettings) -> Self {
        Self::with_tag_sample_limit(settings, TAG_SAMPLE_LIMIT)
    }

    pub fn with_tag_sample_limit(settings: SourceSettings, tag_sample_limit: usize) -> Self {
        Self {
            settings,
            tag_sample_limit,
            loaded: OnceLock::new(),
            init_lock: Mutex::new(()),
            loads: AtomicUsize::new(0),
        }
    }

    /// A service whose dataset is already in memory; no tier is ever read.
    pub fn preloaded(dataset: Dataset) -> Self {
        let service = Self::new(SourceSettings::default());
        let snapshot = build_snapshot(dataset, None, service.tag_sample_limit);
        let _ = service.loaded.set(Arc::new(snapshot));
        service
    }

    pub fn settings(&self) -> &SourceSettings {
        &self.settings
    }

    pub fn ensure_loaded(&self) -> Result<Arc<DatasetSnapshot>, LoadError> {
        if let Some(snapshot) = self.loaded.get() {
            return Ok(Arc::clone(snapshot));
        }

        let _guard = self
            .init_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(snapshot) = self.loaded.get() {
            debug!("Dataset was loaded by a concurrent request");
            return Ok(Arc::clone(snapshot));
        }

        self.loads.fetch_add(1, Ordering::SeqCst);
        let outcome = tiers::resolve(&self.settings).inspect_err(|err| {
            warn!("Dataset load failed: {err}");
        })?;
        if let Some(report) = &outcome.report
            && report.total_failures() > 0
        {
            warn!(
                "{} value(s) could not be coerced while normalizing {} row(s)",
                report.total_failures(),
                report.rows
            );
        }
        info!(
            "Loaded {} record(s) from {}",
            outcome.dataset.len(),
            outcome.tier
        );

        let snapshot = Arc::new(build_snapshot(
            outcome.dataset,
            Some(outcome.tier),
            self.tag_sample_limit,
        ));
        let _ = self.loaded.set(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// The published snapshot, without triggering a load.
    pub fn snapshot(&self) -> Option<Arc<DatasetSnapshot>> {
        self.loaded.get().cloned()
    }

    pub fn filter_options(&self) -> Result<FilterOptions, LoadError> {
        Ok(self.ensure_loaded()?.filter_options.clone())
    }

    pub fn query(&self, request: &QueryRequest) -> Result<QueryPage, LoadError> {
        let snapshot = self.ensure_loaded()?;
        Ok(query::execute(&snapshot.dataset, request))
    }

    /// Number of tier resolutions attempted so far.
    pub fn loads_performed(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

fn build_snapshot(dataset: Dataset, tier: Option<Tier>, tag_sample_limit: usize) -> DatasetSnapshot {
    let filter_options = options::aggregate_with_limit(&dataset, tag_sample_limit);
    DatasetSnapshot {
        dataset,
        filter_options,
        tier,
    }
}
