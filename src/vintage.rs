//! Vintage-aware metadata cache.
//!
//! `current/` is overwritten by every sync. The first sync of a calendar
//! day also freezes a copy under `vintages/<date>/`; later syncs on the
//! same day leave that copy alone. Staleness is computed on demand from
//! the newest sync-history entry.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use camino::Utf8Path;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogKind, CatalogSource, Codelist, DataflowDescriptor, IndicatorDescriptor};
use crate::domain::IndicatorCode;
use crate::error::{FetchError, IndicatorError};
use crate::store::{SYNC_SUMMARY_FILE, Store, VINTAGE_SUMMARY_FILE};
use crate::table::Table;
use crate::validate::{ValidationReport, validate_table};

pub const DEFAULT_MAX_AGE_DAYS: i64 = 30;
pub const HISTORY_RETENTION: usize = 50;
pub const REF_AREA_CODELIST: &str = "CL_REF_AREA";
pub const DEFAULT_CODELISTS: [&str; 6] = [
    REF_AREA_CODELIST,
    "CL_SEX",
    "CL_AGE",
    "CL_WEALTH_QUINTILE",
    "CL_RESIDENCE",
    "CL_UNIT_MEASURE",
];

const VINTAGE_DATE_FORMAT: &str = "%Y-%m-%d";

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncError {
    /// `dataflows`, `indicators` or `codelist:<id>`.
    pub catalog: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub synced_at: DateTime<Utc>,
    pub vintage: String,
    pub vintage_created: bool,
    pub dataflows: usize,
    pub indicators: usize,
    pub codelists: usize,
    pub errors: Vec<SyncError>,
}

impl SyncSummary {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub synced_at: DateTime<Utc>,
    pub vintage: String,
    pub dataflows: usize,
    pub indicators: usize,
    pub codelists: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CacheState {
    Uninitialized,
    Fresh { last_sync: DateTime<Utc> },
    Stale { last_sync: DateTime<Utc> },
}

/// Catalog contents as of one sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataSnapshot {
    pub dataflows: BTreeMap<String, DataflowDescriptor>,
    pub indicators: BTreeMap<String, IndicatorDescriptor>,
    pub codelists: BTreeMap<String, Codelist>,
    pub synced_at: Option<DateTime<Utc>>,
}

impl MetadataSnapshot {
    pub fn ids(&self, kind: CatalogKind) -> BTreeSet<String> {
        match kind {
            CatalogKind::Dataflows => self.dataflows.keys().cloned().collect(),
            CatalogKind::Indicators => self.indicators.keys().cloned().collect(),
            CatalogKind::Codelists => self.codelists.keys().cloned().collect(),
        }
    }

    pub fn codelist(&self, id: &str) -> Option<&Codelist> {
        self.codelists.get(id).filter(|list| !list.codes.is_empty())
    }

    /// Reference-area code to name, when the codelist has been cached.
    pub fn country_names(&self) -> Option<HashMap<String, String>> {
        self.codelist(REF_AREA_CODELIST).map(|list| {
            list.codes
                .iter()
                .map(|(code, name)| (code.clone(), name.clone()))
                .collect()
        })
    }
}

/// A single catalog as loaded from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CatalogContents {
    Dataflows(BTreeMap<String, DataflowDescriptor>),
    Indicators(BTreeMap<String, IndicatorDescriptor>),
    Codelists(BTreeMap<String, Codelist>),
}

impl CatalogContents {
    pub fn len(&self) -> usize {
        match self {
            CatalogContents::Dataflows(map) => map.len(),
            CatalogContents::Indicators(map) => map.len(),
            CatalogContents::Codelists(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl CatalogDiff {
    fn between(before: &BTreeSet<String>, after: &BTreeSet<String>) -> Self {
        Self {
            added: after.difference(before).cloned().collect(),
            removed: before.difference(after).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VintageComparison {
    pub from: String,
    pub to: String,
    pub dataflows: CatalogDiff,
    pub indicators: CatalogDiff,
    pub codelists: CatalogDiff,
}

pub struct VintageStore<C: CatalogSource, K: Clock = SystemClock> {
    store: Store,
    source: C,
    clock: K,
    codelists: Vec<String>,
}

impl<C: CatalogSource> VintageStore<C, SystemClock> {
    pub fn new(store: Store, source: C) -> Self {
        Self::with_clock(store, source, SystemClock)
    }
}

impl<C: CatalogSource, K: Clock> VintageStore<C, K> {
    pub fn with_clock(store: Store, source: C, clock: K) -> Self {
        Self {
            store,
            source,
            clock,
            codelists: DEFAULT_CODELISTS.iter().map(|id| id.to_string()).collect(),
        }
    }

    /// Replaces the codelists fetched on sync.
    pub fn with_codelists<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.codelists = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Fetches every catalog and refreshes `current/`. A catalog that fails
    /// keeps its previous contents and is reported in the summary's error
    /// list. A sync where nothing succeeded leaves the cache untouched and
    /// returns [`IndicatorError::SyncFailed`]; it is not recorded in the
    /// history and freezes no vintage.
    pub fn sync_all(&self) -> Result<SyncSummary, IndicatorError> {
        let synced_at = self.clock.now();
        let vintage = synced_at.format(VINTAGE_DATE_FORMAT).to_string();
        let current = self.store.current_dir();
        let previous = self.read_snapshot(&current)?;
        let mut errors = Vec::new();

        let fetched_dataflows = match self.source.fetch_dataflows() {
            Ok(list) => Some(
                list.into_iter()
                    .map(|flow| (flow.id.clone(), flow))
                    .collect::<BTreeMap<_, _>>(),
            ),
            Err(err) => {
                errors.push(sync_error(CatalogKind::Dataflows.to_string(), err));
                None
            }
        };

        let fetched_indicators = match self.source.fetch_indicators() {
            Ok(list) => Some(
                list.into_iter()
                    .map(|indicator| (indicator.code.clone(), indicator))
                    .collect::<BTreeMap<_, _>>(),
            ),
            Err(err) => {
                errors.push(sync_error(CatalogKind::Indicators.to_string(), err));
                None
            }
        };

        let mut fetched_codelists = BTreeMap::new();
        for id in &self.codelists {
            match self.source.fetch_codelist(id) {
                Ok(list) => {
                    fetched_codelists.insert(id.clone(), list);
                }
                Err(err) => errors.push(sync_error(format!("codelist:{id}"), err)),
            }
        }

        if fetched_dataflows.is_none()
            && fetched_indicators.is_none()
            && fetched_codelists.is_empty()
        {
            tracing::warn!(
                vintage = %vintage,
                errors = errors.len(),
                "metadata sync failed for every catalog"
            );
            return Err(IndicatorError::SyncFailed {
                failures: errors
                    .into_iter()
                    .map(|error| format!("{}: {}", error.catalog, error.message))
                    .collect(),
            });
        }

        let dataflows = match fetched_dataflows {
            Some(map) => {
                Store::write_json(&Store::catalog_path(&current, CatalogKind::Dataflows), &map)?;
                map.len()
            }
            None => previous.dataflows.len(),
        };
        let indicators = match fetched_indicators {
            Some(map) => {
                Store::write_json(&Store::catalog_path(&current, CatalogKind::Indicators), &map)?;
                map.len()
            }
            None => previous.indicators.len(),
        };
        let mut codelists = previous.codelists;
        codelists.extend(fetched_codelists);
        Store::write_json(&Store::catalog_path(&current, CatalogKind::Codelists), &codelists)?;

        let mut summary = SyncSummary {
            synced_at,
            vintage: vintage.clone(),
            vintage_created: false,
            dataflows,
            indicators,
            codelists: codelists.len(),
            errors,
        };
        Store::write_json(&current.join(SYNC_SUMMARY_FILE), &summary)?;

        if !self.store.vintage_exists(&vintage) {
            let target = self.store.vintage_dir(&vintage);
            Store::copy_dir_atomic(&current, &target)?;
            summary.vintage_created = true;
            Store::write_json(&target.join(VINTAGE_SUMMARY_FILE), &summary)?;
        }

        let mut history = self.history()?;
        history.insert(
            0,
            HistoryEntry {
                synced_at,
                vintage: vintage.clone(),
                dataflows: summary.dataflows,
                indicators: summary.indicators,
                codelists: summary.codelists,
                errors: summary.errors.len(),
            },
        );
        history.truncate(HISTORY_RETENTION);
        Store::write_json(&self.store.history_path(), &history)?;

        tracing::info!(
            vintage = %vintage,
            dataflows = summary.dataflows,
            indicators = summary.indicators,
            codelists = summary.codelists,
            errors = summary.errors.len(),
            "metadata sync finished"
        );
        for error in &summary.errors {
            tracing::warn!(catalog = %error.catalog, "catalog sync failed: {}", error.message);
        }
        Ok(summary)
    }

    /// Syncs when the cache is uninitialized or older than `max_age`
    /// (default 30 days). Returns whether a sync ran.
    pub fn ensure_synced(&self, max_age: Option<Duration>) -> Result<bool, IndicatorError> {
        match self.state(max_age)? {
            CacheState::Fresh { .. } => Ok(false),
            CacheState::Uninitialized | CacheState::Stale { .. } => {
                self.sync_all()?;
                Ok(true)
            }
        }
    }

    pub fn state(&self, max_age: Option<Duration>) -> Result<CacheState, IndicatorError> {
        let max_age = max_age.unwrap_or_else(|| Duration::days(DEFAULT_MAX_AGE_DAYS));
        let Some(last_sync) = self.last_sync()? else {
            return Ok(CacheState::Uninitialized);
        };
        if self.clock.now() - last_sync > max_age {
            Ok(CacheState::Stale { last_sync })
        } else {
            Ok(CacheState::Fresh { last_sync })
        }
    }

    fn last_sync(&self) -> Result<Option<DateTime<Utc>>, IndicatorError> {
        Ok(self.history()?.first().map(|entry| entry.synced_at))
    }

    /// Sync log, newest first.
    pub fn history(&self) -> Result<Vec<HistoryEntry>, IndicatorError> {
        Ok(Store::read_json(&self.store.history_path())?.unwrap_or_default())
    }

    /// Loads `current/`, or the named vintage.
    pub fn load(&self, vintage: Option<&str>) -> Result<MetadataSnapshot, IndicatorError> {
        match vintage {
            None => self.read_snapshot(&self.store.current_dir()),
            Some(name) if self.store.vintage_exists(name) => {
                self.read_snapshot(&self.store.vintage_dir(name))
            }
            Some(name) => Err(IndicatorError::VintageNotFound(name.to_string())),
        }
    }

    /// One catalog from `current/` or the named vintage.
    pub fn load_catalog(
        &self,
        kind: CatalogKind,
        vintage: Option<&str>,
    ) -> Result<CatalogContents, IndicatorError> {
        let snapshot = self.load(vintage)?;
        Ok(match kind {
            CatalogKind::Dataflows => CatalogContents::Dataflows(snapshot.dataflows),
            CatalogKind::Indicators => CatalogContents::Indicators(snapshot.indicators),
            CatalogKind::Codelists => CatalogContents::Codelists(snapshot.codelists),
        })
    }

    pub fn list_vintages(&self) -> Result<Vec<String>, IndicatorError> {
        self.store.list_vintages()
    }

    /// Ids added and removed per catalog going from `from` to `to`
    /// (`current` when omitted).
    pub fn compare_vintages(
        &self,
        from: &str,
        to: Option<&str>,
    ) -> Result<VintageComparison, IndicatorError> {
        let before = self.load(Some(from))?;
        let after = self.load(to)?;
        let diff = |kind| CatalogDiff::between(&before.ids(kind), &after.ids(kind));
        Ok(VintageComparison {
            from: from.to_string(),
            to: to.unwrap_or("current").to_string(),
            dataflows: diff(CatalogKind::Dataflows),
            indicators: diff(CatalogKind::Indicators),
            codelists: diff(CatalogKind::Codelists),
        })
    }

    /// Checks a raw SDMX table against the current catalogs.
    pub fn validate(
        &self,
        table: &Table,
        indicator: &IndicatorCode,
        strict: bool,
    ) -> Result<ValidationReport, IndicatorError> {
        let snapshot = self.load(None)?;
        Ok(validate_table(table, indicator, &snapshot, strict))
    }

    fn read_snapshot(&self, dir: &Utf8Path) -> Result<MetadataSnapshot, IndicatorError> {
        let summary: Option<SyncSummary> = Store::read_json(&dir.join(SYNC_SUMMARY_FILE))?;
        Ok(MetadataSnapshot {
            dataflows: Store::read_json(&Store::catalog_path(dir, CatalogKind::Dataflows))?
                .unwrap_or_default(),
            indicators: Store::read_json(&Store::catalog_path(dir, CatalogKind::Indicators))?
                .unwrap_or_default(),
            codelists: Store::read_json(&Store::catalog_path(dir, CatalogKind::Codelists))?
                .unwrap_or_default(),
            synced_at: summary.map(|summary| summary.synced_at),
        })
    }
}

fn sync_error(catalog: String, err: FetchError) -> SyncError {
    SyncError {
        catalog,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_reports_added_and_removed() {
        let before = ["A", "B"].iter().map(|id| id.to_string()).collect();
        let after = ["B", "C"].iter().map(|id| id.to_string()).collect();
        let diff = CatalogDiff::between(&before, &after);
        assert_eq!(diff.added, ["C"]);
        assert_eq!(diff.removed, ["A"]);
        assert!(!diff.is_empty());
    }

    #[test]
    fn empty_codelist_yields_no_country_names() {
        let mut snapshot = MetadataSnapshot::default();
        snapshot.codelists.insert(
            REF_AREA_CODELIST.to_string(),
            Codelist {
                id: REF_AREA_CODELIST.to_string(),
                agency: "UNICEF".to_string(),
                version: "latest".to_string(),
                codes: BTreeMap::new(),
            },
        );
        assert!(snapshot.country_names().is_none());
    }
}
