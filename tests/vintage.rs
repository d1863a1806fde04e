use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use chrono::{DateTime, Duration, TimeZone, Utc};

use unicef_indicators::catalog::{
    CatalogKind, CatalogSource, Codelist, DataflowDescriptor, IndicatorDescriptor,
};
use unicef_indicators::error::{FetchError, IndicatorError};
use unicef_indicators::store::Store;
use unicef_indicators::vintage::{
    CacheState, CatalogContents, Clock, REF_AREA_CODELIST, VintageStore,
};

#[derive(Clone)]
struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

impl ManualClock {
    fn at(year: i32, month: u32, day: u32, hour: u32) -> Self {
        Self(Arc::new(Mutex::new(
            Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap(),
        )))
    }

    fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

#[derive(Default)]
struct MockCatalog {
    dataflows: Mutex<Vec<&'static str>>,
    indicators: Mutex<Vec<&'static str>>,
    fail_dataflows: Mutex<bool>,
    offline: Mutex<bool>,
    calls: Mutex<usize>,
}

impl MockCatalog {
    fn with_dataflows(ids: &[&'static str]) -> Self {
        Self {
            dataflows: Mutex::new(ids.to_vec()),
            indicators: Mutex::new(vec!["CME_MRY0T4"]),
            ..Self::default()
        }
    }

    fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    fn check_online(&self) -> Result<(), FetchError> {
        if *self.offline.lock().unwrap() {
            return Err(FetchError::Transport("connection refused".to_string()));
        }
        Ok(())
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl CatalogSource for MockCatalog {
    fn fetch_dataflows(&self) -> Result<Vec<DataflowDescriptor>, FetchError> {
        *self.calls.lock().unwrap() += 1;
        self.check_online()?;
        if *self.fail_dataflows.lock().unwrap() {
            return Err(FetchError::Unavailable("maintenance".to_string()));
        }
        Ok(self
            .dataflows
            .lock()
            .unwrap()
            .iter()
            .map(|id| DataflowDescriptor {
                id: id.to_string(),
                agency: "UNICEF".to_string(),
                version: "1.0".to_string(),
                name: format!("{id} dataflow"),
                description: None,
            })
            .collect())
    }

    fn fetch_indicators(&self) -> Result<Vec<IndicatorDescriptor>, FetchError> {
        self.check_online()?;
        Ok(self
            .indicators
            .lock()
            .unwrap()
            .iter()
            .map(|code| IndicatorDescriptor {
                code: code.to_string(),
                name: format!("{code} indicator"),
                dataflow: code.split('_').next().unwrap_or_default().to_string(),
                sdg_target: None,
                unit: None,
            })
            .collect())
    }

    fn fetch_codelist(&self, id: &str) -> Result<Codelist, FetchError> {
        self.check_online()?;
        if id != REF_AREA_CODELIST {
            return Err(FetchError::NotFound {
                indicator: String::new(),
                dataflow: id.to_string(),
                message: "unknown codelist".to_string(),
            });
        }
        Ok(Codelist {
            id: id.to_string(),
            agency: "UNICEF".to_string(),
            version: "1.0".to_string(),
            codes: BTreeMap::from([
                ("ALB".to_string(), "Albania".to_string()),
                ("USA".to_string(), "United States".to_string()),
            ]),
        })
    }
}

fn temp_store() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().join("metadata")).unwrap();
    (dir, Store::new_with_root(root))
}

#[test]
fn same_day_syncs_share_one_vintage() {
    let (_dir, store) = temp_store();
    let catalog = MockCatalog::with_dataflows(&["CME", "NUTRITION"]);
    let clock = ManualClock::at(2026, 3, 14, 8);
    let vintages = VintageStore::with_clock(store, &catalog, clock.clone())
        .with_codelists([REF_AREA_CODELIST]);

    let first = vintages.sync_all().unwrap();
    clock.advance(Duration::hours(6));
    let second = vintages.sync_all().unwrap();

    assert!(first.vintage_created);
    assert!(!second.vintage_created);
    assert_eq!(first.vintage, "2026-03-14");
    assert_eq!(vintages.list_vintages().unwrap(), ["2026-03-14"]);
    assert_eq!(vintages.history().unwrap().len(), 2);
}

#[test]
fn comparison_reports_added_dataflow() {
    let (_dir, store) = temp_store();
    let catalog = MockCatalog::with_dataflows(&["CME", "NUTRITION"]);
    let clock = ManualClock::at(2026, 3, 14, 8);
    let vintages = VintageStore::with_clock(store, &catalog, clock.clone())
        .with_codelists([REF_AREA_CODELIST]);

    vintages.sync_all().unwrap();
    catalog.dataflows.lock().unwrap().push("X");
    clock.advance(Duration::days(1));
    vintages.sync_all().unwrap();

    let comparison = vintages
        .compare_vintages("2026-03-14", Some("2026-03-15"))
        .unwrap();
    assert_eq!(comparison.dataflows.added, ["X"]);
    assert!(comparison.dataflows.removed.is_empty());
    assert!(comparison.indicators.is_empty());

    let against_current = vintages.compare_vintages("2026-03-14", None).unwrap();
    assert_eq!(against_current.to, "current");
    assert_eq!(against_current.dataflows.added, ["X"]);
}

#[test]
fn ensure_synced_skips_fresh_cache() {
    let (_dir, store) = temp_store();
    let catalog = MockCatalog::with_dataflows(&["CME"]);
    let clock = ManualClock::at(2026, 3, 14, 8);
    let vintages = VintageStore::with_clock(store, &catalog, clock.clone())
        .with_codelists([REF_AREA_CODELIST]);

    assert_eq!(vintages.state(None).unwrap(), CacheState::Uninitialized);
    assert!(vintages.ensure_synced(None).unwrap());
    assert_eq!(catalog.calls(), 1);

    clock.advance(Duration::days(2));
    assert!(!vintages.ensure_synced(Some(Duration::days(7))).unwrap());
    assert_eq!(catalog.calls(), 1);

    clock.advance(Duration::days(10));
    assert_matches!(
        vintages.state(Some(Duration::days(7))).unwrap(),
        CacheState::Stale { .. }
    );
    assert!(vintages.ensure_synced(Some(Duration::days(7))).unwrap());
    assert_eq!(catalog.calls(), 2);
}

#[test]
fn failed_catalog_keeps_previous_contents() {
    let (_dir, store) = temp_store();
    let catalog = MockCatalog::with_dataflows(&["CME", "NUTRITION"]);
    let clock = ManualClock::at(2026, 3, 14, 8);
    let vintages = VintageStore::with_clock(store, &catalog, clock.clone())
        .with_codelists([REF_AREA_CODELIST, "CL_MISSING"]);

    let first = vintages.sync_all().unwrap();
    assert_eq!(first.errors.len(), 1);
    assert_eq!(first.errors[0].catalog, "codelist:CL_MISSING");

    *catalog.fail_dataflows.lock().unwrap() = true;
    clock.advance(Duration::hours(1));
    let second = vintages.sync_all().unwrap();

    assert!(!second.is_complete());
    assert!(second.errors.iter().any(|error| error.catalog == "dataflows"));
    assert_eq!(second.dataflows, 2);

    let snapshot = vintages.load(None).unwrap();
    assert_eq!(snapshot.dataflows.len(), 2);
    let names = snapshot.country_names().unwrap();
    assert_eq!(names.get("ALB").map(String::as_str), Some("Albania"));
}

#[test]
fn unknown_vintage_is_an_error() {
    let (_dir, store) = temp_store();
    let catalog = MockCatalog::default();
    let vintages = VintageStore::new(store, &catalog);
    assert_matches!(
        vintages.load(Some("1999-01-01")),
        Err(IndicatorError::VintageNotFound(name)) if name == "1999-01-01"
    );
}

#[test]
fn validation_uses_cached_catalogs() {
    let (_dir, store) = temp_store();
    let catalog = MockCatalog::with_dataflows(&["CME"]);
    let vintages = VintageStore::with_clock(store, &catalog, ManualClock::at(2026, 3, 14, 8))
        .with_codelists([REF_AREA_CODELIST]);
    vintages.sync_all().unwrap();

    let table = unicef_indicators::table::Table::from_csv_reader(
        "REF_AREA,TIME_PERIOD,OBS_VALUE\nALB,2020,8\nZZZ,2020,9\n".as_bytes(),
    )
    .unwrap();
    let indicator = "CME_MRY0T4".parse().unwrap();

    let lenient = vintages.validate(&table, &indicator, false).unwrap();
    assert!(lenient.valid);
    assert_eq!(lenient.issues.len(), 1);

    let strict = vintages.validate(&table, &indicator, true).unwrap();
    assert!(!strict.valid);
}

#[test]
fn sync_with_every_catalog_down_records_nothing() {
    let (_dir, store) = temp_store();
    let catalog = MockCatalog::with_dataflows(&["CME", "NUTRITION"]);
    catalog.set_offline(true);
    let clock = ManualClock::at(2026, 3, 14, 8);
    let vintages = VintageStore::with_clock(store, &catalog, clock.clone())
        .with_codelists([REF_AREA_CODELIST]);

    let err = vintages.sync_all().unwrap_err();
    assert_matches!(
        err,
        IndicatorError::SyncFailed { ref failures } if failures.len() == 3
    );
    assert_eq!(vintages.state(None).unwrap(), CacheState::Uninitialized);
    assert!(vintages.list_vintages().unwrap().is_empty());
    assert!(vintages.history().unwrap().is_empty());
    assert_matches!(vintages.ensure_synced(None), Err(IndicatorError::SyncFailed { .. }));

    catalog.set_offline(false);
    clock.advance(Duration::hours(1));
    let recovered = vintages.sync_all().unwrap();
    assert!(recovered.vintage_created);
    assert!(recovered.is_complete());
    assert_eq!(recovered.dataflows, 2);
    assert_eq!(vintages.list_vintages().unwrap(), ["2026-03-14"]);
    assert_eq!(vintages.history().unwrap().len(), 1);
}

#[test]
fn outage_after_a_good_sync_keeps_the_cache_fresh_and_unchanged() {
    let (_dir, store) = temp_store();
    let catalog = MockCatalog::with_dataflows(&["CME"]);
    let clock = ManualClock::at(2026, 3, 14, 8);
    let vintages = VintageStore::with_clock(store, &catalog, clock.clone())
        .with_codelists([REF_AREA_CODELIST]);
    vintages.sync_all().unwrap();

    catalog.set_offline(true);
    clock.advance(Duration::days(1));
    assert_matches!(vintages.sync_all(), Err(IndicatorError::SyncFailed { .. }));

    assert_eq!(vintages.list_vintages().unwrap(), ["2026-03-14"]);
    assert_eq!(vintages.history().unwrap().len(), 1);
    assert_eq!(vintages.load(None).unwrap().dataflows.len(), 1);
}

#[test]
fn comparison_reports_added_and_removed_indicators() {
    let (_dir, store) = temp_store();
    let catalog = MockCatalog::with_dataflows(&["CME", "NUTRITION"]);
    let clock = ManualClock::at(2026, 3, 14, 8);
    let vintages = VintageStore::with_clock(store, &catalog, clock.clone())
        .with_codelists([REF_AREA_CODELIST]);

    vintages.sync_all().unwrap();
    catalog.indicators.lock().unwrap().push("NT_ANT_WHZ_NE2");
    clock.advance(Duration::days(1));
    vintages.sync_all().unwrap();

    let grown = vintages
        .compare_vintages("2026-03-14", Some("2026-03-15"))
        .unwrap();
    assert_eq!(grown.indicators.added, ["NT_ANT_WHZ_NE2"]);
    assert!(grown.indicators.removed.is_empty());
    assert!(grown.dataflows.is_empty());

    catalog.indicators.lock().unwrap().retain(|code| *code != "CME_MRY0T4");
    clock.advance(Duration::days(1));
    vintages.sync_all().unwrap();

    let shrunk = vintages
        .compare_vintages("2026-03-15", Some("2026-03-16"))
        .unwrap();
    assert!(shrunk.indicators.added.is_empty());
    assert_eq!(shrunk.indicators.removed, ["CME_MRY0T4"]);

    let overall = vintages.compare_vintages("2026-03-14", None).unwrap();
    assert_eq!(overall.indicators.added, ["NT_ANT_WHZ_NE2"]);
    assert_eq!(overall.indicators.removed, ["CME_MRY0T4"]);
}

#[test]
fn single_catalog_loads_from_current_or_a_vintage() {
    let (_dir, store) = temp_store();
    let catalog = MockCatalog::with_dataflows(&["CME", "NUTRITION"]);
    let clock = ManualClock::at(2026, 3, 14, 8);
    let vintages = VintageStore::with_clock(store, &catalog, clock.clone())
        .with_codelists([REF_AREA_CODELIST]);

    vintages.sync_all().unwrap();
    catalog.dataflows.lock().unwrap().push("PT");
    clock.advance(Duration::days(1));
    vintages.sync_all().unwrap();

    let current = vintages.load_catalog(CatalogKind::Dataflows, None).unwrap();
    assert_eq!(current.len(), 3);
    let earlier = vintages
        .load_catalog(CatalogKind::Dataflows, Some("2026-03-14"))
        .unwrap();
    assert_matches!(earlier, CatalogContents::Dataflows(ref flows) if !flows.contains_key("PT"));
    assert_eq!(earlier.len(), 2);

    let codelists = vintages
        .load_catalog("codelists".parse().unwrap(), None)
        .unwrap();
    assert_matches!(
        codelists,
        CatalogContents::Codelists(ref lists) if lists.contains_key(REF_AREA_CODELIST)
    );

    assert_matches!(
        vintages.load_catalog(CatalogKind::Indicators, Some("2020-01-01")),
        Err(IndicatorError::VintageNotFound(_))
    );
}
