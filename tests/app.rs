use std::collections::HashMap;
use std::sync::Mutex;

use assert_matches::assert_matches;

use unicef_indicators::app::{App, ProgressEvent, ProgressSink, RetrievalRequest};
use unicef_indicators::diagnostics::Warning;
use unicef_indicators::domain::{CountryCode, IndicatorCode, OutputFormat};
use unicef_indicators::error::{FetchError, IndicatorError};
use unicef_indicators::fetcher::{FetchRequest, ObservationFetcher};
use unicef_indicators::pipeline::TransformOptions;
use unicef_indicators::table::{Cell, Table};

/// Serves canned SDMX CSV bodies keyed by (dataflow, indicator).
#[derive(Default)]
struct MockFetcher {
    bodies: HashMap<(String, String), &'static str>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl MockFetcher {
    fn serve(mut self, dataflow: &str, indicator: &str, body: &'static str) -> Self {
        self.bodies
            .insert((dataflow.to_string(), indicator.to_string()), body);
        self
    }
}

impl ObservationFetcher for MockFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<Table, FetchError> {
        self.requests.lock().unwrap().push(request.clone());
        let key = (request.dataflow.to_string(), request.indicator.to_string());
        match self.bodies.get(&key) {
            Some(body) => Table::from_csv_reader(body.as_bytes())
                .map_err(|err| FetchError::Parse(err.to_string())),
            None => Err(FetchError::NotFound {
                indicator: key.1,
                dataflow: key.0,
                message: "NoResultsFound".to_string(),
            }),
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

fn codes(raw: &[&str]) -> Vec<IndicatorCode> {
    raw.iter().map(|code| code.parse().unwrap()).collect()
}

const U5MR: &str = "REF_AREA,INDICATOR,TIME_PERIOD,OBS_VALUE,SEX\n\
                    ALB,CME_MRY0T4,2020,9.4,_T\n\
                    ALB,CME_MRY0T4,2021,9.1,_T\n";

const STUNTING: &str = "REF_AREA,INDICATOR,TIME_PERIOD,OBS_VALUE,SEX\n\
                        ALB,NT_ANT_HAZ_NE2_MOD,2018,11.3,_T\n";

#[test]
fn indicators_are_unioned_into_one_table() {
    let fetcher = MockFetcher::default()
        .serve("CME", "CME_MRY0T4", U5MR)
        .serve("NUTRITION", "NT_ANT_HAZ_NE2_MOD", STUNTING);
    let app = App::new(&fetcher);
    let sink = RecordingSink::default();

    let request = RetrievalRequest::new(codes(&["CME_MRY0T4", "NT_ANT_HAZ_NE2_MOD"]));
    let result = app
        .retrieve(&request, &TransformOptions::default(), &sink)
        .unwrap();

    assert_eq!(result.table.len(), 3);
    assert_eq!(result.table.distinct("indicator").len(), 2);
    assert!(result.warnings.is_empty());
    assert_eq!(result.sources.len(), 2);
    assert_eq!(result.sources[0].dataflow.as_deref(), Some("CME"));

    let messages = sink.messages.lock().unwrap();
    assert!(messages[0].starts_with("phase=Resolve; indicator=CME_MRY0T4"));
    assert_eq!(messages.last().map(String::as_str), Some("phase=Done; rows=3"));
}

#[test]
fn fallback_dataflow_is_reported() {
    let fetcher = MockFetcher::default().serve("GLOBAL_DATAFLOW", "CME_MRY0T4", U5MR);
    let app = App::new(&fetcher);

    let request = RetrievalRequest::new(codes(&["CME_MRY0T4"]));
    let result = app
        .retrieve(&request, &TransformOptions::default(), &RecordingSink::default())
        .unwrap();

    assert_eq!(result.table.len(), 2);
    assert_eq!(
        result.warnings,
        [Warning::FallbackDataflow {
            indicator: "CME_MRY0T4".to_string(),
            primary: "CME".to_string(),
            used: "GLOBAL_DATAFLOW".to_string(),
        }]
    );
    assert_eq!(
        result.sources[0].attempted,
        ["CME", "CME_SUBNAT", "GLOBAL_DATAFLOW"]
    );
}

#[test]
fn no_data_anywhere_is_an_empty_table() {
    let fetcher = MockFetcher::default();
    let app = App::new(&fetcher);

    let request = RetrievalRequest::new(codes(&["CME_MRY0T4"]));
    let result = app
        .retrieve(&request, &TransformOptions::default(), &RecordingSink::default())
        .unwrap();

    assert!(result.table.is_empty());
    assert_eq!(result.sources[0].dataflow, None);
    assert_eq!(result.sources[0].rows, 0);
}

#[test]
fn request_fields_reach_the_fetcher() {
    let fetcher = MockFetcher::default().serve("CME", "CME_MRY0T4", U5MR);
    let app = App::new(&fetcher);

    let mut request = RetrievalRequest::new(codes(&["CME_MRY0T4"]));
    request.countries = vec!["ALB".parse::<CountryCode>().unwrap()];
    request.start_year = Some(2015);
    request.end_year = Some(2022);
    request.sex = None;
    app.retrieve(&request, &TransformOptions::default(), &RecordingSink::default())
        .unwrap();

    let requests = fetcher.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].countries.len(), 1);
    assert_eq!(requests[0].start_year, Some(2015));
    assert_eq!(requests[0].end_year, Some(2022));
    assert_eq!(requests[0].sex, None);
}

#[test]
fn country_names_and_wide_output() {
    let fetcher = MockFetcher::default().serve("CME", "CME_MRY0T4", U5MR);
    let names = HashMap::from([("ALB".to_string(), "Albania".to_string())]);
    let app = App::new(&fetcher).with_country_names(names);

    let request = RetrievalRequest::new(codes(&["CME_MRY0T4"]));
    let options = TransformOptions {
        format: OutputFormat::WideByPeriod,
        ..TransformOptions::default()
    };
    let result = app
        .retrieve(&request, &options, &RecordingSink::default())
        .unwrap();

    assert_eq!(result.table.columns(), ["iso3", "country", "2020", "2021"]);
    assert_eq!(result.table.get(0, "country"), Some(&Cell::text("Albania")));
}

#[test]
fn transport_failure_is_surfaced() {
    struct Offline;

    impl ObservationFetcher for Offline {
        fn fetch(&self, _request: &FetchRequest) -> Result<Table, FetchError> {
            Err(FetchError::Transport("connection refused".to_string()))
        }
    }

    let app = App::new(Offline);
    let request = RetrievalRequest::new(codes(&["CME_MRY0T4"]));
    let err = app
        .retrieve(&request, &TransformOptions::default(), &RecordingSink::default())
        .unwrap_err();
    assert_matches!(err, IndicatorError::Fetch { ref dataflow, .. } if dataflow == "CME");
}
