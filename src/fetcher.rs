use crate::domain::{CountryCode, DataflowId, IndicatorCode};
use crate::error::FetchError;
use crate::table::Table;

pub const DEFAULT_MAX_RETRIES: usize = 3;
pub const DEFAULT_SEX_FILTER: &str = "_T";

/// One request against a single dataflow.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub indicator: IndicatorCode,
    pub dataflow: DataflowId,
    pub countries: Vec<CountryCode>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    /// `None` keeps every sex disaggregation.
    pub sex: Option<String>,
    pub max_retries: usize,
}

impl FetchRequest {
    pub fn new(indicator: IndicatorCode, dataflow: DataflowId) -> Self {
        Self {
            indicator,
            dataflow,
            countries: Vec::new(),
            start_year: None,
            end_year: None,
            sex: Some(DEFAULT_SEX_FILTER.to_string()),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Retrieves raw observations for one indicator from one dataflow.
///
/// Implementations own transient retries. An indicator the dataflow does
/// not carry is reported as [`FetchError::NotFound`]; an empty table is an
/// equally valid answer for "nothing here".
pub trait ObservationFetcher: Send + Sync {
    fn fetch(&self, request: &FetchRequest) -> Result<Table, FetchError>;
}

impl<T: ObservationFetcher + ?Sized> ObservationFetcher for &T {
    fn fetch(&self, request: &FetchRequest) -> Result<Table, FetchError> {
        (**self).fetch(request)
    }
}
