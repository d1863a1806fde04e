use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Failure reported by an observation fetcher or catalog source.
#[derive(Debug, Clone, Error, Diagnostic, PartialEq, Eq)]
pub enum FetchError {
    #[error("no data for {indicator} in dataflow {dataflow}: {message}")]
    NotFound {
        indicator: String,
        dataflow: String,
        message: String,
    },

    #[error("SDMX service rejected the request: {0}")]
    BadRequest(String),

    #[error("SDMX authentication failed: {0}")]
    Authentication(String),

    #[error("SDMX access forbidden: {0}")]
    Forbidden(String),

    #[error("SDMX service unavailable: {0}")]
    Unavailable(String),

    #[error("SDMX service returned status {status}: {message}")]
    Server { status: u16, message: String },

    #[error("SDMX request failed: {0}")]
    Transport(String),

    #[error("failed to parse SDMX response: {0}")]
    Parse(String),
}

impl FetchError {
    pub fn from_status(status: u16, message: String, indicator: &str, dataflow: &str) -> Self {
        match status {
            404 => FetchError::NotFound {
                indicator: indicator.to_string(),
                dataflow: dataflow.to_string(),
                message,
            },
            400 => FetchError::BadRequest(message),
            401 => FetchError::Authentication(message),
            403 => FetchError::Forbidden(message),
            503 => FetchError::Unavailable(message),
            status => FetchError::Server { status, message },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum IndicatorError {
    #[error("invalid indicator code: {0}")]
    InvalidIndicatorCode(String),

    #[error("invalid dataflow id: {0}")]
    InvalidDataflowId(String),

    #[error("invalid country code: {0}")]
    InvalidCountryCode(String),

    #[error("invalid output format: {0} (expected long, wide or wide_indicators)")]
    InvalidFormat(String),

    #[error("invalid metadata field: {0}")]
    InvalidMetadataField(String),

    #[error("invalid transform options: {0}")]
    InvalidOptions(String),

    #[error("invalid year range: start {start} is after end {end}")]
    InvalidYearRange { start: i32, end: i32 },

    #[error("at least one indicator code is required")]
    NoIndicators,

    #[error(
        "fetching {indicator} from dataflow {dataflow} failed (tried: {tried})",
        tried = .attempted.join(", ")
    )]
    Fetch {
        indicator: String,
        dataflow: String,
        attempted: Vec<String>,
        #[source]
        source: FetchError,
    },

    #[error("found {count} exact duplicate row(s); enable allow_duplicates to drop them")]
    DuplicateRows { count: usize },

    #[error("row has {found} cells but the table has {expected} columns")]
    RowWidth { expected: usize, found: usize },

    #[error("unknown catalog: {0} (expected dataflows, indicators or codelists)")]
    InvalidCatalog(String),

    #[error("metadata vintage not found: {0}")]
    VintageNotFound(String),

    #[error(
        "metadata sync failed for every catalog: {summary}",
        summary = .failures.join("; ")
    )]
    SyncFailed { failures: Vec<String> },

    #[error("missing config file unicef-ind.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("failed to read CSV table: {0}")]
    Csv(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
