use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::diagnostics::Warning;
use crate::domain::{CountryCode, DataflowId, IndicatorCode};
use crate::error::IndicatorError;
use crate::fetcher::{DEFAULT_MAX_RETRIES, DEFAULT_SEX_FILTER, FetchRequest, ObservationFetcher};
use crate::orchestrator::FallbackOrchestrator;
use crate::pipeline::{self, EnrichmentContext, TransformOptions};
use crate::resolver::DataflowResolver;
use crate::table::Table;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorRequest {
    pub code: IndicatorCode,
    /// Tried before any resolved dataflow.
    pub dataflow: Option<DataflowId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalRequest {
    pub indicators: Vec<IndicatorRequest>,
    pub countries: Vec<CountryCode>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub sex: Option<String>,
    pub max_retries: usize,
}

impl RetrievalRequest {
    pub fn new<I>(codes: I) -> Self
    where
        I: IntoIterator<Item = IndicatorCode>,
    {
        Self {
            indicators: codes
                .into_iter()
                .map(|code| IndicatorRequest {
                    code,
                    dataflow: None,
                })
                .collect(),
            countries: Vec::new(),
            start_year: None,
            end_year: None,
            sex: Some(DEFAULT_SEX_FILTER.to_string()),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Uses `dataflow` as the first candidate for every indicator.
    pub fn with_dataflow(mut self, dataflow: DataflowId) -> Self {
        for indicator in &mut self.indicators {
            indicator.dataflow = Some(dataflow.clone());
        }
        self
    }

    pub fn validate(&self) -> Result<(), IndicatorError> {
        if self.indicators.is_empty() {
            return Err(IndicatorError::NoIndicators);
        }
        if let (Some(start), Some(end)) = (self.start_year, self.end_year) {
            if start > end {
                return Err(IndicatorError::InvalidYearRange { start, end });
            }
        }
        Ok(())
    }
}

/// Where one indicator's rows came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub indicator: String,
    pub dataflow: Option<String>,
    pub attempted: Vec<String>,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Retrieval {
    pub table: Table,
    pub warnings: Vec<Warning>,
    pub sources: Vec<SourceReport>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<F: ObservationFetcher> {
    orchestrator: FallbackOrchestrator<F>,
    resolver: DataflowResolver,
    context: EnrichmentContext,
}

impl<F: ObservationFetcher> App<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            orchestrator: FallbackOrchestrator::new(fetcher),
            resolver: DataflowResolver::new(),
            context: EnrichmentContext::default(),
        }
    }

    /// Country display names used when `TransformOptions::country_names`
    /// is set.
    pub fn with_country_names(mut self, names: HashMap<String, String>) -> Self {
        self.context.country_names = Some(names);
        self
    }

    /// Fetches every requested indicator through its candidate dataflows,
    /// unions the results and runs the pipeline once. No data anywhere is an
    /// empty table, not an error.
    pub fn retrieve(
        &self,
        request: &RetrievalRequest,
        options: &TransformOptions,
        sink: &dyn ProgressSink,
    ) -> Result<Retrieval, IndicatorError> {
        request.validate()?;
        options.validate()?;
        let started = Instant::now();

        let mut tables = Vec::new();
        let mut warnings = Vec::new();
        let mut sources = Vec::new();

        for indicator in &request.indicators {
            let candidates = self
                .resolver
                .resolve(&indicator.code, indicator.dataflow.as_ref());
            sink.event(ProgressEvent {
                message: format!(
                    "phase=Resolve; indicator={}; candidates={}",
                    indicator.code,
                    join_ids(&candidates)
                ),
                elapsed: Some(started.elapsed()),
            });

            let template = FetchRequest {
                indicator: indicator.code.clone(),
                dataflow: candidates[0].clone(),
                countries: request.countries.clone(),
                start_year: request.start_year,
                end_year: request.end_year,
                sex: request.sex.clone(),
                max_retries: request.max_retries,
            };
            sink.event(ProgressEvent {
                message: format!("phase=Fetch; indicator={}", indicator.code),
                elapsed: Some(started.elapsed()),
            });
            let outcome = self.orchestrator.fetch_with_fallback(&template, &candidates)?;

            if outcome.used_fallback() {
                if let Some(used) = &outcome.dataflow {
                    warnings.push(
                        Warning::FallbackDataflow {
                            indicator: indicator.code.to_string(),
                            primary: candidates[0].to_string(),
                            used: used.to_string(),
                        }
                        .emit(),
                    );
                }
            }
            sources.push(SourceReport {
                indicator: indicator.code.to_string(),
                dataflow: outcome.dataflow.as_ref().map(ToString::to_string),
                attempted: outcome.attempted.iter().map(ToString::to_string).collect(),
                rows: outcome.table.len(),
            });
            if !outcome.table.is_empty() {
                tables.push(outcome.table);
            }
        }

        if tables.is_empty() {
            sink.event(ProgressEvent {
                message: "phase=Done; rows=0".to_string(),
                elapsed: Some(started.elapsed()),
            });
            return Ok(Retrieval {
                table: Table::default(),
                warnings,
                sources,
            });
        }

        let raw = Table::concat(tables);
        sink.event(ProgressEvent {
            message: format!("phase=Transform; rows={}", raw.len()),
            elapsed: Some(started.elapsed()),
        });
        let transformed = pipeline::transform(raw, options, &self.context)?;
        warnings.extend(transformed.warnings);

        sink.event(ProgressEvent {
            message: format!("phase=Done; rows={}", transformed.table.len()),
            elapsed: Some(started.elapsed()),
        });
        Ok(Retrieval {
            table: transformed.table,
            warnings,
            sources,
        })
    }
}

fn join_ids(ids: &[DataflowId]) -> String {
    ids.iter()
        .map(DataflowId::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn empty_indicator_list_is_rejected() {
        let request = RetrievalRequest::new(Vec::new());
        assert_matches!(request.validate(), Err(IndicatorError::NoIndicators));
    }

    #[test]
    fn inverted_year_range_is_rejected() {
        let mut request = RetrievalRequest::new(["CME_MRY0T4".parse().unwrap()]);
        request.start_year = Some(2020);
        request.end_year = Some(2010);
        assert_matches!(
            request.validate(),
            Err(IndicatorError::InvalidYearRange { start: 2020, end: 2010 })
        );
    }
}
