use crate::domain::DataflowId;
use crate::error::IndicatorError;
use crate::fetcher::{FetchRequest, ObservationFetcher};
use crate::table::Table;

/// Result of walking the candidate dataflows for one indicator.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackOutcome {
    pub table: Table,
    /// Dataflow that produced `table`; `None` when every candidate came up empty.
    pub dataflow: Option<DataflowId>,
    pub attempted: Vec<DataflowId>,
}

impl FallbackOutcome {
    pub fn used_fallback(&self) -> bool {
        match (&self.dataflow, self.attempted.first()) {
            (Some(used), Some(first)) => used != first,
            _ => false,
        }
    }
}

pub struct FallbackOrchestrator<F: ObservationFetcher> {
    fetcher: F,
}

impl<F: ObservationFetcher> FallbackOrchestrator<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Tries `candidates` in order using `template` for every other request
    /// field. The first non-empty table wins. Not-found answers and empty
    /// tables advance to the next candidate; any other failure stops the walk.
    pub fn fetch_with_fallback(
        &self,
        template: &FetchRequest,
        candidates: &[DataflowId],
    ) -> Result<FallbackOutcome, IndicatorError> {
        let mut attempted = Vec::with_capacity(candidates.len());
        for dataflow in candidates {
            attempted.push(dataflow.clone());
            let request = FetchRequest {
                dataflow: dataflow.clone(),
                ..template.clone()
            };
            tracing::debug!(
                indicator = %request.indicator,
                dataflow = %dataflow,
                "fetching candidate dataflow"
            );
            match self.fetcher.fetch(&request) {
                Ok(table) if !table.is_empty() => {
                    if attempted.len() > 1 {
                        tracing::info!(
                            indicator = %request.indicator,
                            dataflow = %dataflow,
                            "found data in fallback dataflow"
                        );
                    }
                    return Ok(FallbackOutcome {
                        table,
                        dataflow: Some(dataflow.clone()),
                        attempted,
                    });
                }
                Ok(_) => {
                    tracing::debug!(dataflow = %dataflow, "candidate returned no rows");
                }
                Err(err) if err.is_not_found() => {
                    tracing::debug!(dataflow = %dataflow, "indicator not in candidate dataflow");
                }
                Err(source) => {
                    return Err(IndicatorError::Fetch {
                        indicator: template.indicator.to_string(),
                        dataflow: dataflow.to_string(),
                        attempted: attempted.iter().map(ToString::to_string).collect(),
                        source,
                    });
                }
            }
        }

        tracing::info!(
            indicator = %template.indicator,
            tried = attempted.len(),
            "no data in any candidate dataflow"
        );
        Ok(FallbackOutcome {
            table: Table::default(),
            dataflow: None,
            attempted,
        })
    }
}
