use crate::domain::{DataflowId, IndicatorCode};
use crate::lookup::{self, GLOBAL_DATAFLOW};

/// Maps indicator codes to the ordered dataflows that may carry them.
///
/// Resolution is a pure lookup over the static tables in [`crate::lookup`];
/// every candidate list ends with [`GLOBAL_DATAFLOW`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DataflowResolver;

impl DataflowResolver {
    pub fn new() -> Self {
        Self
    }

    /// Best single guess for `indicator`.
    pub fn primary(&self, indicator: &IndicatorCode) -> DataflowId {
        let dataflow = lookup::dataflow_for_indicator(indicator.as_str())
            .or_else(|| lookup::dataflow_for_prefix(indicator.prefix()))
            .unwrap_or(GLOBAL_DATAFLOW);
        dataflow_id(dataflow)
    }

    /// Candidates in try order: explicit override, primary guess, prefix
    /// alternatives, then the global dataflow. Never empty, never repeats.
    pub fn resolve(
        &self,
        indicator: &IndicatorCode,
        explicit: Option<&DataflowId>,
    ) -> Vec<DataflowId> {
        let mut candidates: Vec<DataflowId> = Vec::new();
        let mut push = |candidate: DataflowId| {
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        };

        if let Some(explicit) = explicit {
            push(explicit.clone());
        }
        push(self.primary(indicator));
        for alternative in lookup::alternative_dataflows(indicator.prefix()) {
            push(dataflow_id(*alternative));
        }
        push(dataflow_id(GLOBAL_DATAFLOW));
        candidates
    }
}

fn dataflow_id(raw: &'static str) -> DataflowId {
    DataflowId::from_static(raw)
}
