use std::fmt;

use serde::Serialize;

/// Non-fatal condition surfaced alongside a result table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    DuplicatesRemoved {
        count: usize,
    },
    /// Columns a stage needed were absent, so the stage was skipped.
    MissingColumns {
        stage: String,
        columns: Vec<String>,
    },
    WideWithMultipleIndicators {
        indicators: Vec<String>,
    },
    WideIndicatorsSingleIndicator,
    FallbackDataflow {
        indicator: String,
        primary: String,
        used: String,
    },
}

impl Warning {
    /// Mirrors the warning into the log.
    pub fn emit(self) -> Self {
        tracing::warn!("{self}");
        self
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::DuplicatesRemoved { count } => {
                write!(f, "removed {count} exact duplicate row(s)")
            }
            Warning::MissingColumns { stage, columns } => {
                write!(f, "{stage} skipped; missing column(s): {}", columns.join(", "))
            }
            Warning::WideWithMultipleIndicators { indicators } => write!(
                f,
                "wide format with {} indicators ({}); rows are keyed by indicator",
                indicators.len(),
                indicators.join(", ")
            ),
            Warning::WideIndicatorsSingleIndicator => {
                write!(f, "wide_indicators needs more than one indicator; returning long format")
            }
            Warning::FallbackDataflow {
                indicator,
                primary,
                used,
            } => write!(f, "{indicator} not found in {primary}; used dataflow {used}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_serialize_with_kind_tag() {
        let warning = Warning::DuplicatesRemoved { count: 2 };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "duplicates_removed");
        assert_eq!(json["count"], 2);
    }

    #[test]
    fn fallback_message_names_both_dataflows() {
        let warning = Warning::FallbackDataflow {
            indicator: "ED_CR_L1".to_string(),
            primary: "EDUCATION_UIS_SDG".to_string(),
            used: "GLOBAL_DATAFLOW".to_string(),
        };
        let text = warning.to_string();
        assert!(text.contains("EDUCATION_UIS_SDG"));
        assert!(text.contains("GLOBAL_DATAFLOW"));
    }
}
