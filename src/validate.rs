use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::domain::IndicatorCode;
use crate::table::{Cell, Table, columns};
use crate::vintage::{MetadataSnapshot, REF_AREA_CODELIST};

/// Share of missing `OBS_VALUE` cells above which a table is flagged.
pub const HIGH_MISSINGNESS: f64 = 0.5;

const UNKNOWN_COUNTRY_SAMPLE: usize = 5;

/// Raw column and the canonical name accepted in its place.
const REQUIRED_COLUMNS: [(&str, &str); 3] = [
    ("REF_AREA", columns::ISO3),
    ("TIME_PERIOD", columns::PERIOD),
    ("OBS_VALUE", columns::VALUE),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    IndicatorNotInCatalog { indicator: String },
    MissingColumn { column: String },
    UnknownCountries { count: usize, sample: Vec<String> },
    EmptyTable,
    HighMissingness { fraction: f64 },
}

impl ValidationIssue {
    /// Outside strict mode only absent columns fail validation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ValidationIssue::MissingColumn { .. })
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::IndicatorNotInCatalog { indicator } => {
                write!(f, "indicator {indicator} not found in catalog")
            }
            ValidationIssue::MissingColumn { column } => {
                write!(f, "missing required column: {column}")
            }
            ValidationIssue::UnknownCountries { count, sample } => write!(
                f,
                "{count} unrecognized country code(s): {}",
                sample.join(", ")
            ),
            ValidationIssue::EmptyTable => write!(f, "table is empty"),
            ValidationIssue::HighMissingness { fraction } => {
                write!(f, "high missing rate in OBS_VALUE: {:.1}%", fraction * 100.0)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub indicator: String,
    pub valid: bool,
    pub strict: bool,
    pub rows: usize,
    pub issues: Vec<ValidationIssue>,
}

pub fn validate_table(
    table: &Table,
    indicator: &IndicatorCode,
    snapshot: &MetadataSnapshot,
    strict: bool,
) -> ValidationReport {
    let mut issues = Vec::new();

    if !snapshot.indicators.contains_key(indicator.as_str()) {
        issues.push(ValidationIssue::IndicatorNotInCatalog {
            indicator: indicator.to_string(),
        });
    }

    let [area, _, value] = REQUIRED_COLUMNS.map(|(raw, canonical)| {
        let found = [raw, canonical]
            .into_iter()
            .find(|name| table.has_column(name));
        if found.is_none() {
            issues.push(ValidationIssue::MissingColumn {
                column: raw.to_string(),
            });
        }
        found
    });

    if let (Some(area), Some(codelist)) = (area, snapshot.codelist(REF_AREA_CODELIST)) {
        let unknown = table
            .column_values(area)
            .filter_map(Cell::as_str)
            .filter(|code| !codelist.codes.contains_key(*code))
            .map(str::to_string)
            .collect::<BTreeSet<_>>();
        if !unknown.is_empty() {
            issues.push(ValidationIssue::UnknownCountries {
                count: unknown.len(),
                sample: unknown.into_iter().take(UNKNOWN_COUNTRY_SAMPLE).collect(),
            });
        }
    }

    if table.is_empty() {
        issues.push(ValidationIssue::EmptyTable);
    } else if let Some(value) = value {
        let missing = table.column_values(value).filter(|cell| !is_numeric(cell)).count();
        let fraction = missing as f64 / table.len() as f64;
        if fraction > HIGH_MISSINGNESS {
            issues.push(ValidationIssue::HighMissingness { fraction });
        }
    }

    let valid = if strict {
        issues.is_empty()
    } else {
        !issues.iter().any(ValidationIssue::is_fatal)
    };

    ValidationReport {
        indicator: indicator.to_string(),
        valid,
        strict,
        rows: table.len(),
        issues,
    }
}

fn is_numeric(cell: &Cell) -> bool {
    match cell {
        Cell::Number(value) => !value.is_nan(),
        Cell::Text(raw) => raw.trim().parse::<f64>().is_ok_and(|value| !value.is_nan()),
        Cell::Missing => false,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use assert_matches::assert_matches;

    use super::*;
    use crate::catalog::{Codelist, IndicatorDescriptor};

    fn snapshot() -> MetadataSnapshot {
        let mut snapshot = MetadataSnapshot::default();
        snapshot.indicators.insert(
            "CME_MRY0T4".to_string(),
            IndicatorDescriptor {
                code: "CME_MRY0T4".to_string(),
                name: "Under-5 mortality rate".to_string(),
                dataflow: "CME".to_string(),
                sdg_target: None,
                unit: None,
            },
        );
        let codes = [("ALB", "Albania"), ("USA", "United States")]
            .into_iter()
            .map(|(code, name)| (code.to_string(), name.to_string()))
            .collect::<BTreeMap<_, _>>();
        snapshot.codelists.insert(
            REF_AREA_CODELIST.to_string(),
            Codelist {
                id: REF_AREA_CODELIST.to_string(),
                agency: "UNICEF".to_string(),
                version: "latest".to_string(),
                codes,
            },
        );
        snapshot
    }

    fn table(csv: &str) -> Table {
        Table::from_csv_reader(csv.as_bytes()).unwrap()
    }

    #[test]
    fn clean_table_is_valid() {
        let code = "CME_MRY0T4".parse().unwrap();
        let report = validate_table(
            &table("REF_AREA,TIME_PERIOD,OBS_VALUE\nALB,2020,9.4\n"),
            &code,
            &snapshot(),
            true,
        );
        assert!(report.valid);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn unknown_countries_are_reported_not_fatal() {
        let code = "CME_MRY0T4".parse().unwrap();
        let report = validate_table(
            &table("REF_AREA,TIME_PERIOD,OBS_VALUE\nALB,2020,9.4\nXYZ,2020,1\n"),
            &code,
            &snapshot(),
            false,
        );
        assert!(report.valid);
        assert_matches!(
            report.issues.as_slice(),
            [ValidationIssue::UnknownCountries { count: 1, .. }]
        );
    }

    #[test]
    fn missing_column_is_fatal() {
        let code = "CME_MRY0T4".parse().unwrap();
        let report = validate_table(
            &table("REF_AREA,TIME_PERIOD\nALB,2020\n"),
            &code,
            &snapshot(),
            false,
        );
        assert!(!report.valid);
        assert_eq!(
            report.issues,
            [ValidationIssue::MissingColumn {
                column: "OBS_VALUE".to_string()
            }]
        );
    }

    #[test]
    fn strict_mode_fails_on_missingness() {
        let code = "CME_MRY0T4".parse().unwrap();
        let data = table("iso3,period,value\nALB,2019,\nALB,2020,\nALB,2021,3\n");
        let lenient = validate_table(&data, &code, &snapshot(), false);
        let strict = validate_table(&data, &code, &snapshot(), true);
        assert!(lenient.valid);
        assert!(!strict.valid);
        assert_matches!(
            strict.issues.as_slice(),
            [ValidationIssue::HighMissingness { .. }]
        );
    }
}
