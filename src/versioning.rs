use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::{IndicatorCode, parse_period};
use crate::error::IndicatorError;
use crate::table::{Cell, Table, columns};

const HASH_PREFIX_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

/// Provenance record for one retrieved dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataVersion {
    pub version_id: String,
    pub created_at: DateTime<Utc>,
    pub indicator_code: String,
    pub data_hash: String,
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_countries: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_range: Option<(i64, i64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_range: Option<Range>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

pub fn create_data_version(
    table: &Table,
    indicator: &IndicatorCode,
    version_id: Option<String>,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<DataVersion, IndicatorError> {
    let area = first_column(table, &["REF_AREA", columns::ISO3]);
    let period = first_column(table, &["TIME_PERIOD", columns::PERIOD]);
    let value = first_column(table, &["OBS_VALUE", columns::VALUE]);

    Ok(DataVersion {
        version_id: version_id.unwrap_or_else(|| now.format("v%Y%m%d_%H%M%S").to_string()),
        created_at: now,
        indicator_code: indicator.to_string(),
        data_hash: content_hash(table)?,
        row_count: table.len(),
        column_count: table.columns().len(),
        columns: table.columns().to_vec(),
        unique_countries: area.map(|column| table.distinct(column).len()),
        year_range: period
            .and_then(|column| numeric_range(table, column, parse_period))
            .map(|range| (range.min.floor() as i64, range.max.floor() as i64)),
        value_range: value.and_then(|column| numeric_range(table, column, parse_number)),
        notes,
    })
}

/// First 16 hex chars of the SHA-256 of the table rendered as CSV with rows
/// sorted, so row order does not change the hash.
pub fn content_hash(table: &Table) -> Result<String, IndicatorError> {
    let mut rows = table
        .rows()
        .iter()
        .map(|row| row.to_vec())
        .collect::<Vec<_>>();
    rows.sort_by(|a, b| {
        let a = a.iter().map(Cell::key);
        let b = b.iter().map(Cell::key);
        a.cmp(b)
    });

    let mut sorted = Table::new(table.columns().iter().cloned());
    for row in rows {
        sorted.push_row(row)?;
    }
    let mut rendered = Vec::new();
    sorted.write_csv(&mut rendered)?;

    let digest = Sha256::digest(&rendered);
    let mut hash = hex::encode(digest);
    hash.truncate(HASH_PREFIX_LEN);
    Ok(hash)
}

fn first_column<'a>(table: &Table, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .copied()
        .find(|name| table.has_column(name))
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Min and max over a column; text cells go through `parse`.
fn numeric_range(table: &Table, column: &str, parse: fn(&str) -> Option<f64>) -> Option<Range> {
    table
        .column_values(column)
        .filter_map(|cell| match cell {
            Cell::Text(raw) => parse(raw),
            other => other.as_f64(),
        })
        .fold(None, |range: Option<Range>, value| {
            Some(match range {
                None => Range { min: value, max: value },
                Some(range) => Range {
                    min: range.min.min(value),
                    max: range.max.max(value),
                },
            })
        })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn table(csv: &str) -> Table {
        Table::from_csv_reader(csv.as_bytes()).unwrap()
    }

    #[test]
    fn hash_ignores_row_order() {
        let a = table("REF_AREA,TIME_PERIOD,OBS_VALUE\nALB,2020,9.4\nUSA,2019,6.5\n");
        let b = table("REF_AREA,TIME_PERIOD,OBS_VALUE\nUSA,2019,6.5\nALB,2020,9.4\n");
        let hash = content_hash(&a).unwrap();
        assert_eq!(hash.len(), 16);
        assert_eq!(hash, content_hash(&b).unwrap());

        let c = table("REF_AREA,TIME_PERIOD,OBS_VALUE\nUSA,2019,6.6\nALB,2020,9.4\n");
        assert_ne!(hash, content_hash(&c).unwrap());
    }

    #[test]
    fn version_summarizes_table() {
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        let data = table("REF_AREA,TIME_PERIOD,OBS_VALUE\nALB,2018,9.4\nALB,2020-06,8.1\nUSA,2019,6.5\n");
        let code = "CME_MRY0T4".parse().unwrap();
        let version = create_data_version(&data, &code, None, Some("baseline".to_string()), now).unwrap();

        assert_eq!(version.version_id, "v20250304_050607");
        assert_eq!(version.row_count, 3);
        assert_eq!(version.unique_countries, Some(2));
        assert_eq!(version.year_range, Some((2018, 2020)));
        assert_eq!(version.value_range, Some(Range { min: 6.5, max: 9.4 }));
        assert_eq!(version.notes.as_deref(), Some("baseline"));
    }
}
