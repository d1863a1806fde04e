use std::io::{self, Write};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::app::{ProgressEvent, ProgressSink, Retrieval};
use crate::error::IndicatorError;
use crate::table::Table;

pub struct JsonOutput;

impl JsonOutput {
    /// Prints the table as an array of records, with warnings and sources.
    pub fn print_retrieval(result: &Retrieval) -> io::Result<()> {
        #[derive(Serialize)]
        struct Document<'a> {
            rows: Vec<Value>,
            warnings: Vec<String>,
            sources: &'a [crate::app::SourceReport],
        }
        Self::print_json(&Document {
            rows: table_records(&result.table),
            warnings: result.warnings.iter().map(ToString::to_string).collect(),
            sources: &result.sources,
        })
    }

    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct CsvOutput;

impl CsvOutput {
    pub fn print_table(table: &Table) -> Result<(), IndicatorError> {
        table.write_csv(io::stdout().lock())
    }
}

/// One JSON object per row, keyed by column name.
pub fn table_records(table: &Table) -> Vec<Value> {
    table
        .rows()
        .iter()
        .map(|row| {
            let record = table
                .columns()
                .iter()
                .zip(row)
                .map(|(column, cell)| {
                    (
                        column.clone(),
                        serde_json::to_value(cell).unwrap_or(Value::Null),
                    )
                })
                .collect::<Map<_, _>>();
            Value::Object(record)
        })
        .collect()
}

/// Forwards progress to the log at debug level.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => tracing::debug!("{}", event.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Cell;

    #[test]
    fn records_use_null_for_missing() {
        let mut table = Table::new(["iso3", "value"]);
        table
            .push_row(vec![Cell::text("ALB"), Cell::Missing])
            .unwrap();
        let records = table_records(&table);
        assert_eq!(records[0]["iso3"], "ALB");
        assert!(records[0]["value"].is_null());
    }
}
