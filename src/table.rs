use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::io::{Read, Write};

use serde::{Serialize, Serializer};

use crate::error::IndicatorError;

/// Canonical column names produced by column normalization.
pub mod columns {
    pub const ISO3: &str = "iso3";
    pub const COUNTRY: &str = "country";
    pub const INDICATOR: &str = "indicator";
    pub const PERIOD: &str = "period";
    pub const VALUE: &str = "value";
    pub const UNIT: &str = "unit";
    pub const SEX: &str = "sex";
    pub const AGE: &str = "age";
    pub const WEALTH_QUINTILE: &str = "wealth_quintile";
    pub const RESIDENCE: &str = "residence";
    pub const MATERNAL_EDU_LVL: &str = "maternal_edu_lvl";
    pub const LOWER_BOUND: &str = "lower_bound";
    pub const UPPER_BOUND: &str = "upper_bound";
    pub const OBS_STATUS: &str = "obs_status";
    pub const DATA_SOURCE: &str = "data_source";
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Missing,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn from_option(value: Option<f64>) -> Self {
        value.map(Cell::Number).unwrap_or(Cell::Missing)
    }

    pub fn from_text_option(value: Option<&str>) -> Self {
        value.map(Cell::text).unwrap_or(Cell::Missing)
    }

    /// `NaN` counts as missing, matching how numeric coercion reports failures.
    pub fn is_missing(&self) -> bool {
        match self {
            Cell::Missing => true,
            Cell::Number(value) => value.is_nan(),
            Cell::Text(_) => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(value) if !value.is_nan() => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn render(&self) -> String {
        match self {
            Cell::Missing => String::new(),
            Cell::Number(value) if value.is_nan() => String::new(),
            Cell::Number(value) => value.to_string(),
            Cell::Text(value) => value.clone(),
        }
    }

    pub fn key(&self) -> CellKey {
        match self {
            Cell::Missing => CellKey::Missing,
            Cell::Number(value) if value.is_nan() => CellKey::Missing,
            Cell::Number(value) => CellKey::Number(value.to_bits()),
            Cell::Text(value) => CellKey::Text(value.clone()),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Number(value) if !value.is_nan() => serializer.serialize_f64(*value),
            Cell::Text(value) => serializer.serialize_str(value),
            _ => serializer.serialize_none(),
        }
    }
}

/// Hashable, totally ordered view of a cell used for grouping and
/// duplicate detection. Numbers sort before text, missing sorts last.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CellKey {
    Number(u64),
    Text(String),
    Missing,
}

impl CellKey {
    fn rank(&self) -> u8 {
        match self {
            CellKey::Number(_) => 0,
            CellKey::Text(_) => 1,
            CellKey::Missing => 2,
        }
    }

    pub fn to_cell(&self) -> Cell {
        match self {
            CellKey::Number(bits) => Cell::Number(f64::from_bits(*bits)),
            CellKey::Text(value) => Cell::Text(value.clone()),
            CellKey::Missing => Cell::Missing,
        }
    }
}

impl Ord for CellKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (CellKey::Number(a), CellKey::Number(b)) => f64::from_bits(*a).total_cmp(&f64::from_bits(*b)),
            (CellKey::Text(a), CellKey::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for CellKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Column-ordered result table. Every row has exactly one cell per column.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), IndicatorError> {
        if row.len() != self.columns.len() {
            return Err(IndicatorError::RowWidth {
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|cells| &cells[idx])
    }

    pub fn column_values<'a>(&'a self, column: &str) -> impl Iterator<Item = &'a Cell> + use<'a> {
        let idx = self.column_index(column);
        self.rows
            .iter()
            .filter_map(move |row| idx.map(|idx| &row[idx]))
    }

    /// Distinct non-missing values of a column in sorted order.
    pub fn distinct(&self, column: &str) -> BTreeSet<CellKey> {
        self.column_values(column)
            .filter(|cell| !cell.is_missing())
            .map(Cell::key)
            .collect()
    }

    /// Renames `from` to `to` unless `to` already exists. Returns whether a
    /// rename happened.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        if self.has_column(to) {
            return false;
        }
        match self.column_index(from) {
            Some(idx) => {
                self.columns[idx] = to.to_string();
                true
            }
            None => false,
        }
    }

    /// Adds or replaces a column; `values` must have one entry per row.
    pub fn set_column(&mut self, name: &str, values: Vec<Cell>) -> Result<(), IndicatorError> {
        if values.len() != self.rows.len() {
            return Err(IndicatorError::RowWidth {
                expected: self.rows.len(),
                found: values.len(),
            });
        }
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    pub fn map_column<F>(&mut self, name: &str, mut f: F)
    where
        F: FnMut(&Cell) -> Cell,
    {
        if let Some(idx) = self.column_index(name) {
            for row in &mut self.rows {
                row[idx] = f(&row[idx]);
            }
        }
    }

    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[Cell]) -> bool,
    {
        self.rows.retain(|row| keep(row));
    }

    /// Keeps the rows at `indices`, in the given order.
    pub fn take_rows(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&idx| self.rows[idx].clone()).collect(),
        }
    }

    /// Projects onto the named columns that exist, in the given order.
    pub fn select(&self, names: &[&str]) -> Table {
        let indices = names
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect::<Vec<_>>();
        Table {
            columns: indices.iter().map(|&idx| self.columns[idx].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&idx| row[idx].clone()).collect())
                .collect(),
        }
    }

    /// Row-concatenates tables, taking the union of their columns in
    /// first-seen order and filling absent cells with `Missing`.
    pub fn concat(tables: Vec<Table>) -> Table {
        let mut columns: Vec<String> = Vec::new();
        for table in &tables {
            for column in &table.columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }
        let mut rows = Vec::new();
        for table in tables {
            let mapping = columns
                .iter()
                .map(|column| table.column_index(column))
                .collect::<Vec<_>>();
            for row in table.rows {
                rows.push(
                    mapping
                        .iter()
                        .map(|idx| idx.map(|idx| row[idx].clone()).unwrap_or_default())
                        .collect(),
                );
            }
        }
        Table { columns, rows }
    }

    /// Number of rows identical in every column to an earlier row.
    pub fn duplicate_count(&self) -> usize {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter(|row| !seen.insert(row_key(row)))
            .count()
    }

    /// Drops exact duplicate rows, keeping first occurrences. Returns the
    /// number of rows removed.
    pub fn drop_duplicates(&mut self) -> usize {
        let before = self.rows.len();
        let mut seen = HashSet::new();
        self.rows.retain(|row| seen.insert(row_key(row)));
        before - self.rows.len()
    }

    pub fn from_observations(observations: &[Observation]) -> Table {
        let mut table = Table::new(Observation::COLUMNS);
        table.rows = observations.iter().map(Observation::to_row).collect();
        table
    }

    /// Reads a CSV document with a header row. Every field becomes a text
    /// cell; empty fields become `Missing`.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Table, IndicatorError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);
        let headers = reader
            .headers()
            .map_err(|err| IndicatorError::Csv(err.to_string()))?
            .iter()
            .map(|header| header.trim().trim_start_matches('\u{feff}').to_string())
            .collect::<Vec<_>>();
        let mut table = Table::new(headers);
        for record in reader.records() {
            let record = record.map_err(|err| IndicatorError::Csv(err.to_string()))?;
            let row = record
                .iter()
                .map(|field| {
                    let field = field.trim();
                    if field.is_empty() {
                        Cell::Missing
                    } else {
                        Cell::text(field)
                    }
                })
                .collect();
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), IndicatorError> {
        let mut writer = csv::Writer::from_writer(writer);
        writer
            .write_record(&self.columns)
            .map_err(|err| IndicatorError::Csv(err.to_string()))?;
        for row in &self.rows {
            writer
                .write_record(row.iter().map(Cell::render))
                .map_err(|err| IndicatorError::Csv(err.to_string()))?;
        }
        writer
            .flush()
            .map_err(|err| IndicatorError::Filesystem(err.to_string()))
    }
}

fn row_key(row: &[Cell]) -> Vec<CellKey> {
    row.iter().map(Cell::key).collect()
}

/// One measured value in canonical form.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Observation {
    pub indicator: String,
    pub iso3: String,
    pub period: Option<f64>,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub sex: Option<String>,
    pub age: Option<String>,
    pub wealth_quintile: Option<String>,
    pub residence: Option<String>,
    pub maternal_edu_lvl: Option<String>,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    pub obs_status: Option<String>,
    pub data_source: Option<String>,
}

impl Observation {
    pub const COLUMNS: [&'static str; 14] = [
        columns::ISO3,
        columns::INDICATOR,
        columns::PERIOD,
        columns::VALUE,
        columns::UNIT,
        columns::SEX,
        columns::AGE,
        columns::WEALTH_QUINTILE,
        columns::RESIDENCE,
        columns::MATERNAL_EDU_LVL,
        columns::LOWER_BOUND,
        columns::UPPER_BOUND,
        columns::OBS_STATUS,
        columns::DATA_SOURCE,
    ];

    pub fn new(indicator: &str, iso3: &str, period: f64, value: Option<f64>) -> Self {
        Self {
            indicator: indicator.to_string(),
            iso3: iso3.to_string(),
            period: Some(period),
            value,
            ..Self::default()
        }
    }

    fn to_row(&self) -> Vec<Cell> {
        vec![
            Cell::text(self.iso3.as_str()),
            Cell::text(self.indicator.as_str()),
            Cell::from_option(self.period),
            Cell::from_option(self.value),
            Cell::from_text_option(self.unit.as_deref()),
            Cell::from_text_option(self.sex.as_deref()),
            Cell::from_text_option(self.age.as_deref()),
            Cell::from_text_option(self.wealth_quintile.as_deref()),
            Cell::from_text_option(self.residence.as_deref()),
            Cell::from_text_option(self.maternal_edu_lvl.as_deref()),
            Cell::from_option(self.lower_bound),
            Cell::from_option(self.upper_bound),
            Cell::from_text_option(self.obs_status.as_deref()),
            Cell::from_text_option(self.data_source.as_deref()),
        ]
    }
}
