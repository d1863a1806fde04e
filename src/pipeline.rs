//! Post-production pipeline applied once to the unioned observation table.
//!
//! Stages run in a fixed order and each one is switched on by a field of
//! [`TransformOptions`]:
//!
//! 1. column normalization
//! 2. exact-duplicate detection
//! 3. metadata enrichment
//! 4. missing-value filtering
//! 5. most-recent-value selection (`mrv`, then `latest`)
//! 6. shape transformation
//! 7. column projection (`simplify`)
//!
//! Only the duplicate check can fail. Every other stage degrades to a
//! warning and leaves the table as it found it.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::diagnostics::Warning;
use crate::domain::{MetadataField, OutputFormat, format_period, parse_period};
use crate::error::IndicatorError;
use crate::lookup;
use crate::table::{Cell, CellKey, Table, columns};

/// Source field names and the canonical column each maps to.
const COLUMN_ALIASES: &[(&str, &str)] = &[
    ("REF_AREA", columns::ISO3),
    ("country_code", columns::ISO3),
    ("INDICATOR", columns::INDICATOR),
    ("indicator_code", columns::INDICATOR),
    ("TIME_PERIOD", columns::PERIOD),
    ("year", columns::PERIOD),
    ("OBS_VALUE", columns::VALUE),
    ("country_name", columns::COUNTRY),
    ("UNIT_MEASURE", columns::UNIT),
    ("SEX", columns::SEX),
    ("AGE", columns::AGE),
    ("WEALTH_QUINTILE", columns::WEALTH_QUINTILE),
    ("RESIDENCE", columns::RESIDENCE),
    ("MATERNAL_EDU_LVL", columns::MATERNAL_EDU_LVL),
    ("LOWER_BOUND", columns::LOWER_BOUND),
    ("UPPER_BOUND", columns::UPPER_BOUND),
    ("OBS_STATUS", columns::OBS_STATUS),
    ("DATA_SOURCE", columns::DATA_SOURCE),
];

const NUMERIC_COLUMNS: [&str; 3] = [columns::VALUE, columns::LOWER_BOUND, columns::UPPER_BOUND];

const GEO_FIELDS: [&str; 3] = ["region", "income_group", "continent"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    pub format: OutputFormat,
    /// Keep only the most recent non-missing value per group.
    pub latest: bool,
    /// Keep the N most recent periods per group.
    pub mrv: Option<usize>,
    pub add_metadata: Vec<MetadataField>,
    pub dropna: bool,
    /// Long format only: project onto the essential columns.
    pub simplify: bool,
    pub allow_duplicates: bool,
    pub normalize_columns: bool,
    /// Add a `country` column from the reference-area codelist when one
    /// is available.
    pub country_names: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Long,
            latest: false,
            mrv: None,
            add_metadata: Vec::new(),
            dropna: false,
            simplify: false,
            allow_duplicates: false,
            normalize_columns: true,
            country_names: true,
        }
    }
}

impl TransformOptions {
    pub fn validate(&self) -> Result<(), IndicatorError> {
        if self.mrv == Some(0) {
            return Err(IndicatorError::InvalidOptions(
                "mrv must be at least 1".to_string(),
            ));
        }
        let unique = self.add_metadata.iter().collect::<BTreeSet<_>>();
        if unique.len() != self.add_metadata.len() {
            return Err(IndicatorError::InvalidOptions(
                "add_metadata lists a field more than once".to_string(),
            ));
        }
        Ok(())
    }
}

/// Lookups the enrichment stage needs beyond the static tables.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentContext {
    /// Reference-area code to display name.
    pub country_names: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub table: Table,
    pub warnings: Vec<Warning>,
}

pub fn transform(
    raw: Table,
    options: &TransformOptions,
    context: &EnrichmentContext,
) -> Result<Transformed, IndicatorError> {
    options.validate()?;
    let mut warnings = Vec::new();
    let mut table = raw;

    if options.normalize_columns {
        normalize_columns(&mut table);
    }

    let duplicates = table.duplicate_count();
    if duplicates > 0 {
        if !options.allow_duplicates {
            return Err(IndicatorError::DuplicateRows { count: duplicates });
        }
        table.drop_duplicates();
        warnings.push(Warning::DuplicatesRemoved { count: duplicates }.emit());
    }

    let added = enrich(&mut table, options, context, &mut warnings)?;

    if options.dropna {
        drop_missing_values(&mut table, "dropna", &mut warnings);
    }

    if let Some(count) = options.mrv {
        table = most_recent(&table, count, "mrv", &mut warnings);
    }

    if options.latest {
        drop_missing_values(&mut table, "latest", &mut warnings);
        if let Some(period) = table.column_index(columns::PERIOD) {
            table.retain_rows(|row| !row[period].is_missing());
        }
        table = most_recent(&table, 1, "latest", &mut warnings);
    }

    table = match options.format {
        OutputFormat::Long => table,
        OutputFormat::WideByPeriod => pivot_periods(table, &mut warnings)?,
        OutputFormat::WideByIndicator => pivot_indicators(table, &mut warnings)?,
    };

    if options.simplify && options.format == OutputFormat::Long {
        let mut keep = vec![
            columns::ISO3,
            columns::COUNTRY,
            columns::INDICATOR,
            columns::PERIOD,
            columns::VALUE,
        ];
        for column in added {
            if !keep.contains(&column) {
                keep.push(column);
            }
        }
        table = table.select(&keep);
    }

    Ok(Transformed { table, warnings })
}

/// Renames source columns to canonical names and coerces the period and
/// numeric columns. Unparsable values become missing.
pub fn normalize_columns(table: &mut Table) {
    for (source, target) in COLUMN_ALIASES {
        table.rename_column(source, target);
    }
    table.map_column(columns::PERIOD, |cell| match cell {
        Cell::Text(raw) => Cell::from_option(parse_period(raw)),
        other => other.clone(),
    });
    for column in NUMERIC_COLUMNS {
        table.map_column(column, coerce_number);
    }
}

fn coerce_number(cell: &Cell) -> Cell {
    match cell {
        Cell::Text(raw) => Cell::from_option(raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())),
        other => other.clone(),
    }
}

/// Adds the requested metadata columns. Returns the names of the columns
/// it added.
fn enrich(
    table: &mut Table,
    options: &TransformOptions,
    context: &EnrichmentContext,
    warnings: &mut Vec<Warning>,
) -> Result<Vec<&'static str>, IndicatorError> {
    let mut added = Vec::new();

    if options.country_names && !table.has_column(columns::COUNTRY) {
        if let Some(names) = &context.country_names {
            if table.has_column(columns::ISO3) {
                let values = table
                    .column_values(columns::ISO3)
                    .map(|cell| {
                        Cell::from_text_option(
                            cell.as_str().and_then(|code| names.get(code)).map(String::as_str),
                        )
                    })
                    .collect();
                table.set_column(columns::COUNTRY, values)?;
                added.push(columns::COUNTRY);
            }
        }
    }

    for field in &options.add_metadata {
        let source = match field {
            MetadataField::Region | MetadataField::IncomeGroup | MetadataField::Continent => {
                columns::ISO3
            }
            MetadataField::IndicatorName | MetadataField::IndicatorCategory => columns::INDICATOR,
        };
        if !table.has_column(source) {
            warnings.push(
                Warning::MissingColumns {
                    stage: format!("metadata {field}"),
                    columns: vec![source.to_string()],
                }
                .emit(),
            );
            continue;
        }
        let lookup_fn: fn(&str) -> Option<&'static str> = match field {
            MetadataField::Region => lookup::region,
            MetadataField::IncomeGroup => lookup::income_group,
            MetadataField::Continent => lookup::continent,
            MetadataField::IndicatorName => |code| lookup::indicator_info(code).map(|info| info.name),
            MetadataField::IndicatorCategory => {
                |code| lookup::indicator_info(code).map(|info| info.category())
            }
        };
        let values = table
            .column_values(source)
            .map(|cell| Cell::from_text_option(cell.as_str().and_then(lookup_fn)))
            .collect();
        table.set_column(field.column(), values)?;
        added.push(field.column());
    }

    Ok(added)
}

fn drop_missing_values(table: &mut Table, stage: &str, warnings: &mut Vec<Warning>) {
    match table.column_index(columns::VALUE) {
        Some(value) => table.retain_rows(|row| !row[value].is_missing()),
        None => warnings.push(
            Warning::MissingColumns {
                stage: stage.to_string(),
                columns: vec![columns::VALUE.to_string()],
            }
            .emit(),
        ),
    }
}

/// Grouping used by recency selection: country, plus indicator when the
/// column exists.
fn group_columns(table: &Table) -> Vec<usize> {
    [columns::ISO3, columns::INDICATOR]
        .iter()
        .filter_map(|name| table.column_index(name))
        .collect()
}

/// Keeps the `count` most recent rows per group. Output is ordered by group
/// ascending, then period descending; missing periods sort last.
fn most_recent(table: &Table, count: usize, stage: &str, warnings: &mut Vec<Warning>) -> Table {
    let missing = missing_columns(table, &[columns::ISO3, columns::PERIOD]);
    if !missing.is_empty() {
        warnings.push(
            Warning::MissingColumns {
                stage: stage.to_string(),
                columns: missing,
            }
            .emit(),
        );
        return table.clone();
    }
    let Some(period) = table.column_index(columns::PERIOD) else {
        return table.clone();
    };
    let groups = group_columns(table);
    let rows = table.rows();
    let group_key = |idx: usize| groups.iter().map(|&col| rows[idx][col].key()).collect::<Vec<_>>();

    let mut order = (0..rows.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| {
        group_key(a)
            .cmp(&group_key(b))
            .then_with(|| period_desc(&rows[a][period], &rows[b][period]))
    });

    let mut kept = Vec::new();
    let mut current: Option<(Vec<CellKey>, usize)> = None;
    for idx in order {
        let key = group_key(idx);
        match &mut current {
            Some((seen, taken)) if *seen == key => {
                if *taken < count {
                    kept.push(idx);
                    *taken += 1;
                }
            }
            _ => {
                kept.push(idx);
                current = Some((key, 1));
            }
        }
    }
    table.take_rows(&kept)
}

fn period_desc(a: &Cell, b: &Cell) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn missing_columns(table: &Table, required: &[&str]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !table.has_column(name))
        .map(|name| name.to_string())
        .collect()
}

fn distinct_indicators(table: &Table) -> Vec<String> {
    table
        .distinct(columns::INDICATOR)
        .into_iter()
        .map(|key| key.to_cell().render())
        .collect()
}

/// Countries as rows and periods as columns.
fn pivot_periods(table: Table, warnings: &mut Vec<Warning>) -> Result<Table, IndicatorError> {
    let missing = missing_columns(&table, &[columns::ISO3, columns::PERIOD, columns::VALUE]);
    if !missing.is_empty() {
        warnings.push(
            Warning::MissingColumns {
                stage: "wide".to_string(),
                columns: missing,
            }
            .emit(),
        );
        return Ok(table);
    }

    let indicators = distinct_indicators(&table);
    let mut index = vec![columns::ISO3, columns::COUNTRY];
    index.extend(GEO_FIELDS);
    if indicators.len() > 1 {
        warnings.push(Warning::WideWithMultipleIndicators { indicators }.emit());
        index.push(columns::INDICATOR);
    }

    pivot(&table, &index, columns::PERIOD, |key| match key {
        CellKey::Number(bits) => format_period(f64::from_bits(*bits)),
        other => other.to_cell().render(),
    })
}

/// Country-period rows and indicators as columns.
fn pivot_indicators(table: Table, warnings: &mut Vec<Warning>) -> Result<Table, IndicatorError> {
    let missing = missing_columns(
        &table,
        &[columns::ISO3, columns::PERIOD, columns::VALUE, columns::INDICATOR],
    );
    if !missing.is_empty() {
        warnings.push(
            Warning::MissingColumns {
                stage: "wide_indicators".to_string(),
                columns: missing,
            }
            .emit(),
        );
        return Ok(table);
    }
    if distinct_indicators(&table).len() <= 1 {
        warnings.push(Warning::WideIndicatorsSingleIndicator.emit());
        return Ok(table);
    }

    let mut index = vec![columns::ISO3, columns::COUNTRY, columns::PERIOD];
    index.extend(GEO_FIELDS);
    pivot(&table, &index, columns::INDICATOR, |key| key.to_cell().render())
}

/// Spreads `value` across one column per distinct value of `spread`.
/// Index columns absent from the table are skipped. The first non-missing
/// value wins a cell; rows and spread columns left entirely missing are
/// dropped.
fn pivot<L>(table: &Table, index: &[&str], spread: &str, label: L) -> Result<Table, IndicatorError>
where
    L: Fn(&CellKey) -> String,
{
    let index_cols = index
        .iter()
        .filter_map(|name| table.column_index(name).map(|idx| (*name, idx)))
        .collect::<Vec<_>>();
    let (Some(spread_col), Some(value_col)) =
        (table.column_index(spread), table.column_index(columns::VALUE))
    else {
        return Ok(table.clone());
    };

    let spread_keys = table.distinct(spread).into_iter().collect::<Vec<_>>();
    let positions = spread_keys
        .iter()
        .enumerate()
        .map(|(pos, key)| (key.clone(), pos))
        .collect::<HashMap<_, _>>();

    let mut cells: BTreeMap<Vec<CellKey>, Vec<Cell>> = BTreeMap::new();
    for row in table.rows() {
        let Some(&pos) = positions.get(&row[spread_col].key()) else {
            continue;
        };
        let key = index_cols
            .iter()
            .map(|(_, idx)| row[*idx].key())
            .collect::<Vec<_>>();
        let slots = cells
            .entry(key)
            .or_insert_with(|| vec![Cell::Missing; spread_keys.len()]);
        if slots[pos].is_missing() && !row[value_col].is_missing() {
            slots[pos] = row[value_col].clone();
        }
    }

    // Spread values that never carry a value get no column.
    let kept = (0..spread_keys.len())
        .filter(|&pos| cells.values().any(|slots| !slots[pos].is_missing()))
        .collect::<Vec<_>>();

    let mut headers = index_cols
        .iter()
        .map(|(name, _)| name.to_string())
        .collect::<Vec<_>>();
    headers.extend(kept.iter().map(|&pos| label(&spread_keys[pos])));
    let mut wide = Table::new(headers);
    for (key, values) in cells {
        if values.iter().all(Cell::is_missing) {
            continue;
        }
        let mut row = key.iter().map(CellKey::to_cell).collect::<Vec<_>>();
        row.extend(kept.iter().map(|&pos| values[pos].clone()));
        wide.push_row(row)?;
    }
    Ok(wide)
}
