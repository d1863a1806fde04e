use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::IndicatorError;

/// Fractional offset used for December so `floor()` still yields the
/// observation year.
const DECEMBER_OFFSET: f64 = 0.9167;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndicatorCode(String);

impl IndicatorCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Token before the first `_`, or the first two characters when the
    /// code has no separator.
    pub fn prefix(&self) -> &str {
        match self.0.split_once('_') {
            Some((head, _)) => head,
            None => {
                let end = self
                    .0
                    .char_indices()
                    .nth(2)
                    .map(|(idx, _)| idx)
                    .unwrap_or(self.0.len());
                &self.0[..end]
            }
        }
    }
}

impl fmt::Display for IndicatorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IndicatorCode {
    type Err = IndicatorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'));
        if !is_valid {
            return Err(IndicatorError::InvalidIndicatorCode(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataflowId(String);

impl DataflowId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wraps an identifier from the built-in routing tables.
    pub(crate) fn from_static(raw: &'static str) -> Self {
        Self(raw.to_string())
    }
}

impl fmt::Display for DataflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DataflowId {
    type Err = IndicatorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
        if !is_valid {
            return Err(IndicatorError::InvalidDataflowId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// ISO3 country code or SDMX reference-area aggregate (e.g. `UNICEF_EAP`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CountryCode(String);

impl CountryCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CountryCode {
    type Err = IndicatorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let is_valid = normalized.len() >= 2
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
        if !is_valid {
            return Err(IndicatorError::InvalidCountryCode(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Shape of the final result table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// One row per observation.
    #[default]
    Long,
    /// Countries as rows, periods as columns.
    #[value(alias = "wide")]
    #[serde(alias = "wide")]
    WideByPeriod,
    /// Country-period rows, indicators as columns.
    #[value(alias = "wide_indicators", alias = "wide-indicators")]
    #[serde(alias = "wide_indicators")]
    WideByIndicator,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Long => write!(f, "long"),
            OutputFormat::WideByPeriod => write!(f, "wide"),
            OutputFormat::WideByIndicator => write!(f, "wide_indicators"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = IndicatorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "long" => Ok(OutputFormat::Long),
            "wide" | "wide_by_period" => Ok(OutputFormat::WideByPeriod),
            "wide_indicators" | "wide_by_indicator" => Ok(OutputFormat::WideByIndicator),
            _ => Err(IndicatorError::InvalidFormat(value.to_string())),
        }
    }
}

/// Column the enrichment stage can add.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    Region,
    #[value(alias = "income_group")]
    IncomeGroup,
    Continent,
    #[value(alias = "indicator_name")]
    IndicatorName,
    #[value(alias = "indicator_category")]
    IndicatorCategory,
}

impl MetadataField {
    pub const ALL: [MetadataField; 5] = [
        MetadataField::Region,
        MetadataField::IncomeGroup,
        MetadataField::Continent,
        MetadataField::IndicatorName,
        MetadataField::IndicatorCategory,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            MetadataField::Region => "region",
            MetadataField::IncomeGroup => "income_group",
            MetadataField::Continent => "continent",
            MetadataField::IndicatorName => "indicator_name",
            MetadataField::IndicatorCategory => "indicator_category",
        }
    }
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.column())
    }
}

impl FromStr for MetadataField {
    type Err = IndicatorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase().replace('-', "_");
        MetadataField::ALL
            .into_iter()
            .find(|field| field.column() == normalized)
            .ok_or_else(|| IndicatorError::InvalidMetadataField(value.to_string()))
    }
}

/// Parses an SDMX `TIME_PERIOD` into a numeric year.
///
/// Annual periods map to whole years. Year-month periods (`2020-06`, also
/// `2020-06-15`) map to `year + month / 12`, with December pinned below the
/// following year. Anything else yields `None`.
pub fn parse_period(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let Some((year, rest)) = trimmed.split_once('-') else {
        return trimmed.parse::<f64>().ok().filter(|value| value.is_finite());
    };
    let year = year.parse::<i32>().ok()?;
    let month = rest.split('-').next()?.parse::<u32>().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    Some(f64::from(year) + month_offset(month))
}

fn month_offset(month: u32) -> f64 {
    (f64::from(month) / 12.0).min(DECEMBER_OFFSET)
}

/// Renders a numeric period as a column label (`2020`, `2020.5`).
pub fn format_period(period: f64) -> String {
    if period.fract() == 0.0 {
        format!("{period:.0}")
    } else {
        format!("{period}")
    }
}
