use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FetchError, IndicatorError};
use crate::lookup;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataflowDescriptor {
    pub id: String,
    pub agency: String,
    pub version: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorDescriptor {
    pub code: String,
    pub name: String,
    pub dataflow: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdg_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Code to label mapping for one SDMX codelist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Codelist {
    pub id: String,
    pub agency: String,
    pub version: String,
    pub codes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    Dataflows,
    Indicators,
    Codelists,
}

impl CatalogKind {
    pub const ALL: [CatalogKind; 3] = [
        CatalogKind::Dataflows,
        CatalogKind::Indicators,
        CatalogKind::Codelists,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            CatalogKind::Dataflows => "dataflows.json",
            CatalogKind::Indicators => "indicators.json",
            CatalogKind::Codelists => "codelists.json",
        }
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogKind::Dataflows => write!(f, "dataflows"),
            CatalogKind::Indicators => write!(f, "indicators"),
            CatalogKind::Codelists => write!(f, "codelists"),
        }
    }
}

impl FromStr for CatalogKind {
    type Err = IndicatorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        CatalogKind::ALL
            .into_iter()
            .find(|kind| kind.to_string() == normalized)
            .ok_or_else(|| IndicatorError::InvalidCatalog(value.to_string()))
    }
}

/// Remote reference-data service consulted by a metadata sync.
pub trait CatalogSource: Send + Sync {
    fn fetch_dataflows(&self) -> Result<Vec<DataflowDescriptor>, FetchError>;
    fn fetch_indicators(&self) -> Result<Vec<IndicatorDescriptor>, FetchError>;
    fn fetch_codelist(&self, id: &str) -> Result<Codelist, FetchError>;
}

impl<T: CatalogSource + ?Sized> CatalogSource for &T {
    fn fetch_dataflows(&self) -> Result<Vec<DataflowDescriptor>, FetchError> {
        (**self).fetch_dataflows()
    }

    fn fetch_indicators(&self) -> Result<Vec<IndicatorDescriptor>, FetchError> {
        (**self).fetch_indicators()
    }

    fn fetch_codelist(&self, id: &str) -> Result<Codelist, FetchError> {
        (**self).fetch_codelist(id)
    }
}

/// Indicator descriptors for every code in the built-in registry.
pub fn registry_indicators() -> Vec<IndicatorDescriptor> {
    lookup::INDICATORS
        .iter()
        .map(|info| IndicatorDescriptor {
            code: info.code.to_string(),
            name: info.name.to_string(),
            dataflow: info.dataflow.to_string(),
            sdg_target: Some(info.sdg_target.to_string()),
            unit: Some(info.unit.to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn catalog_kind_names_round_trip() {
        for kind in CatalogKind::ALL {
            assert_eq!(kind.to_string().parse::<CatalogKind>().unwrap(), kind);
        }
        assert_eq!(" Codelists ".parse::<CatalogKind>().unwrap(), CatalogKind::Codelists);
        assert_matches!(
            "observations".parse::<CatalogKind>(),
            Err(IndicatorError::InvalidCatalog(_))
        );
    }

    #[test]
    fn registry_descriptors_carry_sdg_and_unit() {
        let descriptors = registry_indicators();
        assert_eq!(descriptors.len(), lookup::INDICATORS.len());
        let u5mr = descriptors
            .iter()
            .find(|descriptor| descriptor.code == "CME_MRY0T4")
            .unwrap();
        assert_eq!(u5mr.sdg_target.as_deref(), Some("3.2.1"));
    }
}
