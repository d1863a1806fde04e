use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::app::{IndicatorRequest, RetrievalRequest};
use crate::domain::{CountryCode, DataflowId};
use crate::error::IndicatorError;
use crate::fetcher::{DEFAULT_MAX_RETRIES, DEFAULT_SEX_FILTER};
use crate::pipeline::TransformOptions;

pub const DEFAULT_CONFIG_FILE: &str = "unicef-ind.json";

/// Request manifest as written on disk.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub indicators: Vec<IndicatorEntry>,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub start_year: Option<i32>,
    #[serde(default)]
    pub end_year: Option<i32>,
    /// `ALL` keeps every sex disaggregation; absent means `_T`.
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub max_retries: Option<usize>,
    #[serde(default)]
    pub options: TransformOptions,
    #[serde(default)]
    pub metadata: MetadataSettings,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum IndicatorEntry {
    Shorthand(String),
    Detailed(IndicatorEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct IndicatorEntryObject {
    pub code: String,
    #[serde(default)]
    pub dataflow: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MetadataSettings {
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub max_age_days: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub request: RetrievalRequest,
    pub options: TransformOptions,
    pub metadata: MetadataSettings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, IndicatorError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(IndicatorError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| IndicatorError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| IndicatorError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, IndicatorError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let indicators = config
            .indicators
            .into_iter()
            .map(|entry| match entry {
                IndicatorEntry::Shorthand(value) => Ok(IndicatorRequest {
                    code: value.parse()?,
                    dataflow: None,
                }),
                IndicatorEntry::Detailed(obj) => Ok(IndicatorRequest {
                    code: obj.code.parse()?,
                    dataflow: obj
                        .dataflow
                        .map(|value| value.parse::<DataflowId>())
                        .transpose()?,
                }),
            })
            .collect::<Result<Vec<_>, IndicatorError>>()?;

        let countries = config
            .countries
            .iter()
            .map(|value| value.parse::<CountryCode>())
            .collect::<Result<Vec<_>, _>>()?;

        let request = RetrievalRequest {
            indicators,
            countries,
            start_year: config.start_year,
            end_year: config.end_year,
            sex: match config.sex {
                Some(value) => sex_filter(&value),
                None => Some(DEFAULT_SEX_FILTER.to_string()),
            },
            max_retries: config.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        };
        request.validate()?;
        config.options.validate()?;

        Ok(ResolvedConfig {
            schema_version,
            request,
            options: config.options,
            metadata: config.metadata,
        })
    }
}

/// `ALL` (any case) disables sex filtering.
pub fn sex_filter(value: &str) -> Option<String> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("all") {
        None
    } else {
        Some(value.to_uppercase())
    }
}
