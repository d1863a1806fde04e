use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::catalog::{CatalogSource, Codelist, DataflowDescriptor, IndicatorDescriptor, registry_indicators};
use crate::error::{FetchError, IndicatorError};
use crate::fetcher::{FetchRequest, ObservationFetcher};
use crate::table::Table;

pub const DEFAULT_BASE_URL: &str = "https://sdmx.data.unicef.org/ws/public/sdmxapi/rest";
pub const DEFAULT_AGENCY: &str = "UNICEF";
pub const BASE_URL_ENV: &str = "UNICEF_SDMX_BASE_URL";

const DATAFLOW_VERSION: &str = "1.0";
const STRUCTURE_JSON: &str = "application/vnd.sdmx.structure+json;version=1.0";
const BASE_DELAY_MS: u64 = 200;
const STRUCTURE_RETRIES: usize = 3;

#[derive(Clone)]
pub struct SdmxHttpClient {
    client: Client,
    base_url: String,
    agency: String,
}

impl SdmxHttpClient {
    /// Client for the public UNICEF endpoint, or `UNICEF_SDMX_BASE_URL`
    /// when set.
    pub fn new() -> Result<Self, IndicatorError> {
        let base_url = std::env::var(BASE_URL_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self::with_base_url(base_url)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, IndicatorError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("unicef-indicators/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| IndicatorError::HttpClient(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|err| IndicatorError::HttpClient(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agency: DEFAULT_AGENCY.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Data query URL without the period bounds, which go in the query
    /// string.
    pub fn data_url(&self, request: &FetchRequest) -> String {
        let countries = request
            .countries
            .iter()
            .map(|code| code.as_str())
            .collect::<Vec<_>>()
            .join("+");
        format!(
            "{}/data/{},{},{}/{}.{}.",
            self.base_url,
            self.agency,
            request.dataflow,
            DATAFLOW_VERSION,
            countries,
            request.indicator
        )
    }

    fn send_with_retries<F>(&self, max_retries: usize, mut make_req: F) -> Result<Response, FetchError>
    where
        F: FnMut() -> RequestBuilder,
    {
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < max_retries && is_retryable_status(status) {
                        tracing::debug!(status, attempt, "retrying SDMX request");
                        backoff(attempt);
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < max_retries && is_retryable_error(&err) {
                        tracing::debug!(error = %err, attempt, "retrying SDMX request");
                        backoff(attempt);
                        attempt += 1;
                        continue;
                    }
                    return Err(FetchError::Transport(err.to_string()));
                }
            }
        }
    }

    fn read_body(response: Response, indicator: &str, dataflow: &str) -> Result<String, FetchError> {
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        if !(200..300).contains(&status) {
            let message = body.lines().next().unwrap_or("SDMX request failed").to_string();
            return Err(FetchError::from_status(status, message, indicator, dataflow));
        }
        Ok(body)
    }

    fn fetch_structure<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self.send_with_retries(STRUCTURE_RETRIES, || {
            self.client
                .get(&url)
                .header(ACCEPT, STRUCTURE_JSON)
                .query(&[("references", "none"), ("detail", "full")])
        })?;
        let body = Self::read_body(response, path, &self.agency)?;
        serde_json::from_str(&body).map_err(|err| FetchError::Parse(err.to_string()))
    }
}

impl ObservationFetcher for SdmxHttpClient {
    fn fetch(&self, request: &FetchRequest) -> Result<Table, FetchError> {
        let url = self.data_url(request);
        let mut query = vec![
            ("format", "csv".to_string()),
            ("labels", "id".to_string()),
        ];
        if let Some(start) = request.start_year {
            query.push(("startPeriod", start.to_string()));
        }
        if let Some(end) = request.end_year {
            query.push(("endPeriod", end.to_string()));
        }

        let response = self.send_with_retries(request.max_retries, || self.client.get(&url).query(&query))?;
        let body = Self::read_body(response, request.indicator.as_str(), request.dataflow.as_str())?;
        if body.trim().is_empty() {
            return Ok(Table::default());
        }
        let mut table =
            Table::from_csv_reader(body.as_bytes()).map_err(|err| FetchError::Parse(err.to_string()))?;
        if let (Some(sex), Some(column)) = (&request.sex, table.column_index("SEX")) {
            table.retain_rows(|row| row[column].as_str() == Some(sex.as_str()));
        }
        tracing::debug!(
            indicator = %request.indicator,
            dataflow = %request.dataflow,
            rows = table.len(),
            "fetched observations"
        );
        Ok(table)
    }
}

impl CatalogSource for SdmxHttpClient {
    fn fetch_dataflows(&self) -> Result<Vec<DataflowDescriptor>, FetchError> {
        let message: StructureMessage = self.fetch_structure(&format!("dataflow/{}", self.agency))?;
        Ok(message
            .data
            .dataflows
            .into_iter()
            .map(|flow| DataflowDescriptor {
                name: flow.label.display(&flow.id),
                description: flow.description,
                id: flow.id,
                agency: flow.agency,
                version: flow.version,
            })
            .collect())
    }

    fn fetch_indicators(&self) -> Result<Vec<IndicatorDescriptor>, FetchError> {
        Ok(registry_indicators())
    }

    fn fetch_codelist(&self, id: &str) -> Result<Codelist, FetchError> {
        let message: StructureMessage =
            self.fetch_structure(&format!("codelist/{}/{}/latest", self.agency, id))?;
        let list = message
            .data
            .codelists
            .into_iter()
            .find(|list| list.id == id)
            .ok_or_else(|| FetchError::Parse(format!("codelist {id} missing from response")))?;
        let codes = list
            .codes
            .into_iter()
            .map(|code| {
                let name = code.label.display(&code.id);
                (code.id, name)
            })
            .collect::<BTreeMap<_, _>>();
        Ok(Codelist {
            id: list.id,
            agency: list.agency,
            version: list.version,
            codes,
        })
    }
}

#[derive(Debug, Deserialize)]
struct StructureMessage {
    data: StructureData,
}

#[derive(Debug, Default, Deserialize)]
struct StructureData {
    #[serde(default)]
    dataflows: Vec<RawDataflow>,
    #[serde(default)]
    codelists: Vec<RawCodelist>,
}

/// SDMX-JSON carries either a plain `name` or a per-language `names` map.
#[derive(Debug, Default, Deserialize)]
struct Label {
    name: Option<String>,
    #[serde(default)]
    names: BTreeMap<String, String>,
}

impl Label {
    fn display(&self, fallback: &str) -> String {
        self.name
            .clone()
            .or_else(|| self.names.get("en").cloned())
            .or_else(|| self.names.values().next().cloned())
            .unwrap_or_else(|| fallback.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct RawDataflow {
    id: String,
    #[serde(rename = "agencyID")]
    agency: String,
    version: String,
    #[serde(flatten)]
    label: Label,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCodelist {
    id: String,
    #[serde(rename = "agencyID")]
    agency: String,
    version: String,
    #[serde(default)]
    codes: Vec<RawCode>,
}

#[derive(Debug, Deserialize)]
struct RawCode {
    id: String,
    #[serde(flatten)]
    label: Label,
}

fn backoff(attempt: usize) {
    let delay = BASE_DELAY_MS * (attempt as u64 + 1);
    thread::sleep(Duration::from_millis(delay));
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_joins_countries() {
        let client = SdmxHttpClient::with_base_url("https://example.org/rest/").unwrap();
        let mut request = FetchRequest::new("CME_MRY0T4".parse().unwrap(), "CME".parse().unwrap());
        request.countries = vec!["ALB".parse().unwrap(), "USA".parse().unwrap()];
        assert_eq!(
            client.data_url(&request),
            "https://example.org/rest/data/UNICEF,CME,1.0/ALB+USA.CME_MRY0T4."
        );
    }

    #[test]
    fn parses_structure_json() {
        let body = r#"{"data":{"dataflows":[
            {"id":"CME","agencyID":"UNICEF","version":"1.0","names":{"en":"Child mortality"}}
        ],"codelists":[
            {"id":"CL_SEX","agencyID":"UNICEF","version":"1.0",
             "codes":[{"id":"F","name":"Female"},{"id":"_T"}]}
        ]}}"#;
        let message: StructureMessage = serde_json::from_str(body).unwrap();
        let flow = &message.data.dataflows[0];
        assert_eq!(flow.label.display(&flow.id), "Child mortality");
        let codes = &message.data.codelists[0].codes;
        assert_eq!(codes[0].label.display(&codes[0].id), "Female");
        assert_eq!(codes[1].label.display(&codes[1].id), "_T");
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(404));
    }
}
