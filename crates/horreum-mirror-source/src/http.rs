use horreum_mirror_types::{
    DatasetPage, DatasetSummary, LabelValue, LabelValueMap, collect_label_values,
};
use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::{DatasetSource, SourceError, SourceResult};

pub const DEFAULT_BASE_URL: &str = "https://horreum.corp.redhat.com";

const API_KEY_HEADER: &str = "x-horreum-api-key";

/// Whether server certificates are checked on outbound requests.
///
/// `Skip` widens the trust boundary to anything that answers on the base URL.
/// It exists for internal deployments with self-signed certificates and must
/// be requested explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TlsVerification {
    #[default]
    Verify,
    Skip,
}

#[derive(Clone)]
pub struct HorreumConfig {
    pub base_url: String,
    pub api_token: String,
    pub tls: TlsVerification,
}

impl HorreumConfig {
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: api_token.into(),
            tls: TlsVerification::Verify,
        }
    }
}

impl std::fmt::Debug for HorreumConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HorreumConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &"<redacted>")
            .field("tls", &self.tls)
            .finish()
    }
}

/// Blocking client for the Horreum dataset endpoints.
pub struct HorreumClient {
    base_url: String,
    client: Client,
}

impl std::fmt::Debug for HorreumClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HorreumClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HorreumClient {
    pub fn new(config: &HorreumConfig) -> SourceResult<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(SourceError::Config("base url is empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut api_key = HeaderValue::from_str(&config.api_token)
            .map_err(|err| SourceError::Config(format!("api token is not a valid header: {}", err)))?;
        api_key.set_sensitive(true);
        headers.insert(HeaderName::from_static(API_KEY_HEADER), api_key);

        let mut builder = Client::builder().default_headers(headers);
        if config.tls == TlsVerification::Skip {
            warn!(base_url = %base_url, "TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder
            .build()
            .map_err(|err| SourceError::Config(err.to_string()))?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> SourceResult<T> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(|source| SourceError::Transport {
                url: url.to_string(),
                source,
            })?;
        decode_response(url, response)
    }
}

impl DatasetSource for HorreumClient {
    fn fetch_page(&self, test_id: i32, page: u32, limit: u32) -> SourceResult<Vec<DatasetSummary>> {
        let url = format!("{}/api/dataset/list/{}", self.base_url, test_id);
        let query = [
            ("page", page.to_string()),
            ("limit", limit.to_string()),
            ("sort", "start".to_string()),
            ("direction", "Descending".to_string()),
        ];
        let listing: DatasetPage = self.get_json(&url, &query)?;
        Ok(listing.datasets)
    }

    fn fetch_label_values(&self, dataset_id: i32) -> SourceResult<LabelValueMap> {
        let url = format!("{}/api/dataset/{}/labelValues", self.base_url, dataset_id);
        let values: Vec<LabelValue> = self.get_json(&url, &[])?;
        let labels = collect_label_values(values);
        debug!(dataset_id, labels = labels.len(), "Loaded label values");
        Ok(labels)
    }
}

fn decode_response<T: DeserializeOwned>(url: &str, response: Response) -> SourceResult<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    let body = response.text().map_err(|source| SourceError::Transport {
        url: url.to_string(),
        source,
    })?;
    serde_json::from_str(&body).map_err(|err| SourceError::Decode {
        url: url.to_string(),
        message: err.to_string(),
    })
}
