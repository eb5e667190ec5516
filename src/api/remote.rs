//! Purpose: Provide the HTTP client for the Airtable list-records endpoint.
//! Exports: `RowSource`, `AirtableClient`.
//! Role: The only module that talks to the network; everything else sees `RawRow`s.
//! Invariants: One GET per `fetch_rows` call; first page only, no pagination loop.
//! Invariants: Upstream bodies and status go into `Error` for logs, never to clients.
//! Invariants: The bearer token is attached per request and never logged.
#![allow(clippy::result_large_err)]

use super::config::AirtableConfig;
use crate::core::error::{Error, ErrorKind};
use crate::core::formula::FilterFormula;
use crate::core::record::RawRow;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use url::Url;

type ApiResult<T> = Result<T, Error>;

const MAX_ERROR_BODY_CHARS: usize = 512;

/// Anything that can return the first page of rows matching a filter.
pub trait RowSource: Send + Sync {
    fn fetch_rows(&self, filter: &FilterFormula) -> ApiResult<Vec<RawRow>>;
}

#[derive(Clone)]
pub struct AirtableClient {
    inner: Arc<AirtableClientInner>,
}

struct AirtableClientInner {
    table_url: Url,
    api_key: String,
    page_size: u32,
    agent: ureq::Agent,
}

#[derive(Deserialize)]
struct ListRecordsEnvelope {
    records: Vec<UpstreamRecord>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Deserialize)]
struct UpstreamRecord {
    #[serde(default)]
    id: Option<String>,
    fields: RawRow,
}

impl AirtableClient {
    pub fn new(config: &AirtableConfig) -> ApiResult<Self> {
        config.validate()?;
        let base_url = normalize_base_url(&config.api_url)?;
        let table_url = build_url(&base_url, &["v0", &config.base_id, &config.table])?;
        let agent = ureq::AgentBuilder::new().build();
        Ok(Self {
            inner: Arc::new(AirtableClientInner {
                table_url,
                api_key: config.api_key.clone(),
                page_size: config.page_size,
                agent,
            }),
        })
    }

    pub fn table_url(&self) -> &Url {
        &self.inner.table_url
    }

    fn list_url(&self, filter: &FilterFormula) -> Url {
        let mut url = self.inner.table_url.clone();
        url.query_pairs_mut()
            .append_pair("filterByFormula", filter.as_str())
            .append_pair("pageSize", &self.inner.page_size.to_string());
        url
    }

    fn request_json<R>(&self, url: &Url) -> ApiResult<R>
    where
        R: DeserializeOwned,
    {
        let response = self
            .inner
            .agent
            .get(url.as_str())
            .set("Accept", "application/json")
            .set("Authorization", &format!("Bearer {}", self.inner.api_key))
            .call();

        match response {
            Ok(resp) => read_json_response(resp),
            Err(ureq::Error::Status(code, resp)) => Err(parse_error_response(code, resp)),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Upstream)
                .with_message("airtable request failed")
                .with_source(err)),
        }
    }
}

impl RowSource for AirtableClient {
    fn fetch_rows(&self, filter: &FilterFormula) -> ApiResult<Vec<RawRow>> {
        let url = self.list_url(filter);
        tracing::debug!(formula = %filter, table = %self.inner.table_url, "querying airtable");
        let envelope: ListRecordsEnvelope = self.request_json(&url)?;
        if envelope.offset.is_some() {
            tracing::debug!(
                returned = envelope.records.len(),
                "more pages available upstream; only the first page is used"
            );
        }
        Ok(envelope
            .records
            .into_iter()
            .map(|record| {
                tracing::trace!(id = record.id.as_deref().unwrap_or(""), "upstream record");
                record.fields
            })
            .collect())
    }
}

fn normalize_base_url(raw: &str) -> ApiResult<Url> {
    let mut url = Url::parse(raw).map_err(|err| {
        Error::new(ErrorKind::Config)
            .with_message("invalid Airtable API url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Config)
            .with_message("Airtable API url must use http or https scheme"));
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(
            Error::new(ErrorKind::Config).with_message("Airtable API url must not include a path")
        );
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn build_url(base_url: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base_url.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            Error::new(ErrorKind::Config).with_message("Airtable API url cannot be a base")
        })?;
        path.clear();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

fn read_json_response<R>(response: ureq::Response) -> ApiResult<R>
where
    R: DeserializeOwned,
{
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Upstream)
            .with_message("failed to read airtable response body")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Upstream)
            .with_message("airtable response has unexpected shape")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    let body = truncate_chars(body.trim(), MAX_ERROR_BODY_CHARS);
    let message = if body.is_empty() {
        format!("airtable returned status {status}")
    } else {
        format!("airtable returned status {status}: {body}")
    };
    Error::new(ErrorKind::Upstream)
        .with_message(message)
        .with_status(status)
}

fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &value[..idx]),
        None => value.to_string(),
    }
}
