use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::domain::FacetFilters;
use crate::error::ScoutError;
use crate::table::FacetValue;

/// Records fetched per page when streaming search results.
pub const PAGE_SIZE: u64 = 1000;

pub const DEFAULT_ENDPOINT: &str = "https://esgf.nci.org.au/esg-search/search";

/// One ESGF search request.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub project: String,
    pub limit: u64,
    pub offset: u64,
    /// Facet names to return counts for (`facet_counts` in the response).
    pub facets: Option<Vec<String>>,
    /// Document fields to return.
    pub fields: Option<Vec<String>>,
    pub filters: FacetFilters,
}

/// One page of an ESGF search response.
#[derive(Debug, Clone)]
pub struct Page {
    pub num_found: u64,
    pub docs: Vec<serde_json::Map<String, Value>>,
    /// Facet -> flat array alternating value, count.
    pub facet_fields: BTreeMap<String, Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    response: ApiBody,
    #[serde(default)]
    facet_counts: Option<ApiFacetCounts>,
}

#[derive(Debug, Deserialize)]
struct ApiBody {
    #[serde(rename = "numFound")]
    num_found: u64,
    docs: Vec<serde_json::Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct ApiFacetCounts {
    facet_fields: BTreeMap<String, Vec<Value>>,
}

/// A single-query view of the ESGF search API.
///
/// The trait seam keeps the pagination and reconciliation logic testable
/// without a network.
pub trait EsgfApi {
    fn query(&self, query: &Query) -> Result<Page, ScoutError>;
}

#[derive(Clone)]
pub struct EsgfHttpClient {
    client: Client,
    endpoint: String,
}

impl EsgfHttpClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ScoutError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("esgf-scout/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ScoutError::EsgfHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| ScoutError::EsgfHttp(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl EsgfApi for EsgfHttpClient {
    fn query(&self, query: &Query) -> Result<Page, ScoutError> {
        let mut params: Vec<(&str, String)> = Vec::new();
        for (facet, values) in query.filters.iter() {
            for value in values {
                params.push((facet, value.clone()));
            }
        }
        params.push(("project", query.project.clone()));
        params.push(("format", "application/solr+json".to_string()));
        params.push(("limit", query.limit.to_string()));
        params.push(("offset", query.offset.to_string()));
        params.push(("replica", "false".to_string()));
        params.push(("latest", "true".to_string()));
        if let Some(facets) = &query.facets {
            params.push(("facets", facets.join(",")));
        }
        if let Some(fields) = &query.fields {
            params.push(("fields", fields.join(",")));
        }

        let response = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .send()
            .map_err(|err| ScoutError::EsgfHttp(err.to_string()))?;
        debug!("GET {}", response.url());

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "ESGF request failed".to_string());
            return Err(ScoutError::EsgfStatus { status, message });
        }

        let api: ApiResponse = response
            .json()
            .map_err(|err| ScoutError::EsgfParse(err.to_string()))?;
        Ok(Page {
            num_found: api.response.num_found,
            docs: api.response.docs,
            facet_fields: api
                .facet_counts
                .map(|fc| fc.facet_fields)
                .unwrap_or_default(),
        })
    }
}

/// A remote search record after normalization, facet name -> value(s).
pub type Record = BTreeMap<String, FacetValue>;

/// Unwrap single-element lists to scalars and drop the search `score`.
pub fn normalize_doc(doc: &serde_json::Map<String, Value>) -> Record {
    let mut record = Record::new();
    for (key, value) in doc {
        if key == "score" {
            continue;
        }
        let Some(value) = normalize_value(value) else {
            continue;
        };
        record.insert(key.clone(), value);
    }
    record
}

fn normalize_value(value: &Value) -> Option<FacetValue> {
    match value {
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(scalar_string).collect();
            match <[String; 1]>::try_from(items) {
                Ok([single]) => Some(FacetValue::One(single)),
                Err(items) => Some(FacetValue::Many(items)),
            }
        }
        Value::Null => None,
        other => Some(FacetValue::One(scalar_string(other))),
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Lazy, sequential stream of search records.
///
/// Pages are fetched one at a time; each page's records are yielded before
/// the next request goes out. Iteration ends once the advanced offset passes
/// the server-reported total. A failed page fetch yields the error and ends
/// the stream.
pub struct ResultStream<'a, A: EsgfApi + ?Sized> {
    api: &'a A,
    project: String,
    fields: Vec<String>,
    filters: FacetFilters,
    offset: u64,
    buffer: VecDeque<Record>,
    done: bool,
}

impl<'a, A: EsgfApi + ?Sized> ResultStream<'a, A> {
    pub fn new(api: &'a A, project: &str, fields: Vec<String>, filters: FacetFilters) -> Self {
        Self {
            api,
            project: project.to_string(),
            fields,
            filters,
            offset: 0,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    fn fetch_page(&mut self) -> Result<(), ScoutError> {
        debug!("results {} - {}", self.offset, self.offset + PAGE_SIZE);
        let query = Query {
            project: self.project.clone(),
            limit: PAGE_SIZE,
            offset: self.offset,
            facets: None,
            fields: Some(self.fields.clone()),
            filters: self.filters.clone(),
        };
        let page = self.api.query(&query)?;
        self.buffer.extend(page.docs.iter().map(normalize_doc));
        self.offset += PAGE_SIZE;
        if self.offset > page.num_found {
            self.done = true;
        }
        Ok(())
    }
}

impl<A: EsgfApi + ?Sized> Iterator for ResultStream<'_, A> {
    type Item = Result<Record, ScoutError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Some(Ok(record));
            }
            if self.done {
                return None;
            }
            if let Err(err) = self.fetch_page() {
                self.done = true;
                return Some(Err(err));
            }
        }
    }
}

/// Fetch the full vocabulary for the given facets via a zero-record facet
/// count query.
pub fn facet_values<A: EsgfApi + ?Sized>(
    api: &A,
    project: &str,
    facets: &[String],
) -> Result<BTreeMap<String, Vec<String>>, ScoutError> {
    let query = Query {
        project: project.to_string(),
        limit: 0,
        offset: 0,
        facets: Some(facets.to_vec()),
        fields: None,
        filters: FacetFilters::new(),
    };
    let page = api.query(&query)?;

    // facet_fields alternates value, count; keep the values.
    Ok(page
        .facet_fields
        .into_iter()
        .map(|(facet, flat)| {
            let values = flat.iter().step_by(2).map(scalar_string).collect();
            (facet, values)
        })
        .collect())
}
