use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::{AdvisoryError, AdvisoryRecord, AdvisorySource, BatchResult, PackageQuery};

pub const OSV_SOURCE: &str = "OSV";
const MAX_PAGES_PER_QUERY: usize = 50;

/// Client for the OSV `querybatch` and `vulns/{id}` endpoints.
#[derive(Debug, Clone)]
pub struct OsvClient {
    client: reqwest::Client,
    base: Url,
}

impl OsvClient {
    pub fn new(endpoint: &str) -> Result<Self, AdvisoryError> {
        let base = Url::parse(endpoint.trim())
            .map_err(|err| AdvisoryError::InvalidEndpoint(format!("{endpoint}: {err}")))?;
        if base.cannot_be_a_base() {
            return Err(AdvisoryError::InvalidEndpoint(endpoint.to_owned()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base,
        })
    }

    fn endpoint_url(&self, segments: &[&str]) -> Result<Url, AdvisoryError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| AdvisoryError::InvalidEndpoint(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn querybatch_url(&self) -> Result<Url, AdvisoryError> {
        self.endpoint_url(&["v1", "querybatch"])
    }

    fn vuln_url(&self, id: &str) -> Result<Url, AdvisoryError> {
        self.endpoint_url(&["v1", "vulns", id])
    }

    async fn post_batch(
        &self,
        request: &QueryBatchRequest<'_>,
    ) -> Result<QueryBatchResponse, AdvisoryError> {
        let response = self
            .client
            .post(self.querybatch_url()?)
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json::<QueryBatchResponse>()
            .await?;
        Ok(response)
    }

    async fn follow_pages(
        &self,
        query: &PackageQuery,
        mut page_token: String,
        ids: &mut Vec<String>,
    ) -> Result<(), AdvisoryError> {
        for _ in 0..MAX_PAGES_PER_QUERY {
            let request = QueryBatchRequest {
                queries: vec![OsvQuery::new(query, Some(page_token))],
            };
            let response = self.post_batch(&request).await?;
            let Some(entry) = response.results.into_iter().next() else {
                return Ok(());
            };

            ids.extend(entry.ids());
            match entry.next_page_token {
                Some(next) if !next.is_empty() => page_token = next,
                _ => return Ok(()),
            }
        }

        tracing::warn!(
            package = %query.name,
            version = %query.version,
            max_pages = MAX_PAGES_PER_QUERY,
            "stopped following OSV result pages"
        );
        Ok(())
    }
}

#[async_trait]
impl AdvisorySource for OsvClient {
    fn source_name(&self) -> &str {
        OSV_SOURCE
    }

    async fn query_batch(
        &self,
        queries: &[PackageQuery],
    ) -> Result<Vec<BatchResult>, AdvisoryError> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        let request = QueryBatchRequest {
            queries: queries
                .iter()
                .map(|query| OsvQuery::new(query, None))
                .collect(),
        };
        let response = self.post_batch(&request).await?;

        let mut results = Vec::with_capacity(response.results.len());
        for (query, entry) in queries.iter().zip(response.results) {
            let mut ids = entry.ids();
            if let Some(token) = entry.next_page_token.filter(|token| !token.is_empty()) {
                self.follow_pages(query, token, &mut ids).await?;
            }
            results.push(BatchResult {
                vulnerability_ids: ids,
            });
        }

        Ok(results)
    }

    async fn fetch(&self, id: &str) -> Result<AdvisoryRecord, AdvisoryError> {
        let record = self
            .client
            .get(self.vuln_url(id)?)
            .send()
            .await?
            .error_for_status()?
            .json::<AdvisoryRecord>()
            .await?;
        Ok(record)
    }
}

#[derive(Debug, Serialize)]
struct QueryBatchRequest<'a> {
    queries: Vec<OsvQuery<'a>>,
}

#[derive(Debug, Serialize)]
struct OsvQuery<'a> {
    package: OsvPackage<'a>,
    version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<String>,
}

impl<'a> OsvQuery<'a> {
    fn new(query: &'a PackageQuery, page_token: Option<String>) -> Self {
        Self {
            package: OsvPackage {
                ecosystem: &query.ecosystem,
                name: &query.name,
            },
            version: &query.version,
            page_token,
        }
    }
}

#[derive(Debug, Serialize)]
struct OsvPackage<'a> {
    ecosystem: &'a str,
    name: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct QueryBatchResponse {
    #[serde(default)]
    results: Vec<OsvBatchEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct OsvBatchEntry {
    #[serde(default)]
    vulns: Option<Vec<OsvVulnRef>>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl OsvBatchEntry {
    fn ids(&self) -> Vec<String> {
        self.vulns
            .iter()
            .flatten()
            .filter(|vuln| !vuln.id.is_empty())
            .map(|vuln| vuln.id.clone())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct OsvVulnRef {
    #[serde(default)]
    id: String,
}
