// src/search/azure.rs

//! Azure Cognitive Search REST backend

use super::{DocumentResult, IndexAction, SearchBackend, SearchDocument, SearchRequest};
use crate::cancel;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

pub const DEFAULT_API_VERSION: &str = "2020-06-30";

pub struct AzureSearchBackend {
    client: reqwest::Client,
    /// `{endpoint}/indexes/{index}/docs/`
    docs_url: Url,
    api_key: String,
    api_version: String,
}

#[derive(Debug, Deserialize)]
struct IndexResponse {
    value: Vec<IndexResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexResult {
    key: String,
    status: bool,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    value: Vec<SearchDocument>,
}

impl AzureSearchBackend {
    pub fn new(endpoint: &Url, index: &str, api_key: &str, api_version: &str, timeout: Duration) -> Result<Self> {
        let mut base = endpoint.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let docs_url = base
            .join(&format!("indexes/{}/docs/", index))
            .map_err(|e| Error::Config(format!("Invalid search endpoint {}: {e}", endpoint)))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::SearchBackend(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            docs_url,
            api_key: api_key.to_string(),
            api_version: api_version.to_string(),
        })
    }

    async fn post(&self, operation: &str, body: &serde_json::Value) -> Result<reqwest::Response> {
        let url = self
            .docs_url
            .join(operation)
            .map_err(|e| Error::SearchBackend(format!("Invalid search URL: {e}")))?;

        debug!("POST {}", url);
        self.client
            .post(url)
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::SearchBackend(format!("Search request failed: {e}")))
    }

    async fn failure(response: reqwest::Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Error::SearchBackend(format!("Search service returned HTTP {}: {}", status, body))
    }

    /// OData string literal
    fn quote(value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }
}

#[async_trait]
impl SearchBackend for AzureSearchBackend {
    async fn submit(&self, actions: &[IndexAction], cancel: &CancellationToken) -> Result<Vec<DocumentResult>> {
        let value = actions.iter().map(|a| a.to_json()).collect::<Result<Vec<_>>>()?;
        let body = serde_json::json!({ "value": value });

        cancel::run(cancel, async {
            let response = self.post("index", &body).await?;

            match response.status() {
                StatusCode::PAYLOAD_TOO_LARGE => Err(Error::SearchBatchTooLarge(actions.len())),
                StatusCode::OK | StatusCode::MULTI_STATUS => {
                    let body = response
                        .bytes()
                        .await
                        .map_err(|e| Error::SearchBackend(format!("Failed to read index response: {e}")))?;
                    let parsed: IndexResponse = serde_json::from_slice(&body)?;

                    Ok(parsed
                        .value
                        .into_iter()
                        .map(|r| DocumentResult {
                            key: r.key,
                            succeeded: r.status,
                            error_message: r.error_message,
                        })
                        .collect())
                }
                _ => Err(Self::failure(response).await),
            }
        })
        .await
    }

    async fn search(&self, request: &SearchRequest, cancel: &CancellationToken) -> Result<Vec<SearchDocument>> {
        let query = match request.query.trim() {
            "" => "*",
            query => query,
        };
        let body = serde_json::json!({
            "search": query,
            "filter": format!("searchFilters eq {}", Self::quote(&request.filters.to_string())),
            "orderby": "totalDownloads desc",
            "skip": request.skip,
            "top": request.take,
        });

        cancel::run(cancel, async {
            let response = self.post("search", &body).await?;
            if !response.status().is_success() {
                return Err(Self::failure(response).await);
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| Error::SearchBackend(format!("Failed to read search response: {e}")))?;
            let parsed: SearchResponse = serde_json::from_slice(&body)?;
            Ok(parsed.value)
        })
        .await
    }

    fn name(&self) -> &str {
        "azure"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchFilters;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn backend() -> (MockServer, AzureSearchBackend) {
        let server = MockServer::start().await;
        let endpoint = Url::parse(&server.uri()).unwrap();
        let backend =
            AzureSearchBackend::new(&endpoint, "packages", "secret", DEFAULT_API_VERSION, Duration::from_secs(5))
                .unwrap();
        (server, backend)
    }

    fn deletes(n: usize) -> Vec<IndexAction> {
        (0..n).map(|i| IndexAction::Delete { key: format!("k{i}") }).collect()
    }

    #[tokio::test]
    async fn test_submit_success() {
        let (server, backend) = backend().await;
        Mock::given(method("POST"))
            .and(path("/indexes/packages/docs/index"))
            .and(query_param("api-version", DEFAULT_API_VERSION))
            .and(header("api-key", "secret"))
            .and(body_partial_json(serde_json::json!({
                "value": [{ "@search.action": "delete", "key": "k0" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [{ "key": "k0", "status": true, "errorMessage": null, "statusCode": 200 }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let results = backend.submit(&deletes(1), &CancellationToken::new()).await.unwrap();
        assert_eq!(results, vec![DocumentResult::success("k0")]);
    }

    #[tokio::test]
    async fn test_payload_too_large() {
        let (server, backend) = backend().await;
        Mock::given(method("POST"))
            .and(path("/indexes/packages/docs/index"))
            .respond_with(ResponseTemplate::new(413))
            .mount(&server)
            .await;

        let result = backend.submit(&deletes(6), &CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::SearchBatchTooLarge(6))));
    }

    #[tokio::test]
    async fn test_multi_status_reports_failures() {
        let (server, backend) = backend().await;
        Mock::given(method("POST"))
            .and(path("/indexes/packages/docs/index"))
            .respond_with(ResponseTemplate::new(207).set_body_json(serde_json::json!({
                "value": [
                    { "key": "k0", "status": true, "statusCode": 200 },
                    { "key": "k1", "status": false, "errorMessage": "Document not found", "statusCode": 404 }
                ]
            })))
            .mount(&server)
            .await;

        let results = backend.submit(&deletes(2), &CancellationToken::new()).await.unwrap();
        assert!(results[0].succeeded);
        assert!(!results[1].succeeded);
        assert_eq!(results[1].error_message.as_deref(), Some("Document not found"));
    }

    #[tokio::test]
    async fn test_server_error() {
        let (server, backend) = backend().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let result = backend.submit(&deletes(1), &CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::SearchBackend(msg)) if msg.contains("busy")));
    }

    #[tokio::test]
    async fn test_search_filters_partition() {
        let (server, backend) = backend().await;
        Mock::given(method("POST"))
            .and(path("/indexes/packages/docs/search"))
            .and(body_partial_json(serde_json::json!({
                "search": "*",
                "filter": "searchFilters eq 'IncludeSemVer2'",
                "top": 10
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "value": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let request = SearchRequest {
            query: " ".to_string(),
            filters: SearchFilters::IncludeSemVer2,
            skip: 0,
            take: 10,
        };
        let hits = backend.search(&request, &CancellationToken::new()).await.unwrap();
        assert!(hits.is_empty());
    }
}
