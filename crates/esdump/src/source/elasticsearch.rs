//! Elasticsearch scroll source.
//!
//! Pages through one index with the scroll API: an initial
//! `POST {url}/{index}/_search?scroll=...` followed by
//! `POST {url}/_search/scroll` continuations until `hits.hits` comes back
//! empty. The scroll context is released best-effort once exhausted.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::app_config::EsSourceConfig;
use crate::common::ScanHit;
use crate::source::Source;

#[derive(Debug, Deserialize)]
struct ScrollResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: ScrollHits,
}

#[derive(Debug, Deserialize)]
struct ScrollHits {
    hits: Vec<ScanHit>,
}

#[derive(Debug)]
pub(crate) struct EsScrollSource {
    client: reqwest::Client,
    config: EsSourceConfig,
    scroll_id: Option<String>,
    exhausted: bool,
}

impl EsScrollSource {
    /// Builds the HTTP client and pings the cluster root so an unreachable
    /// or misconfigured cluster fails here, at startup, rather than mid-run.
    pub(crate) async fn new(config: EsSourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("failed to build the http client")?;

        if config.username.is_none() {
            warn!("no basic authentication configured for elasticsearch");
        }

        let source = Self {
            client,
            config,
            scroll_id: None,
            exhausted: false,
        };

        let response = source
            .with_auth(source.client.get(source.base_url()))
            .send()
            .await
            .with_context(|| format!("elasticsearch at '{}' is unreachable", source.base_url()))?;
        let status = response.status();
        anyhow::ensure!(
            status.is_success(),
            "elasticsearch at '{}' answered the connectivity check with {}",
            source.base_url(),
            status
        );
        debug!(url = source.base_url(), "connected to elasticsearch");

        Ok(source)
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.username {
            Some(username) => request.basic_auth(username, self.config.password.as_ref()),
            None => request,
        }
    }

    async fn fetch(&self, request: reqwest::RequestBuilder, body: String) -> Result<ScrollResponse> {
        let response = self
            .with_auth(request)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .context("scroll request did not reach elasticsearch")?;
        let status = response.status();
        let text = response
            .text()
            .await
            .context("failed to read scroll response body")?;
        anyhow::ensure!(status.is_success(), "scroll request failed with {status}: {text}");
        serde_json::from_str(&text).context("failed to decode scroll response")
    }

    /// Tells the cluster to drop the scroll context early instead of letting
    /// it expire. Failure only costs cluster memory until the timeout, so it
    /// is logged and swallowed.
    async fn clear_scroll(&mut self) {
        let Some(scroll_id) = self.scroll_id.take() else {
            return;
        };
        let result = self
            .with_auth(self.client.delete(format!("{}/_search/scroll", self.base_url())))
            .header("Content-Type", "application/json")
            .body(json!({ "scroll_id": [scroll_id] }).to_string())
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {
                debug!("released scroll context");
            }
            Ok(response) => warn!(status = %response.status(), "could not release scroll context"),
            Err(err) => warn!("could not release scroll context: {err}"),
        }
    }
}

#[async_trait]
impl Source for EsScrollSource {
    async fn next_page(&mut self) -> Result<Option<Vec<ScanHit>>> {
        if self.exhausted {
            return Ok(None);
        }

        let response = match &self.scroll_id {
            None => {
                let url = format!("{}/{}/_search", self.base_url(), self.config.index);
                let body = json!({
                    "size": self.config.scroll_size,
                    "query": { "match_all": {} },
                    "sort": ["_doc"],
                });
                let request = self
                    .client
                    .post(url)
                    .query(&[("scroll", self.config.scroll_timeout.as_str())]);
                self.fetch(request, body.to_string()).await?
            }
            Some(scroll_id) => {
                let url = format!("{}/_search/scroll", self.base_url());
                let body = json!({
                    "scroll": self.config.scroll_timeout,
                    "scroll_id": scroll_id,
                });
                self.fetch(self.client.post(url), body.to_string()).await?
            }
        };

        if let Some(scroll_id) = response.scroll_id {
            self.scroll_id = Some(scroll_id);
        }

        if response.hits.hits.is_empty() {
            self.exhausted = true;
            self.clear_scroll().await;
            return Ok(None);
        }

        debug!(hits = response.hits.hits.len(), "fetched scroll page");
        Ok(Some(response.hits.hits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{basic_auth, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: &str) -> EsSourceConfig {
        EsSourceConfig {
            url: url.to_string(),
            username: None,
            password: None,
            index: "logs".to_string(),
            scroll_size: 2,
            scroll_timeout: "5m".to_string(),
            request_timeout_secs: 5,
        }
    }

    async fn mock_ping(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
    }

    fn page(scroll_id: &str, ids: &[&str]) -> String {
        let hits: Vec<_> = ids
            .iter()
            .map(|id| {
                json!({ "_index": "logs", "_id": id, "_source": { "id": id } })
            })
            .collect();
        json!({ "_scroll_id": scroll_id, "hits": { "hits": hits } }).to_string()
    }

    #[tokio::test]
    async fn scrolls_until_exhaustion_and_releases_the_context() {
        let server = MockServer::start().await;
        mock_ping(&server).await;
        Mock::given(method("POST"))
            .and(path("/logs/_search"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(page("cursor-1", &["a", "b"]), "application/json"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_search/scroll"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(page("cursor-2", &[]), "application/json"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/_search/scroll"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut source = EsScrollSource::new(config(&server.uri())).await.unwrap();

        let first = source.next_page().await.unwrap().expect("first page has hits");
        let ids: Vec<_> = first.iter().map(|hit| hit.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);

        assert!(source.next_page().await.unwrap().is_none());
        // exhausted sources stay exhausted without touching the network again
        assert!(source.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn routing_survives_deserialization() {
        let server = MockServer::start().await;
        mock_ping(&server).await;
        let body = json!({
            "_scroll_id": "c",
            "hits": { "hits": [
                { "_index": "logs", "_id": "r1", "_routing": "shard-3", "_source": {} }
            ]}
        });
        Mock::given(method("POST"))
            .and(path("/logs/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), "application/json"))
            .mount(&server)
            .await;

        let mut source = EsScrollSource::new(config(&server.uri())).await.unwrap();
        let hits = source.next_page().await.unwrap().unwrap();
        assert_eq!(hits[0].routing.as_deref(), Some("shard-3"));
    }

    #[tokio::test]
    async fn basic_auth_is_sent_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(basic_auth("elastic", "sekret"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut cfg = config(&server.uri());
        cfg.username = Some("elastic".to_string());
        cfg.password = Some("sekret".to_string());
        EsScrollSource::new(cfg).await.unwrap();
    }

    #[tokio::test]
    async fn startup_fails_when_the_cluster_is_down() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = EsScrollSource::new(config(&server.uri())).await.unwrap_err();
        assert!(err.to_string().contains("connectivity check"));
    }

    #[tokio::test]
    async fn a_server_error_surfaces_as_a_page_error() {
        let server = MockServer::start().await;
        mock_ping(&server).await;
        Mock::given(method("POST"))
            .and(path("/logs/_search"))
            .respond_with(ResponseTemplate::new(500).set_body_string("shard failure"))
            .mount(&server)
            .await;

        let mut source = EsScrollSource::new(config(&server.uri())).await.unwrap();
        let err = source.next_page().await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
