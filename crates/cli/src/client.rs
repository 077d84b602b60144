//! HTTP client for the governor status API

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

/// Read-only client for the governor API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_with_query(path, &[]).await
    }

    /// Make a GET request with query parameters; `None` values are skipped
    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, Option<String>)],
    ) -> Result<T> {
        let mut url = self.base_url.join(path).context("Invalid path")?;
        let present: Vec<_> = params
            .iter()
            .filter_map(|(key, value)| value.as_deref().map(|v| (*key, v)))
            .collect();
        if !present.is_empty() {
            url.query_pairs_mut().extend_pairs(present);
        }

        self.send(url, false).await
    }

    /// GET a probe endpoint. Probes answer 503 with a JSON body when the
    /// service is unhealthy or not ready, so that body is decoded too.
    pub async fn probe<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;
        self.send(url, true).await
    }

    async fn send<T: DeserializeOwned>(&self, url: Url, accept_unavailable: bool) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let unavailable = accept_unavailable && status == StatusCode::SERVICE_UNAVAILABLE;
        if !status.is_success() && !unavailable {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor_lib::{ModuleInfo, ModuleState};
    use mockito::Matcher;

    #[tokio::test]
    async fn test_get_decodes_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/modules/indexer")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"module_id":"indexer","name":"Indexer","priority":3,"state":"running"}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let module: ModuleInfo = client.get("api/v1/modules/indexer").await.unwrap();

        mock.assert_async().await;
        assert_eq!(module.module_id, "indexer");
        assert_eq!(module.state, ModuleState::Running);
    }

    #[tokio::test]
    async fn test_query_skips_missing_values() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/modules")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("state".into(), "paused".into()),
                Matcher::UrlEncoded("max_priority".into(), "2".into()),
            ]))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let modules: Vec<ModuleInfo> = client
            .get_with_query(
                "api/v1/modules",
                &[
                    ("state", Some("paused".to_string())),
                    ("min_priority", None),
                    ("max_priority", Some("2".to_string())),
                ],
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(modules.is_empty());
    }

    #[tokio::test]
    async fn test_error_status_carries_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/modules/ghost")
            .with_status(404)
            .with_body(r#"{"error":"module 'ghost' not found"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .get::<ModuleInfo>("api/v1/modules/ghost")
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("404"));
        assert!(message.contains("ghost"));
    }

    #[tokio::test]
    async fn test_probe_decodes_unavailable_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/readyz")
            .with_status(503)
            .with_body(r#"{"ready":false,"reason":"Unhealthy components: resource_monitor"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let readiness: governor_lib::ReadinessResponse = client.probe("readyz").await.unwrap();
        assert!(!readiness.ready);

        let err = client
            .get::<governor_lib::ReadinessResponse>("readyz")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
