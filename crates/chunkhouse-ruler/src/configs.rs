//! Rule Configs Client
//!
//! Polls an external configs API for per-tenant rule sets. The scheduler
//! only sees the [`RulesProvider`] trait, so tests can feed it static
//! configurations.
//!
//! The API contract is one JSON document mapping tenant IDs to rule lists:
//!
//! ```json
//! {
//!   "configs": {
//!     "tenant-a": [{"name": "job:up:count", "expr": "count(up)"}],
//!     "tenant-b": []
//!   }
//! }
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::rules::Rule;

/// Source of per-tenant rule sets.
#[async_trait]
pub trait RulesProvider: Send + Sync {
    async fn rules(&self) -> Result<HashMap<String, Vec<Rule>>>;
}

#[derive(Deserialize)]
struct ConfigsResponse {
    configs: HashMap<String, Vec<Rule>>,
}

/// HTTP client for the configs API.
pub struct ConfigsClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl ConfigsClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| Error::InvalidConfigsUrl(format!("{base_url}: {e}")))?;
        let endpoint = base
            .join("api/v1/configs/rules")
            .map_err(|e| Error::InvalidConfigsUrl(format!("{base_url}: {e}")))?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
        })
    }
}

#[async_trait]
impl RulesProvider for ConfigsClient {
    async fn rules(&self) -> Result<HashMap<String, Vec<Rule>>> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .send()
            .await?
            .error_for_status()?;
        let body: ConfigsResponse = response.json().await?;
        Ok(body.configs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn test_fetches_per_tenant_rules() {
        let router = Router::new().route(
            "/api/v1/configs/rules",
            get(|| async {
                Json(serde_json::json!({
                    "configs": {
                        "u1": [{"name": "job:up:count", "expr": "count(up)"}],
                        "u2": [],
                    }
                }))
            }),
        );
        let base = serve(router).await;

        let client = ConfigsClient::new(&base).unwrap();
        let configs = client.rules().await.unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs["u1"].len(), 1);
        assert_eq!(configs["u1"][0].expr, "count(up)");
        assert!(configs["u2"].is_empty());
    }

    #[tokio::test]
    async fn test_http_error_is_propagated() {
        let router = Router::new(); // no configs route: 404
        let base = serve(router).await;

        let client = ConfigsClient::new(&base).unwrap();
        assert!(matches!(
            client.rules().await,
            Err(Error::ConfigsApi(_))
        ));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(matches!(
            ConfigsClient::new("not a url"),
            Err(Error::InvalidConfigsUrl(_))
        ));
    }
}
