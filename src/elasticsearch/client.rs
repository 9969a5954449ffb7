//! Elasticsearch client wrapper.

use anyhow::{Context, Result};
use elasticsearch::{
    auth::Credentials,
    cert::CertificateValidation,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    Elasticsearch,
};
use serde::Deserialize;
use tracing::warn;
use url::Url;

/// Connection settings of the `[cluster]` config section
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Accept any server certificate. Local clusters only.
    #[serde(default)]
    pub insecure_trust_all_certificates: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            username: None,
            password: None,
            insecure_trust_all_certificates: false,
        }
    }
}

/// Elasticsearch client wrapper with connection configuration
#[derive(Clone)]
pub struct EsClient {
    client: Elasticsearch,
}

impl EsClient {
    /// Create a new Elasticsearch client
    pub fn new(config: &ClusterConfig) -> Result<Self> {
        let url = Url::parse(&config.url)
            .with_context(|| format!("Invalid cluster url '{}'", config.url))?;
        let conn_pool = SingleNodeConnectionPool::new(url);
        let mut builder = TransportBuilder::new(conn_pool).disable_proxy();

        match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                builder = builder.auth(Credentials::Basic(username.clone(), password.clone()));
            }
            (Some(_), None) | (None, Some(_)) => {
                warn!("Ignoring cluster credentials: username and password must both be set");
            }
            (None, None) => {}
        }

        if config.insecure_trust_all_certificates {
            warn!("TLS certificate validation is disabled for {}", config.url);
            builder = builder.cert_validation(CertificateValidation::None);
        }

        let transport = builder
            .build()
            .context("Failed to build Elasticsearch transport")?;

        Ok(Self {
            client: Elasticsearch::new(transport),
        })
    }

    /// Get the underlying Elasticsearch client
    pub fn client(&self) -> &Elasticsearch {
        &self.client
    }

    /// Get document count behind an index or alias
    pub async fn doc_count(&self, index: &str) -> Result<u64> {
        let response = self
            .client
            .count(elasticsearch::CountParts::Index(&[index]))
            .send()
            .await?;

        let body = response.json::<serde_json::Value>().await?;
        Ok(body["count"].as_u64().unwrap_or(0))
    }
}
