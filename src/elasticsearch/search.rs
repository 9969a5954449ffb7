//! Search execution.

use anyhow::Result;
use elasticsearch::SearchParts;
use serde_json::Value;
use tracing::debug;

use super::EsClient;
use crate::query::{build_request, SearchCriteria};

impl EsClient {
    /// Run the criteria against `indices` and return the raw hits.
    ///
    /// Point-in-time requests carry their own index binding, so `indices` is
    /// ignored when the criteria hold a cursor.
    pub async fn search(&self, indices: &[&str], criteria: &SearchCriteria) -> Result<Vec<Value>> {
        let body = build_request(criteria);
        debug!("Search body: {}", body);

        let parts = if criteria.uses_cursor() {
            SearchParts::None
        } else {
            SearchParts::Index(indices)
        };

        let response = self.client().search(parts).body(body).send().await?;

        if !response.status_code().is_success() {
            let error_body = response.text().await?;
            anyhow::bail!("Search failed: {}", error_body);
        }

        let response_body = response.json::<Value>().await?;
        let hits = response_body["hits"]["hits"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        debug!("Search returned {} hits", hits.len());
        Ok(hits)
    }
}
