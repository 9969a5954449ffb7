//! [`ClusterGateway`] over the official client.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use elasticsearch::cluster::ClusterHealthParts;
use elasticsearch::http::response::Response;
use elasticsearch::indices::{
    IndicesCloneParts, IndicesCreateParts, IndicesDeleteParts, IndicesExistsAliasParts,
    IndicesExistsParts, IndicesGetAliasParts, IndicesGetMappingParts, IndicesPutMappingParts,
    IndicesPutSettingsParts,
};
use serde_json::Value;
use tracing::{debug, error, warn};

use super::schema::{
    clone_body, create_index_body, put_mapping_body, reindex_body, timeout_param,
    update_aliases_body, write_block_body,
};
use super::EsClient;
use crate::gateway::{
    AliasAction, ClusterGateway, ClusterHealth, GatewayError, IndexPolicy, LiveMappings,
    ReindexSummary,
};
use crate::mapping::MappingNode;

/// Headroom over the server side timeout before the client gives up waiting.
const CLIENT_GRACE: Duration = Duration::from_secs(30);

/// Rejections are the cluster's answer and only warned about; the rest means
/// no answer could be had.
fn logged(err: GatewayError) -> GatewayError {
    match &err {
        GatewayError::Rejected { .. } | GatewayError::NotAcknowledged { .. } => {
            warn!("Cluster declined: {}", err)
        }
        _ => error!("Cluster call failed: {}", err),
    }
    err
}

/// Await a request, bounded by `budget` when given.
async fn dispatch<F>(
    operation: &'static str,
    target: &str,
    budget: Option<Duration>,
    request: F,
) -> Result<Response, GatewayError>
where
    F: Future<Output = Result<Response, elasticsearch::Error>>,
{
    debug!("{} {}", operation, target);

    let result = match budget {
        Some(budget) => tokio::time::timeout(budget + CLIENT_GRACE, request)
            .await
            .map_err(|_| {
                logged(GatewayError::TimedOut {
                    operation,
                    target: target.to_string(),
                    timeout: budget,
                })
            })?,
        None => request.await,
    };

    result.map_err(|e| {
        logged(GatewayError::Transport {
            operation,
            target: target.to_string(),
            source: Box::new(e),
        })
    })
}

/// Body of a 2xx response, or `Rejected` carrying the error body.
async fn success_body(
    operation: &'static str,
    target: &str,
    response: Response,
) -> Result<Value, GatewayError> {
    let status = response.status_code();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(logged(GatewayError::Rejected {
            operation,
            target: target.to_string(),
            status: status.as_u16(),
            body,
        }));
    }

    response.json::<Value>().await.map_err(|e| {
        logged(GatewayError::Malformed {
            operation,
            target: target.to_string(),
            detail: e.to_string(),
        })
    })
}

fn acknowledged(operation: &'static str, target: &str, body: &Value) -> Result<(), GatewayError> {
    if body["acknowledged"].as_bool() == Some(true) {
        Ok(())
    } else {
        Err(logged(GatewayError::NotAcknowledged {
            operation,
            target: target.to_string(),
        }))
    }
}

/// HEAD style existence checks: 200 or 404, anything else is an error.
async fn exists(
    operation: &'static str,
    target: &str,
    response: Response,
) -> Result<bool, GatewayError> {
    match response.status_code().as_u16() {
        200 => Ok(true),
        404 => Ok(false),
        status => Err(logged(GatewayError::Rejected {
            operation,
            target: target.to_string(),
            status,
            body: response.text().await.unwrap_or_default(),
        })),
    }
}

fn parse_mappings(target: &str, body: &Value) -> Result<LiveMappings, GatewayError> {
    let malformed = |detail: String| {
        logged(GatewayError::Malformed {
            operation: "get_mapping",
            target: target.to_string(),
            detail,
        })
    };

    let indices = body
        .as_object()
        .ok_or_else(|| malformed("response is not an object".to_string()))?;

    let mut live = LiveMappings::new();
    for (index, entry) in indices {
        let mapping =
            MappingNode::from_json(&entry["mappings"]).map_err(|e| malformed(e.to_string()))?;
        live.insert(index.clone(), mapping);
    }
    Ok(live)
}

fn parse_reindex(
    target: &str,
    body: &Value,
    timeout: Duration,
) -> Result<ReindexSummary, GatewayError> {
    if body["timed_out"].as_bool() == Some(true) {
        return Err(logged(GatewayError::TimedOut {
            operation: "reindex",
            target: target.to_string(),
            timeout,
        }));
    }

    let failures = body["failures"].as_array().map_or(0, Vec::len);
    if failures > 0 {
        return Err(logged(GatewayError::Rejected {
            operation: "reindex",
            target: target.to_string(),
            status: 200,
            body: body["failures"].to_string(),
        }));
    }

    serde_json::from_value(body.clone()).map_err(|e| {
        logged(GatewayError::Malformed {
            operation: "reindex",
            target: target.to_string(),
            detail: e.to_string(),
        })
    })
}

#[async_trait]
impl ClusterGateway for EsClient {
    async fn alias_exists(&self, alias: &str) -> Result<bool, GatewayError> {
        let names = [alias];
        let response = dispatch(
            "alias_exists",
            alias,
            None,
            self.client()
                .indices()
                .exists_alias(IndicesExistsAliasParts::Name(&names))
                .send(),
        )
        .await?;
        exists("alias_exists", alias, response).await
    }

    async fn index_exists(&self, index: &str) -> Result<bool, GatewayError> {
        let names = [index];
        let response = dispatch(
            "index_exists",
            index,
            None,
            self.client()
                .indices()
                .exists(IndicesExistsParts::Index(&names))
                .send(),
        )
        .await?;
        exists("index_exists", index, response).await
    }

    async fn create_index(
        &self,
        index: &str,
        mapping: &MappingNode,
        policy: IndexPolicy,
    ) -> Result<(), GatewayError> {
        let response = dispatch(
            "create_index",
            index,
            None,
            self.client()
                .indices()
                .create(IndicesCreateParts::Index(index))
                .body(create_index_body(mapping, policy))
                .send(),
        )
        .await?;
        let body = success_body("create_index", index, response).await?;
        acknowledged("create_index", index, &body)
    }

    async fn delete_index(&self, index: &str) -> Result<(), GatewayError> {
        let names = [index];
        let response = dispatch(
            "delete_index",
            index,
            None,
            self.client()
                .indices()
                .delete(IndicesDeleteParts::Index(&names))
                .send(),
        )
        .await?;
        let body = success_body("delete_index", index, response).await?;
        acknowledged("delete_index", index, &body)
    }

    async fn clone_index(
        &self,
        source: &str,
        target: &str,
        timeout: Duration,
    ) -> Result<(), GatewayError> {
        let label = format!("{} -> {}", source, target);
        let timeout_str = timeout_param(timeout);
        let response = dispatch(
            "clone_index",
            &label,
            Some(timeout),
            self.client()
                .indices()
                .clone(IndicesCloneParts::IndexTarget(source, target))
                .timeout(&timeout_str)
                .body(clone_body())
                .send(),
        )
        .await?;
        let body = success_body("clone_index", &label, response).await?;
        acknowledged("clone_index", &label, &body)
    }

    async fn freeze_index(&self, index: &str, timeout: Duration) -> Result<(), GatewayError> {
        self.set_write_block(index, true, timeout).await
    }

    async fn unfreeze_index(&self, index: &str, timeout: Duration) -> Result<(), GatewayError> {
        self.set_write_block(index, false, timeout).await
    }

    async fn get_mapping(&self, alias: &str) -> Result<LiveMappings, GatewayError> {
        let names = [alias];
        let response = dispatch(
            "get_mapping",
            alias,
            None,
            self.client()
                .indices()
                .get_mapping(IndicesGetMappingParts::Index(&names))
                .send(),
        )
        .await?;
        let body = success_body("get_mapping", alias, response).await?;
        parse_mappings(alias, &body)
    }

    async fn put_mapping_additive(
        &self,
        alias: &str,
        mapping: &MappingNode,
    ) -> Result<(), GatewayError> {
        let names = [alias];
        let response = dispatch(
            "put_mapping",
            alias,
            None,
            self.client()
                .indices()
                .put_mapping(IndicesPutMappingParts::Index(&names))
                .body(put_mapping_body(mapping))
                .send(),
        )
        .await?;
        let body = success_body("put_mapping", alias, response).await?;
        acknowledged("put_mapping", alias, &body)
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), GatewayError> {
        let label = actions
            .iter()
            .map(|a| a.alias.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let response = dispatch(
            "update_aliases",
            &label,
            None,
            self.client()
                .indices()
                .update_aliases()
                .body(update_aliases_body(actions))
                .send(),
        )
        .await?;
        let body = success_body("update_aliases", &label, response).await?;
        acknowledged("update_aliases", &label, &body)
    }

    async fn get_indices_for_alias(&self, alias: &str) -> Result<Vec<String>, GatewayError> {
        let names = [alias];
        let response = dispatch(
            "get_alias",
            alias,
            None,
            self.client()
                .indices()
                .get_alias(IndicesGetAliasParts::Name(&names))
                .send(),
        )
        .await?;

        if response.status_code().as_u16() == 404 {
            return Ok(Vec::new());
        }

        let body = success_body("get_alias", alias, response).await?;
        Ok(body
            .as_object()
            .map(|indices| indices.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn reindex(
        &self,
        source: &str,
        dest: &str,
        script: Option<&str>,
        timeout: Duration,
    ) -> Result<ReindexSummary, GatewayError> {
        let label = format!("{} -> {}", source, dest);
        let timeout_str = timeout_param(timeout);
        let response = dispatch(
            "reindex",
            &label,
            Some(timeout),
            self.client()
                .reindex()
                .refresh(true)
                .wait_for_completion(true)
                .timeout(&timeout_str)
                .body(reindex_body(source, dest, script))
                .send(),
        )
        .await?;
        let body = success_body("reindex", &label, response).await?;
        parse_reindex(&label, &body, timeout)
    }

    async fn cluster_health(&self) -> Result<ClusterHealth, GatewayError> {
        let response = dispatch(
            "cluster_health",
            "_cluster",
            None,
            self.client()
                .cluster()
                .health(ClusterHealthParts::None)
                .send(),
        )
        .await?;
        let body = success_body("cluster_health", "_cluster", response).await?;
        serde_json::from_value(body).map_err(|e| {
            logged(GatewayError::Malformed {
                operation: "cluster_health",
                target: "_cluster".to_string(),
                detail: e.to_string(),
            })
        })
    }
}

impl EsClient {
    async fn set_write_block(
        &self,
        index: &str,
        blocked: bool,
        timeout: Duration,
    ) -> Result<(), GatewayError> {
        let operation = if blocked { "freeze_index" } else { "unfreeze_index" };
        let timeout_str = timeout_param(timeout);
        let names = [index];
        let response = dispatch(
            operation,
            index,
            Some(timeout),
            self.client()
                .indices()
                .put_settings(IndicesPutSettingsParts::Index(&names))
                .timeout(&timeout_str)
                .body(write_block_body(blocked))
                .send(),
        )
        .await?;
        let body = success_body(operation, index, response).await?;
        acknowledged(operation, index, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elasticsearch::ClusterConfig;
    use crate::mapping::IndexFieldKind;
    use serde_json::json;

    fn assert_gateway<G: ClusterGateway>(gateway: &G) -> &G {
        gateway
    }

    #[test]
    fn test_client_requests_build_without_a_cluster() {
        let client = EsClient::new(&ClusterConfig::default()).unwrap();
        let gateway = assert_gateway(&client);

        // futures are lazy, building them only type-checks the request chains
        let reindex = gateway.reindex("risk_score", "risk_score-1", None, Duration::from_secs(5));
        let clone = gateway.clone_index("risk_score-1", "risk_score-1_temp", Duration::from_secs(5));
        let freeze = gateway.freeze_index("risk_score-1", Duration::from_secs(5));
        let aliases = gateway.update_aliases(&[]);
        drop((reindex, clone, freeze, aliases));
    }

    #[test]
    fn test_parse_mappings_per_index() {
        let body = json!({
            "risk_score-1": {
                "mappings": {
                    "dynamic": "strict",
                    "properties": { "name": { "type": "keyword" } }
                }
            },
            "risk_score-2": {
                "mappings": {
                    "properties": { "score": { "type": "long" } }
                }
            }
        });

        let live = parse_mappings("risk_score", &body).unwrap();
        assert_eq!(live.len(), 2);
        assert!(live["risk_score-1"].strict);
        assert_eq!(
            live["risk_score-2"].properties["score"].kind(),
            IndexFieldKind::Long
        );
    }

    #[test]
    fn test_parse_mappings_rejects_garbage() {
        let err = parse_mappings("risk_score", &json!(["nope"])).unwrap_err();
        assert_eq!(err.operation(), "get_mapping");

        let err = parse_mappings(
            "risk_score",
            &json!({ "risk_score-1": { "mappings": { "properties": { "x": {} } } } }),
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::Malformed { .. }));
    }

    #[test]
    fn test_parse_reindex_summary() {
        let summary = parse_reindex(
            "a -> b",
            &json!({
                "took": 147,
                "timed_out": false,
                "total": 120,
                "updated": 0,
                "created": 120,
                "deleted": 0,
                "batches": 1,
                "failures": []
            }),
            Duration::from_secs(600),
        )
        .unwrap();
        assert_eq!(summary.total, 120);
        assert_eq!(summary.created, 120);
        assert_eq!(summary.took, 147);
    }

    #[test]
    fn test_parse_reindex_failures() {
        let err = parse_reindex(
            "a -> b",
            &json!({
                "took": 3,
                "timed_out": false,
                "total": 1,
                "failures": [{ "index": "b", "cause": { "type": "strict_dynamic_mapping_exception" } }]
            }),
            Duration::from_secs(600),
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { status: 200, .. }));

        let err = parse_reindex("a -> b", &json!({ "timed_out": true }), Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, GatewayError::TimedOut { .. }));
    }
}
