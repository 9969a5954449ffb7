//! Request bodies for index management calls.

use serde_json::{json, Value};

use crate::gateway::{AliasAction, IndexPolicy};
use crate::mapping::MappingNode;

/// Setting that blocks writes while keeping the index readable
pub const WRITE_BLOCK: &str = "index.blocks.write";

/// Settings plus strict mappings for a new index
pub fn create_index_body(mapping: &MappingNode, policy: IndexPolicy) -> Value {
    json!({
        "settings": {
            "number_of_shards": policy.shards,
            "number_of_replicas": policy.replicas,
        },
        "mappings": mapping.to_json(),
    })
}

/// The clone inherits the source's write block; drop it on the target.
pub fn clone_body() -> Value {
    json!({ "settings": { WRITE_BLOCK: null } })
}

pub fn write_block_body(blocked: bool) -> Value {
    if blocked {
        json!({ WRITE_BLOCK: true })
    } else {
        json!({ WRITE_BLOCK: null })
    }
}

/// Additive update: only `properties` are sent, so `dynamic` stays as created.
pub fn put_mapping_body(mapping: &MappingNode) -> Value {
    json!({ "properties": mapping.properties_json() })
}

pub fn update_aliases_body(actions: &[AliasAction]) -> Value {
    let actions: Vec<Value> = actions.iter().map(AliasAction::to_json).collect();
    json!({ "actions": actions })
}

pub fn reindex_body(source: &str, dest: &str, script: Option<&str>) -> Value {
    let mut body = json!({
        "source": { "index": source },
        "dest": { "index": dest },
    });
    if let Some(script) = script {
        body["script"] = json!({ "source": script, "lang": "painless" });
    }
    body
}

/// Timeout parameter as the cluster expects it (`600s`)
pub fn timeout_param(timeout: std::time::Duration) -> String {
    format!("{}s", timeout.as_secs().max(1))
}
