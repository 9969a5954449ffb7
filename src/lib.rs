//! Larch - schema driven Elasticsearch index lifecycle
//!
//! Projects schemas into strict index mappings and keeps a stable alias per
//! resource type pointed at an index with the current mapping, updating or
//! reindexing as schemas evolve.

pub mod elasticsearch;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod mapping;
pub mod notify;
pub mod query;
pub mod resource;
pub mod schema;
pub mod scripts;

pub use error::BootstrapError;
pub use gateway::{ClusterGateway, GatewayError};
pub use lifecycle::{IndexLifecycle, ReconcileOutcome, ReconcileReport};
pub use schema::SchemaDescriptor;
