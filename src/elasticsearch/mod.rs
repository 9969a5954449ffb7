//! Elasticsearch client and operations.

mod client;
mod gateway;
mod schema;
mod search;

pub use client::{ClusterConfig, EsClient};
