use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use larch::elasticsearch::ClusterConfig;
use larch::lifecycle::OperationTimeouts;
use larch::schema::SchemaDescriptor;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub migrations: MigrationsConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MigrationsConfig {
    pub dir: PathBuf,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("migrations"),
        }
    }
}

/// Operation budgets in seconds
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub clone: u64,
    pub freeze: u64,
    pub unfreeze: u64,
    pub reindex: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        let defaults = OperationTimeouts::default();
        Self {
            clone: defaults.clone.as_secs(),
            freeze: defaults.freeze.as_secs(),
            unfreeze: defaults.unfreeze.as_secs(),
            reindex: defaults.reindex.as_secs(),
        }
    }
}

impl TimeoutsConfig {
    pub fn operation_timeouts(&self) -> OperationTimeouts {
        OperationTimeouts {
            clone: Duration::from_secs(self.clone),
            freeze: Duration::from_secs(self.freeze),
            unfreeze: Duration::from_secs(self.unfreeze),
            reindex: Duration::from_secs(self.reindex),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResourceConfig {
    pub schema: PathBuf,
}

impl Config {
    /// Relative paths in the file are resolved against its directory.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        if let Some(base) = path.parent() {
            config.migrations.dir = base.join(&config.migrations.dir);
            for resource in &mut config.resources {
                resource.schema = base.join(&resource.schema);
            }
        }

        Ok(config)
    }

    pub fn load_schemas(&self) -> Result<Vec<SchemaDescriptor>> {
        self.resources
            .iter()
            .map(|resource| SchemaDescriptor::load_from_file(&resource.schema))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_full_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("risk_score.toml"),
            r#"
name = "acme.RiskScore"

[[fields]]
name = "name"
type = "string"

[[fields]]
name = "score"
type = "int32"
"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("larch.toml"),
            r#"
[cluster]
url = "https://es.internal:9200"
username = "elastic"
password = "changeme"

[timeouts]
reindex = 1800

[notify]
webhook_url = "https://hooks.example.com/abc"

[[resources]]
schema = "risk_score.toml"
"#,
        )
        .unwrap();

        let config = Config::load_from_file(dir.path().join("larch.toml")).unwrap();
        assert_eq!(config.cluster.url, "https://es.internal:9200");
        assert_eq!(config.cluster.username.as_deref(), Some("elastic"));
        assert_eq!(config.migrations.dir, dir.path().join("migrations"));
        assert_eq!(
            config.notify.webhook_url.as_deref(),
            Some("https://hooks.example.com/abc")
        );

        let timeouts = config.timeouts.operation_timeouts();
        assert_eq!(timeouts.reindex, Duration::from_secs(1800));
        assert_eq!(timeouts.clone, Duration::from_secs(600));
        assert_eq!(timeouts.freeze, Duration::from_secs(120));

        let schemas = config.load_schemas().unwrap();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "acme.RiskScore");
        assert_eq!(schemas[0].fields.len(), 2);
    }

    #[test]
    fn test_minimal_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("larch.toml"), "").unwrap();

        let config = Config::load_from_file(dir.path().join("larch.toml")).unwrap();
        assert_eq!(config.cluster.url, "http://localhost:9200");
        assert!(config.resources.is_empty());
        assert!(config.notify.webhook_url.is_none());
        assert!(config.load_schemas().unwrap().is_empty());
    }

    #[test]
    fn test_missing_schema_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("larch.toml"),
            "[[resources]]\nschema = \"nope.toml\"\n",
        )
        .unwrap();

        let config = Config::load_from_file(dir.path().join("larch.toml")).unwrap();
        assert!(config.load_schemas().is_err());
    }

    #[test]
    fn test_demo_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/larch.toml");
        let config = Config::load_from_file(path).unwrap();

        let schemas = config.load_schemas().unwrap();
        let names: Vec<&str> = schemas.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["acme.RiskScore", "acme.PurchaseOrder"]);
        assert!(schemas[0]
            .fields
            .iter()
            .any(|f| f.name == "location" && f.message.is_some()));
        assert!(schemas[1].fields.iter().any(|f| f.repeated));
    }
}
