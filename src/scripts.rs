//! Reindex transform scripts.
//!
//! A schema version may ship a painless script that rewrites documents while
//! they are copied into its new index. Scripts are looked up by
//! [`ScriptKey`]; most versions have none.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::resource::ScriptKey;

#[derive(Debug, Error)]
#[error("failed to load transform script {key} from {path}: {source}")]
pub struct ScriptError {
    pub key: ScriptKey,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

pub trait ScriptRepository: Send + Sync {
    /// `Ok(None)` when no script exists for the key.
    fn resolve(&self, key: &ScriptKey) -> Result<Option<String>, ScriptError>;
}

/// Scripts stored as `<root>/<group>/<name>`.
#[derive(Debug, Clone)]
pub struct DirScriptRepository {
    root: PathBuf,
}

impl DirScriptRepository {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, key: &ScriptKey) -> PathBuf {
        self.root.join(&key.group).join(&key.name)
    }
}

impl ScriptRepository for DirScriptRepository {
    fn resolve(&self, key: &ScriptKey) -> Result<Option<String>, ScriptError> {
        let path = self.path_for(key);

        match fs::read_to_string(&path) {
            Ok(script) => {
                info!("Transform script found for {}", key);
                Ok(Some(script))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No transform script at {}", path.display());
                Ok(None)
            }
            Err(source) => Err(ScriptError {
                key: key.clone(),
                path,
                source,
            }),
        }
    }
}

/// In-memory scripts, for embedding or tests.
#[derive(Debug, Clone, Default)]
pub struct StaticScripts {
    scripts: HashMap<ScriptKey, String>,
}

impl StaticScripts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: ScriptKey, script: impl Into<String>) -> Self {
        self.scripts.insert(key, script.into());
        self
    }
}

impl ScriptRepository for StaticScripts {
    fn resolve(&self, key: &ScriptKey) -> Result<Option<String>, ScriptError> {
        Ok(self.scripts.get(key).cloned())
    }
}
