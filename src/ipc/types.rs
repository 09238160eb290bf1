use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::calc::MissingPolicy;
use crate::store::SqliteStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub store: Option<SqliteStore>,
    pub policy: MissingPolicy,
}

impl AppState {
    pub fn new(policy: MissingPolicy) -> Self {
        Self {
            workspace: None,
            store: None,
            policy,
        }
    }

    pub fn open_workspace(&mut self, path: &Path) -> anyhow::Result<()> {
        let store = SqliteStore::open(path)?;
        self.workspace = Some(path.to_path_buf());
        self.store = Some(store);
        tracing::info!(workspace = %path.display(), "workspace opened");
        Ok(())
    }
}
