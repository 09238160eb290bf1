use anyhow::{bail, Context};
use std::path::PathBuf;

use crate::calc::MissingPolicy;

pub const ENV_WORKSPACE: &str = "RAPORT_WORKSPACE";
pub const ENV_LOG: &str = "RAPORT_LOG";
pub const ENV_MISSING_POLICY: &str = "RAPORT_MISSING_POLICY";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Opened at start-up when set; otherwise clients call `workspace.select`.
    pub workspace: Option<PathBuf>,
    pub log_filter: String,
    pub missing_policy: MissingPolicy,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let missing_policy = match non_empty(ENV_MISSING_POLICY) {
            None => MissingPolicy::default(),
            Some(raw) => match MissingPolicy::parse(&raw) {
                Some(p) => p,
                None => bail!(
                    "{ENV_MISSING_POLICY} must be zero_fill or renormalize, got {raw:?}"
                ),
            },
        };

        Ok(Config {
            workspace: non_empty(ENV_WORKSPACE).map(PathBuf::from),
            log_filter: non_empty(ENV_LOG).unwrap_or_else(|| "info".to_string()),
            missing_policy,
        })
    }

    pub fn init_tracing(&self) -> anyhow::Result<()> {
        let filter = tracing_subscriber::EnvFilter::try_new(&self.log_filter)
            .with_context(|| format!("invalid {ENV_LOG} filter {:?}", self.log_filter))?;
        // stdout carries protocol responses; logs go to stderr.
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init()
            .map_err(|e| anyhow::anyhow!("tracing init failed: {e}"))?;
        Ok(())
    }
}
