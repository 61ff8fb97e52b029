//! Stream load configuration.

use crate::error::{StreamLoadError, StreamLoadResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Payload format announced to the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadFormat {
    #[default]
    Csv,
    /// One JSON object per line.
    Json,
}

impl fmt::Display for LoadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadFormat::Csv => f.write_str("csv"),
            LoadFormat::Json => f.write_str("json"),
        }
    }
}

/// Stream load target and request settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamLoadConfig {
    /// Frontend nodes as `host:port` (or full `http://host:port` base URLs).
    #[serde(default)]
    pub fe_nodes: Vec<String>,

    #[serde(default)]
    pub database: String,

    #[serde(default)]
    pub table: String,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Labels are `<label_prefix>_<uuid>`.
    #[serde(default = "default_label_prefix")]
    pub label_prefix: String,

    /// Column separator for CSV loads; server default when unset.
    #[serde(default)]
    pub column_separator: Option<String>,

    #[serde(default)]
    pub format: LoadFormat,

    /// Extra headers sent with every load (e.g. `columns`, `where`).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,
}

fn default_label_prefix() -> String {
    "batch_forwarder".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_redirects() -> u32 {
    3
}

impl StreamLoadConfig {
    pub fn new(
        fe_nodes: Vec<String>,
        database: impl Into<String>,
        table: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            fe_nodes,
            database: database.into(),
            table: table.into(),
            user: user.into(),
            password: String::new(),
            label_prefix: default_label_prefix(),
            column_separator: None,
            format: LoadFormat::default(),
            headers: BTreeMap::new(),
            timeout_secs: default_timeout_secs(),
            max_redirects: default_max_redirects(),
        }
    }

    /// Check required fields, reporting every missing one at once.
    pub fn validate_required(&self) -> StreamLoadResult<()> {
        let mut missing = Vec::new();
        if self.fe_nodes.is_empty() || self.fe_nodes.iter().any(|n| n.trim().is_empty()) {
            missing.push("fe_nodes");
        }
        if self.database.trim().is_empty() {
            missing.push("database");
        }
        if self.table.trim().is_empty() {
            missing.push("table");
        }
        if self.user.trim().is_empty() {
            missing.push("user");
        }
        if self.label_prefix.trim().is_empty() {
            missing.push("label_prefix");
        }
        if !missing.is_empty() {
            return Err(StreamLoadError::Config(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }
        if self.timeout_secs == 0 {
            return Err(StreamLoadError::Config(
                "timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Copy safe to print: the password is masked.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.password.is_empty() {
            config.password = "******".to_string();
        }
        config
    }
}
