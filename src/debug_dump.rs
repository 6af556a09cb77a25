//! Startup diagnostics file.
//!
//! When `POSTGRES_MCP_DEBUG` is set to `1` or `true`, the resolved startup
//! state is written as JSON to `postgres-mcp-debug.json` in the working
//! directory. Secrets are redacted before anything is serialized.

use crate::config::{ConfigTier, DatabaseConfig, EnvSource, env_vars, redact_url};
use crate::error::{DbError, DbResult};
use crate::mcp::ResourceAddress;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DUMP_FILE_NAME: &str = "postgres-mcp-debug.json";

const REDACTED: &str = "***";

/// `DatabaseConfig` with every secret replaced.
#[derive(Debug, Serialize)]
pub struct RedactedConfig {
    pub connection_string: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<&'static str>,
    pub ssl: Option<bool>,
    pub schema: String,
}

impl From<&DatabaseConfig> for RedactedConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            connection_string: config.redacted_connection_string(),
            host: config.host.clone(),
            port: config.port,
            database: config.database.clone(),
            user: config.user.clone(),
            password: config.password.as_ref().map(|_| REDACTED),
            ssl: config.ssl,
            schema: config.schema.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DebugDump {
    pub timestamp: String,
    pub tier: String,
    pub config: RedactedConfig,
    pub resource_base: String,
    pub cli_url: Option<String>,
    /// Names of the recognized environment variables that were set
    pub env_keys: Vec<&'static str>,
}

impl DebugDump {
    pub fn new(
        tier: ConfigTier,
        config: &DatabaseConfig,
        resource_base: &ResourceAddress,
        cli_url: Option<&str>,
        env: &EnvSource,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            tier: tier.to_string(),
            config: config.into(),
            resource_base: resource_base.to_string(),
            cli_url: cli_url.map(redact_url),
            env_keys: env.recognized_keys(),
        }
    }
}

/// Whether the dump was requested.
pub fn is_enabled(env: &EnvSource) -> bool {
    env.get(env_vars::DEBUG_DUMP)
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Where the dump goes: `$PWD`, else the current directory.
pub fn dump_path(env: &EnvSource) -> PathBuf {
    PathBuf::from(env.get(env_vars::PWD).unwrap_or(".")).join(DUMP_FILE_NAME)
}

/// Serialize `dump` to `path`.
pub fn write(path: &Path, dump: &DebugDump) -> DbResult<()> {
    let json = serde_json::to_string_pretty(dump)
        .map_err(|e| DbError::internal(format!("Failed to serialize debug dump: {}", e)))?;
    std::fs::write(path, json).map_err(|e| {
        DbError::internal(format!(
            "Failed to write debug dump to {}: {}",
            path.display(),
            e
        ))
    })
}

/// Write the dump if enabled. Failures are logged and otherwise ignored.
pub fn write_if_enabled(env: &EnvSource, dump: impl FnOnce() -> DebugDump) {
    if !is_enabled(env) {
        return;
    }
    let path = dump_path(env);
    match write(&path, &dump()) {
        Ok(()) => info!(path = %path.display(), "Wrote debug dump"),
        Err(e) => warn!(error = %e, "Could not write debug dump"),
    }
}
