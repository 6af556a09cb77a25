//! PostgreSQL MCP Server - Main entry point.
//!
//! Serves the tables of a PostgreSQL schema as MCP resources and a read-only
//! `query` tool over stdio.

use postgres_mcp_server::config::{self, Config, EnvFileStatus, EnvSource};
use postgres_mcp_server::db::create_pool;
use postgres_mcp_server::debug_dump::{self, DebugDump};
use postgres_mcp_server::mcp::{PostgresService, ResourceAddress};
use postgres_mcp_server::transport::{StdioTransport, Transport};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Stdout carries the MCP stream, so logs go to stderr.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The env file must be applied before clap reads MCP_* defaults
    let env_file = config::load_env_file(&EnvSource::from_process());

    let cli = Config::parse_args();
    init_tracing(&cli);

    match &env_file {
        EnvFileStatus::Loaded(path) => info!(path = %path.display(), "Loaded environment file"),
        EnvFileStatus::Missing(path) => {
            info!(path = %path.display(), "No environment file found")
        }
        EnvFileStatus::Failed(path, reason) => {
            warn!(path = %path.display(), error = %reason, "Could not load environment file")
        }
    }

    let env = EnvSource::from_process();
    let (tier, db_config) = match config::resolve_with_tier(cli.database_url.as_deref(), &env) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let resource_base = match ResourceAddress::from_config(&db_config) {
        Ok(base) => base,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    info!(
        tier = %tier,
        host = ?db_config.host,
        schema = %db_config.schema,
        resource_base = %resource_base,
        "Starting PostgreSQL MCP Server v{}",
        env!("CARGO_PKG_VERSION")
    );

    debug_dump::write_if_enabled(&env, || {
        DebugDump::new(
            tier,
            &db_config,
            &resource_base,
            cli.database_url.as_deref(),
            &env,
        )
    });

    let pool = create_pool(&db_config)?;
    let service = PostgresService::new(pool, db_config.schema.clone(), resource_base);
    let transport = StdioTransport::new(service);

    info!(transport = transport.name(), "Serving");
    if let Err(e) = transport.run().await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }

    info!("Server shutdown complete");
    Ok(())
}
