//! Amazon Q Business MCP server
//!
//! Speaks stdio unless `--sse` is given. Logging always goes to stderr
//! since stdout may carry the protocol.

use clap::Parser;
use okta_q_backend::config::Config;
use okta_q_backend::mcp::{transport, AwsClientFactory, QBusinessMcpServer, TransportArgs};

#[derive(Debug, Parser)]
#[command(name = "qbusiness-mcp-server", version, about = "Amazon Q Business MCP server")]
struct Cli {
    #[command(flatten)]
    transport: TransportArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = Config::from_env();
    tracing::info!(
        region = %config.region_or_default(),
        application_configured = config.aws.q_application_id.is_some(),
        plugin_configured = config.mcp.plugin_id.is_some(),
        tvm_configured = config.mcp.tvm.is_some(),
        sse = cli.transport.sse,
        "Starting Amazon Q Business MCP server"
    );

    let server = QBusinessMcpServer::new(AwsClientFactory::new(config)?);
    transport::serve(server, &cli.transport).await?;

    tracing::info!("MCP server stopped");
    Ok(())
}
