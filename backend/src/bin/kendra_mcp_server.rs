//! Amazon Kendra MCP server
//!
//! Speaks stdio unless `--sse` is given. Logging always goes to stderr
//! since stdout may carry the protocol.

use clap::Parser;
use okta_q_backend::config::Config;
use okta_q_backend::mcp::{transport, AwsClientFactory, KendraMcpServer, TransportArgs};

#[derive(Debug, Parser)]
#[command(name = "kendra-mcp-server", version, about = "Amazon Kendra MCP server")]
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
        default_index = ?config.aws.kendra_index_id,
        sse = cli.transport.sse,
        "Starting Amazon Kendra MCP server"
    );

    let server = KendraMcpServer::new(AwsClientFactory::new(config)?);
    transport::serve(server, &cli.transport).await?;

    tracing::info!("MCP server stopped");
    Ok(())
}
