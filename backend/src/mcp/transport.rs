//! Transports the MCP servers are exposed on
//!
//! stdio by default. With `--sse` the server speaks the streamable HTTP
//! transport (JSON-RPC over POST, answers as server-sent event streams) on
//! [`MCP_PATH`].

use crate::server::shutdown_signal;
use clap::Args;
use rmcp::transport::stdio;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use rmcp::{ServerHandler, ServiceExt};
use std::net::SocketAddr;

/// Path the HTTP transport is mounted on
pub const MCP_PATH: &str = "/mcp";
/// Port of the HTTP transport unless `--port` says otherwise
pub const DEFAULT_PORT: u16 = 8888;

/// Transport options shared by the MCP server binaries
#[derive(Debug, Clone, Args)]
pub struct TransportArgs {
    /// Serve over HTTP with server-sent events instead of stdio
    #[arg(long)]
    pub sse: bool,

    /// Port of the HTTP transport
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address the HTTP transport binds to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
}

impl TransportArgs {
    /// Socket address of the HTTP transport
    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

/// Router serving `server` over the streamable HTTP transport
///
/// Every MCP session gets its own clone of `server`.
pub fn http_router<S>(server: S) -> axum::Router
where
    S: ServerHandler + Clone + Send + Sync + 'static,
{
    let service = StreamableHttpService::new(
        move || Ok(server.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );
    axum::Router::new().nest_service(MCP_PATH, service)
}

/// Run `server` on the selected transport until the client or a signal stops it
pub async fn serve<S>(server: S, transport: &TransportArgs) -> anyhow::Result<()>
where
    S: ServerHandler + Clone + Send + Sync + 'static,
{
    if !transport.sse {
        tracing::info!("Serving MCP over stdio");
        let service = server.serve(stdio()).await?;
        service.waiting().await?;
        return Ok(());
    }

    let addr = transport.addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, path = MCP_PATH, "Serving MCP over HTTP");
    axum::serve(listener, http_router(server))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        transport: TransportArgs,
    }

    #[test]
    fn test_stdio_is_the_default() {
        let cli = Cli::try_parse_from(["server"]).unwrap();
        assert!(!cli.transport.sse);
        assert_eq!(cli.transport.port, DEFAULT_PORT);
        assert_eq!(cli.transport.addr().unwrap().to_string(), "127.0.0.1:8888");
    }

    #[test]
    fn test_sse_with_port() {
        let cli = Cli::try_parse_from(["server", "--sse", "--port", "9001"]).unwrap();
        assert!(cli.transport.sse);
        assert_eq!(cli.transport.addr().unwrap().port(), 9001);
        assert!(Cli::try_parse_from(["server", "--port", "not-a-port"]).is_err());
    }
}
