//! Okta + Amazon Q Business backend library
//!
//! Okta OAuth/SAML/API clients, Q Business and Kendra clients signed with
//! SigV4, a chat session, the MCP tool servers and the local callback server.
//! The binaries in `src/bin/` and the CLI crate at the repository root use it.

pub mod api;
pub mod aws;
pub mod chat;
pub mod config;
pub mod error;
pub mod mcp;
pub mod okta;
pub mod server;
/// Token file and callback-server state
pub mod state;
