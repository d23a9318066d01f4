//! MCP surface: the server and the tools it exposes.

pub mod server;
pub mod tools;

pub use server::{RelayMcpServer, StartupError, SERVER_NAME};
pub use tools::ToolContext;
