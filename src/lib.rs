//! Guild Relay - MCP adapter for a Discord-style chat platform
//!
//! This library exposes the relay's modules for integration testing
//! and for embedding the tools in another MCP host.

pub mod attachments;
pub mod config;
pub mod error;
pub mod logging;
pub mod mcp;
pub mod platform;
pub mod retry;
