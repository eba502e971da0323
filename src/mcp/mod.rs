//! Model Context Protocol (MCP) server handling and JSON-RPC implementations
//!
//! Provides the envelope codec, session lifecycle, and the dispatcher that routes
//! negotiated calls into the tool registry.

pub mod codec;
pub mod rpc;
pub mod server;
pub mod session;
