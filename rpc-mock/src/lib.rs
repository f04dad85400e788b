/// Wallet JSON-RPC Mock Server Library
///
/// This crate provides both a standalone binary and library components
/// for serving an in-memory wallet and governance contract over JSON-RPC.

pub mod handlers;
pub mod server;
pub mod types;

// Re-export commonly used types
pub use server::{create_router, run_server, seed_demo_proposals};
pub use types::*;
