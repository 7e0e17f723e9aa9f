//! IPC module for renderer and tooling communication

mod protocol;
mod server;

pub use server::Server;
