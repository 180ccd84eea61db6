//! Privileged user management over a local Unix socket.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::AdminClient;
pub use protocol::{AdminRequest, AdminResponse};
pub use server::AdminServer;
