//! MySQL-over-WebSocket tunnel
//!
//! Carries a raw TCP session (typically a MySQL client connection) across a
//! WebSocket so it can cross networks that only allow HTTP(S). The local
//! bridge accepts TCP and dials out over WebSocket; the remote bridge accepts
//! WebSocket upgrades and dials the real TCP server. Both run the same
//! [`Relay`] with the roles swapped.

pub mod client_ip;
pub mod config;
mod dial;
pub mod frame;
pub mod local;
pub mod logging;
pub mod relay;
pub mod remote;
pub mod stream;
pub mod tls;

#[cfg(test)]
mod test_support;

// Re-export commonly used types and functions
pub use config::{LocalConfig, RemoteConfig, TlsConfig};
pub use frame::FrameWriter;
pub use relay::{BUFFER_SIZE, Direction, Relay, Termination};
pub use stream::InboundStream;
