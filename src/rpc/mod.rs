//! Transmission RPC client
//!
//! Talks JSON over HTTP to the daemon's `/transmission/rpc` endpoint, including the
//! `X-Transmission-Session-Id` CSRF handshake.

mod client;
mod error;
mod types;

pub use client::{RpcSettings, TransmissionClient};
pub use error::RpcError;
pub use types::{Torrent, TorrentProgress, TorrentStatus};
