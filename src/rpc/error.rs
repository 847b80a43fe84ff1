//! Typed RPC failures
//!
//! The poller needs to tell a lost daemon apart from a daemon that answered with an
//! error, so transport failures are classified here instead of being folded into anyhow.

use std::error::Error as StdError;
use std::io;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("connection refused by {url}")]
    ConnectionRefused { url: String },

    #[error("connection to daemon lost: {0}")]
    Disconnected(#[source] reqwest::Error),

    #[error("daemon rejected the RPC credentials")]
    Unauthorized,

    #[error("unexpected HTTP status {0}")]
    Http(StatusCode),

    #[error("daemon kept rejecting the session id")]
    SessionHandshake,

    #[error("RPC call failed: {0}")]
    Rpc(String),

    #[error("RPC response for '{0}' has no arguments")]
    MissingArguments(String),

    #[error("failed to encode RPC request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode RPC response: {0}")]
    Decode(#[source] serde_json::Error),
}

impl RpcError {
    /// Classify a reqwest failure that happened while talking to `url`
    pub fn from_transport(err: reqwest::Error, url: &str) -> Self {
        if err.is_connect() && is_connection_refused(&err) {
            RpcError::ConnectionRefused {
                url: url.to_string(),
            }
        } else {
            RpcError::Disconnected(err)
        }
    }

    /// True when the daemon is unreachable rather than misbehaving
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            RpcError::ConnectionRefused { .. } | RpcError::Disconnected(_)
        )
    }

    pub fn is_connection_refused(&self) -> bool {
        matches!(self, RpcError::ConnectionRefused { .. })
    }
}

/// Walk the source chain looking for an `ECONNREFUSED` from the socket layer
fn is_connection_refused(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>()
            && io_err.kind() == io::ErrorKind::ConnectionRefused
        {
            return true;
        }
        current = e.source();
    }
    false
}
