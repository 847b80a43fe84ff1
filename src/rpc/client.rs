//! HTTP transport and the typed calls built on it

use std::sync::Mutex;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use super::error::RpcError;
use super::types::{
    AltSpeed, RpcRequest, RpcResponse, SessionGetArgs, Torrent, TorrentGetArgs, TorrentGetResult,
    TorrentProgress,
};
use crate::common::constants::rpc;

/// Connection parameters for [`TransmissionClient`]
#[derive(Debug, Clone)]
pub struct RpcSettings {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

pub struct TransmissionClient {
    http: reqwest::Client,
    settings: RpcSettings,
    /// Last CSRF token handed out by the daemon
    session_id: Mutex<Option<String>>,
}

impl TransmissionClient {
    pub fn new(settings: RpcSettings) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| RpcError::from_transport(e, &settings.url))?;

        Ok(Self {
            http,
            settings,
            session_id: Mutex::new(None),
        })
    }

    pub fn url(&self) -> &str {
        &self.settings.url
    }

    /// All torrents with their activity status
    pub async fn torrent_list(&self) -> Result<Vec<Torrent>, RpcError> {
        let args = TorrentGetArgs {
            fields: rpc::FIELDS_LIST,
            ids: None,
        };
        let result: TorrentGetResult<Torrent> = self.call("torrent-get", args).await?;
        Ok(result.torrents)
    }

    /// Byte counters for the given torrents
    ///
    /// An empty `ids` slice returns immediately: Transmission treats a missing
    /// id list as "every torrent".
    pub async fn torrent_progress(&self, ids: &[i64]) -> Result<Vec<TorrentProgress>, RpcError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let args = TorrentGetArgs {
            fields: rpc::FIELDS_PROGRESS,
            ids: Some(ids),
        };
        let result: TorrentGetResult<TorrentProgress> = self.call("torrent-get", args).await?;
        Ok(result.torrents)
    }

    pub async fn alt_speed_enabled(&self) -> Result<bool, RpcError> {
        let args = SessionGetArgs {
            fields: &[rpc::FIELD_ALT_SPEED],
        };
        let result: AltSpeed = self.call("session-get", args).await?;
        Ok(result.enabled)
    }

    pub async fn set_alt_speed_enabled(&self, enabled: bool) -> Result<(), RpcError> {
        let _: serde_json::Value = self.call("session-set", AltSpeed { enabled }).await?;
        Ok(())
    }

    fn session_id(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn store_session_id(&self, id: String) {
        *self
            .session_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(id);
    }

    async fn call<A, R>(&self, method: &str, arguments: A) -> Result<R, RpcError>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let body = serde_json::to_vec(&RpcRequest { method, arguments }).map_err(RpcError::Encode)?;
        let url = &self.settings.url;

        // One retry: the first 409 only hands us a fresh session id
        let mut handshake_done = false;
        loop {
            let mut request = self
                .http
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone());
            if let Some(user) = &self.settings.user {
                request = request.basic_auth(user, self.settings.password.as_ref());
            }
            if let Some(id) = self.session_id() {
                request = request.header(rpc::SESSION_ID_HEADER, id);
            }

            trace!(method, "Sending RPC request");
            let response = request
                .send()
                .await
                .map_err(|e| RpcError::from_transport(e, url))?;

            match response.status() {
                StatusCode::CONFLICT => {
                    let new_id = response
                        .headers()
                        .get(rpc::SESSION_ID_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    match new_id {
                        Some(id) if !handshake_done => {
                            debug!("Received new Transmission session id");
                            self.store_session_id(id);
                            handshake_done = true;
                            continue;
                        }
                        Some(_) => return Err(RpcError::SessionHandshake),
                        None => return Err(RpcError::Http(StatusCode::CONFLICT)),
                    }
                }
                StatusCode::UNAUTHORIZED => return Err(RpcError::Unauthorized),
                status if !status.is_success() => return Err(RpcError::Http(status)),
                _ => {}
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| RpcError::from_transport(e, url))?;
            let parsed: RpcResponse<R> = serde_json::from_slice(&bytes).map_err(RpcError::Decode)?;

            if parsed.result != rpc::RESULT_SUCCESS {
                return Err(RpcError::Rpc(parsed.result));
            }
            return parsed
                .arguments
                .ok_or_else(|| RpcError::MissingArguments(method.to_string()));
        }
    }
}
