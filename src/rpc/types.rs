//! Wire types for the subset of the Transmission RPC protocol in use

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(super) struct RpcRequest<'a, A> {
    pub method: &'a str,
    pub arguments: A,
}

#[derive(Debug, Deserialize)]
pub(super) struct RpcResponse<A> {
    pub result: String,
    pub arguments: Option<A>,
}

#[derive(Debug, Serialize)]
pub(super) struct TorrentGetArgs<'a> {
    pub fields: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<&'a [i64]>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TorrentGetResult<T> {
    pub torrents: Vec<T>,
}

#[derive(Debug, Serialize)]
pub(super) struct SessionGetArgs<'a> {
    pub fields: &'a [&'a str],
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct AltSpeed {
    #[serde(rename = "alt-speed-enabled")]
    pub enabled: bool,
}

/// Torrent activity as reported by RPC version 14 and later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "i64")]
pub enum TorrentStatus {
    Stopped,
    CheckWait,
    Checking,
    DownloadWait,
    Downloading,
    SeedWait,
    Seeding,
    Unknown(i64),
}

impl From<i64> for TorrentStatus {
    fn from(code: i64) -> Self {
        match code {
            0 => TorrentStatus::Stopped,
            1 => TorrentStatus::CheckWait,
            2 => TorrentStatus::Checking,
            3 => TorrentStatus::DownloadWait,
            4 => TorrentStatus::Downloading,
            5 => TorrentStatus::SeedWait,
            6 => TorrentStatus::Seeding,
            other => TorrentStatus::Unknown(other),
        }
    }
}

/// Entry of the torrent list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Torrent {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub status: TorrentStatus,
}

/// Byte counters of a single torrent
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TorrentProgress {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub size_when_done: u64,
    pub left_until_done: u64,
}
