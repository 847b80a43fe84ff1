//! Shared constants used by the RPC poller and the launcher integration

pub mod constants;
