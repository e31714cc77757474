//! file-relay - archive files sent to a chat bot and serve them back over HTTP
//!
//! Files users send to the bot are forwarded into a private archive channel and
//! recorded under the platform's unique-file token. `GET /download/{file_id}`
//! resolves that token back into a fresh platform download URL and streams the
//! bytes to the requester.
//! - redb embedded database for file records
//! - a single chat session on its own runtime, reached through a request bridge
//! - streamed relaying, never buffering whole files

pub mod api;
pub mod bot;
pub mod bridge;
pub mod config;
pub mod inbound;
pub mod platform;
pub mod registry;
pub mod relay;
pub mod session;
pub mod storage;

use bridge::RequestBridge;
use registry::Registry;
use relay::DownloadRelay;

/// Shared application state
pub struct AppState {
    pub bridge: RequestBridge,
    pub registry: Registry,
    pub relay: DownloadRelay,
}
