mod download;
mod health;

use crate::api::response::ApiError;
use crate::bridge::BridgeError;
use crate::relay::RelayError;
use crate::session::ResolveError;

pub use download::{content_disposition, download};
pub use health::{health, index};

/// Map a bridge failure to an ApiError
fn bridge_error(e: BridgeError) -> ApiError {
    match e {
        BridgeError::SessionNotReady => {
            ApiError::unavailable("Chat session is not ready, retry shortly")
        }
        BridgeError::Timeout(_) => {
            ApiError::gateway_timeout("Timed out resolving the file with the chat platform")
        }
        BridgeError::Aborted(reason) => ApiError::internal(reason),
    }
}

/// Map a resolve failure to an ApiError
fn resolve_error(e: ResolveError) -> ApiError {
    match e {
        ResolveError::NotFound(_) => ApiError::not_found("Archived file is no longer available"),
        ResolveError::Platform(e) => ApiError::bad_gateway(e.to_string()),
    }
}

/// Map a relay failure to an ApiError
fn relay_error(e: RelayError) -> ApiError {
    match e {
        RelayError::Upstream { status } => {
            ApiError::bad_gateway(format!("File server responded with status {status}"))
        }
        RelayError::Transport(e) => ApiError::bad_gateway(e.to_string()),
    }
}
