//! Streams a resolved download from the platform's file server.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use reqwest::Client;
use thiserror::Error;

use crate::session::ResolvedDownload;

/// Largest chunk handed downstream.
pub const CHUNK_SIZE: usize = 1024 * 1024;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Upstream responded with status {status}")]
    Upstream { status: u16 },
    #[error("Upstream request failed: {0}")]
    Transport(reqwest::Error),
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        // Download URLs embed the bot token.
        RelayError::Transport(e.without_url())
    }
}

pub type ByteStream = BoxStream<'static, Result<Bytes, RelayError>>;

/// An upstream body ready to be forwarded. The stream is lazy and can be
/// consumed only once; dropping it releases the upstream connection.
pub struct RelayedDownload {
    pub content_type: String,
    pub content_length: Option<u64>,
    pub file_name: String,
    pub body: ByteStream,
}

#[derive(Clone)]
pub struct DownloadRelay {
    client: Client,
}

impl DownloadRelay {
    pub fn new() -> Result<Self, RelayError> {
        let client = Client::builder()
            .redirect(Policy::limited(MAX_REDIRECTS))
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }

    pub async fn relay(&self, resolved: &ResolvedDownload) -> Result<RelayedDownload, RelayError> {
        let resp = self.client.get(&resolved.url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RelayError::Upstream {
                status: status.as_u16(),
            });
        }

        let upstream_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let content_type = pick_content_type(
            upstream_type.as_deref(),
            resolved.content_type.as_deref(),
            &resolved.file_name,
        );

        Ok(RelayedDownload {
            content_type,
            content_length: resp.content_length(),
            file_name: resolved.file_name.clone(),
            body: bounded_chunks(resp.bytes_stream(), resolved.file_name.clone()).boxed(),
        })
    }
}

/// Upstream type unless it is missing or generic, then the type the platform
/// reported, then a guess from the file name.
pub fn pick_content_type(upstream: Option<&str>, reported: Option<&str>, file_name: &str) -> String {
    let specific = |ct: &&str| !ct.trim().is_empty() && !is_generic(ct);

    upstream
        .filter(specific)
        .or_else(|| reported.filter(specific))
        .map(|ct| ct.to_string())
        .or_else(|| mime_guess::from_path(file_name).first().map(|m| m.to_string()))
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
}

fn is_generic(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case(DEFAULT_CONTENT_TYPE))
        .unwrap_or(false)
}

/// Logs the outcome of a transfer when its stream goes away.
struct Transfer {
    file_name: String,
    bytes: u64,
    finished: bool,
}

impl Drop for Transfer {
    fn drop(&mut self) {
        if self.finished {
            tracing::debug!(file_name = %self.file_name, bytes = self.bytes, "Relay finished");
        } else {
            tracing::debug!(
                file_name = %self.file_name,
                bytes = self.bytes,
                "Relay stopped before the upstream body ended"
            );
        }
    }
}

struct Chunker<S> {
    upstream: Pin<Box<S>>,
    pending: Bytes,
    transfer: Transfer,
    done: bool,
}

/// Re-slice an upstream body so no item exceeds [`CHUNK_SIZE`]. At most one
/// upstream chunk is held at a time.
pub fn bounded_chunks<S, E>(
    upstream: S,
    file_name: String,
) -> impl Stream<Item = Result<Bytes, RelayError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<RelayError> + 'static,
{
    let state = Chunker {
        upstream: Box::pin(upstream),
        pending: Bytes::new(),
        transfer: Transfer {
            file_name,
            bytes: 0,
            finished: false,
        },
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if !state.pending.is_empty() {
                let len = state.pending.len().min(CHUNK_SIZE);
                let chunk = state.pending.split_to(len);
                state.transfer.bytes += len as u64;
                return Some((Ok(chunk), state));
            }
            if state.done {
                return None;
            }
            match state.upstream.next().await {
                Some(Ok(bytes)) => state.pending = bytes,
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(e.into()), state));
                }
                None => {
                    let mut transfer = state.transfer;
                    transfer.finished = true;
                    drop(transfer);
                    return None;
                }
            }
        }
    })
}
