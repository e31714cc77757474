//! Hands work from request handlers to the channel session.
//!
//! Request handlers run on the server's runtime; session operations must run
//! on the session's own runtime. [`RequestBridge::run_on_session`] queues the
//! operation together with a reply channel and waits on that channel under a
//! hard timeout.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::session::{ChannelSession, Job, ResolveError, ResolvedDownload};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Channel session is not ready")]
    SessionNotReady,
    #[error("Channel session did not answer within {0:?}")]
    Timeout(Duration),
    #[error("Session operation aborted: {0}")]
    Aborted(String),
}

#[derive(Clone)]
pub struct RequestBridge {
    session: Arc<ChannelSession>,
    timeout: Duration,
}

impl RequestBridge {
    pub fn new(session: Arc<ChannelSession>, timeout: Duration) -> Self {
        Self { session, timeout }
    }

    pub fn session(&self) -> &Arc<ChannelSession> {
        &self.session
    }

    /// Run `operation` on the session runtime and wait for its output.
    ///
    /// Fails with `SessionNotReady` without scheduling anything unless the
    /// session is `Ready`. On `Timeout` the operation keeps running on the
    /// session and its output is discarded.
    pub async fn run_on_session<T, F, Fut>(
        &self,
        operation: F,
        timeout: Duration,
    ) -> Result<T, BridgeError>
    where
        F: FnOnce(Arc<ChannelSession>) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if !self.session.is_ready() {
            return Err(BridgeError::SessionNotReady);
        }

        let (reply_tx, reply_rx) = oneshot::channel::<Result<T, BridgeError>>();
        let session = Arc::clone(&self.session);

        let job: Job = Box::new(move || {
            async move {
                let outcome = AssertUnwindSafe(async move { operation(session).await })
                    .catch_unwind()
                    .await
                    .map_err(|panic| BridgeError::Aborted(panic_message(panic)));
                // The caller may have timed out already.
                let _ = reply_tx.send(outcome);
            }
            .boxed()
        });

        if !self.session.submit(job) {
            return Err(BridgeError::SessionNotReady);
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(outcome)) => outcome,
            // Reply sender dropped: the session shut down with the job pending.
            Ok(Err(_)) => Err(BridgeError::SessionNotReady),
            Err(_) => {
                tracing::warn!(?timeout, "Timed out waiting on channel session");
                Err(BridgeError::Timeout(timeout))
            }
        }
    }

    /// Resolve a fresh download URL for an archived message.
    pub async fn resolve_download_url(
        &self,
        archive_message_id: i32,
    ) -> Result<Result<ResolvedDownload, ResolveError>, BridgeError> {
        self.run_on_session(
            move |session| async move { session.resolve_download_url(archive_message_id).await },
            self.timeout,
        )
        .await
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "operation panicked".to_string()
    }
}
