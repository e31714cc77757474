//! The single long-lived chat session.
//!
//! A [`ChannelSession`] owns the platform connection and a dedicated
//! `channel-session` thread running a single-threaded tokio runtime. Update
//! dispatch and all work handed over by the request bridge run on that
//! runtime, interleaved cooperatively.
//!
//! Lifecycle: `Created -> Starting -> Ready -> Stopped`. `start` may be called
//! once; `stop` is idempotent and only the first call has an effect.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::platform::{BotIdentity, ChatPlatform, InboundMessage, PlatformError};
use crate::storage::models::{MediaKind, UNNAMED};

/// How long the update listener gets to wind down after shutdown is requested.
const LISTENER_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Created,
    Starting,
    Ready,
    Stopped,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session was already started")]
    AlreadyStarted,
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error("Failed to start session thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Session thread exited before becoming ready")]
    Crashed,
    #[error("Session was stopped during startup")]
    Stopped,
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Message carries no document, video or audio")]
    RejectedNotAFile,
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Archive message {0} is missing or has no media")]
    NotFound(i32),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Result of archiving an inbound attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardedFile {
    pub unique_id: String,
    pub archive_message_id: i32,
    pub display_name: String,
    pub kind: MediaKind,
    pub mime_type: Option<String>,
    pub byte_size: Option<u64>,
}

/// A short-lived direct-download location. Never cache it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDownload {
    pub url: String,
    pub content_type: Option<String>,
    pub file_name: String,
}

/// A unit of work executed on the session runtime.
pub type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Receives platform updates on the session runtime until the token fires.
pub type UpdateListener = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, ()> + Send>;

pub struct ChannelSession {
    platform: Arc<dyn ChatPlatform>,
    state: watch::Sender<SessionState>,
    jobs: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChannelSession {
    pub fn new(platform: Arc<dyn ChatPlatform>) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::Created);
        Arc::new(Self {
            platform,
            state,
            jobs: Mutex::new(None),
            shutdown: CancellationToken::new(),
            worker: Mutex::new(None),
        })
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Spawn the session thread, authenticate, and begin receiving updates.
    ///
    /// Resolves once the session is `Ready`, or with the reason it never got
    /// there (the session is then `Stopped`).
    pub async fn start(
        &self,
        listener: Option<UpdateListener>,
    ) -> Result<BotIdentity, SessionError> {
        let claimed = self.state.send_if_modified(|state| {
            if *state == SessionState::Created {
                *state = SessionState::Starting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(SessionError::AlreadyStarted);
        }

        info!("Starting channel session");

        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let platform = Arc::clone(&self.platform);
        let shutdown = self.shutdown.clone();

        let spawned = std::thread::Builder::new()
            .name("channel-session".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(SessionError::Spawn(e)));
                        return;
                    }
                };
                runtime.block_on(run_session(platform, job_rx, ready_tx, listener, shutdown));
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.state.send_replace(SessionState::Stopped);
                return Err(e.into());
            }
        };
        *lock(&self.worker) = Some(handle);

        let outcome = match ready_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(SessionError::Crashed),
        };

        match outcome {
            Ok(identity) => {
                *lock(&self.jobs) = Some(job_tx);
                let ready = self.state.send_if_modified(|state| {
                    if *state == SessionState::Starting {
                        *state = SessionState::Ready;
                        true
                    } else {
                        false
                    }
                });
                if !ready {
                    lock(&self.jobs).take();
                    return Err(SessionError::Stopped);
                }
                info!(bot = %identity.username, "Channel session ready");
                Ok(identity)
            }
            Err(e) => {
                error!(error = %e, "Channel session failed to start");
                self.state.send_replace(SessionState::Stopped);
                self.join_worker().await;
                Err(e)
            }
        }
    }

    /// Stop the session. Work still queued or in flight is dropped, which its
    /// waiting callers observe as the session no longer being ready.
    pub async fn stop(&self) {
        let previous = self.state.send_replace(SessionState::Stopped);
        if previous == SessionState::Stopped {
            debug!("Channel session already stopped");
            return;
        }

        info!("Stopping channel session");
        lock(&self.jobs).take();
        self.shutdown.cancel();
        self.join_worker().await;
        info!("Channel session stopped");
    }

    /// Queue a job on the session runtime. Returns `false` if the session is
    /// not accepting work.
    pub(crate) fn submit(&self, job: Job) -> bool {
        match lock(&self.jobs).as_ref() {
            Some(jobs) => jobs.send(job).is_ok(),
            None => false,
        }
    }

    async fn join_worker(&self) {
        let handle = lock(&self.worker).take();
        let Some(handle) = handle else {
            return;
        };
        match tokio::task::spawn_blocking(move || handle.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => error!("Channel session thread panicked"),
            Err(e) => error!(error = %e, "Failed to join channel session thread"),
        }
    }

    /// Forward an inbound file message into the archive channel.
    ///
    /// Messages without an accepted attachment are rejected before any
    /// platform call is made.
    pub async fn archive(&self, message: &InboundMessage) -> Result<ForwardedFile, ArchiveError> {
        let Some(original) = message.attachment.as_ref() else {
            return Err(ArchiveError::RejectedNotAFile);
        };

        let archived = self
            .platform
            .forward_to_archive(message.chat_id, message.message_id)
            .await?;

        let media = archived.media.ok_or_else(|| {
            PlatformError::Request(format!(
                "archived message {} carries no attachment",
                archived.message_id
            ))
        })?;

        let display_name = media
            .file_name
            .clone()
            .or_else(|| original.file_name.clone())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| UNNAMED.to_string());

        debug!(
            chat_id = message.chat_id,
            archive_message_id = archived.message_id,
            kind = media.kind.as_str(),
            "Archived inbound file"
        );

        Ok(ForwardedFile {
            unique_id: media.unique_id,
            archive_message_id: archived.message_id,
            display_name,
            kind: media.kind,
            mime_type: media.mime_type,
            byte_size: media.byte_size,
        })
    }

    /// Resolve an archived message into a fresh direct-download URL.
    pub async fn resolve_download_url(
        &self,
        archive_message_id: i32,
    ) -> Result<ResolvedDownload, ResolveError> {
        let media = self
            .platform
            .archived_media(archive_message_id)
            .await?
            .ok_or(ResolveError::NotFound(archive_message_id))?;

        let path = self.platform.file_path(&media.file_ref).await?;

        Ok(ResolvedDownload {
            url: self.platform.file_url(&path),
            content_type: media.mime_type,
            file_name: media.file_name.unwrap_or_else(|| UNNAMED.to_string()),
        })
    }
}

async fn run_session(
    platform: Arc<dyn ChatPlatform>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    ready: oneshot::Sender<Result<BotIdentity, SessionError>>,
    listener: Option<UpdateListener>,
    shutdown: CancellationToken,
) {
    let identity = match platform.connect().await {
        Ok(identity) => identity,
        Err(e) => {
            let _ = ready.send(Err(e.into()));
            return;
        }
    };
    if ready.send(Ok(identity)).is_err() {
        return;
    }

    let listener = listener.map(|listen| tokio::spawn(listen(shutdown.clone())));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => {
                    tokio::spawn(job());
                }
                None => break,
            },
        }
    }

    if let Some(listener) = listener {
        if tokio::time::timeout(LISTENER_GRACE, listener).await.is_err() {
            warn!("Update listener did not stop in time; dropping it");
        }
    }

    debug!("Session loop exited");
}
