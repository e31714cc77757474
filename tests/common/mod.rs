//! Shared helpers for integration tests: an in-memory chat platform and a
//! local file server standing in for the platform's download host.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;

use file_relay::bridge::RequestBridge;
use file_relay::platform::{
    ArchivedMessage, Attachment, BotIdentity, ChatPlatform, InboundMessage, PlatformError,
};
use file_relay::registry::Registry;
use file_relay::relay::DownloadRelay;
use file_relay::session::ChannelSession;
use file_relay::storage::models::MediaKind;
use file_relay::storage::Database;
use file_relay::AppState;

pub const TOKEN: &str = "100:test-token";

/// In-memory chat platform. Messages users send are registered with
/// [`FakePlatform::receive`]; forwarding copies them into an archive map.
pub struct FakePlatform {
    inbox: Mutex<HashMap<(i64, i32), Attachment>>,
    archive: Mutex<HashMap<i32, Attachment>>,
    next_archive_id: AtomicI32,
    file_server: String,
    pub forwards: AtomicUsize,
    pub lookups: AtomicUsize,
    pub fail_connect: AtomicBool,
    pub fail_forward: AtomicBool,
}

impl FakePlatform {
    pub fn new(file_server: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            inbox: Mutex::new(HashMap::new()),
            archive: Mutex::new(HashMap::new()),
            next_archive_id: AtomicI32::new(1000),
            file_server: file_server.into(),
            forwards: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
            fail_connect: AtomicBool::new(false),
            fail_forward: AtomicBool::new(false),
        })
    }

    /// Record a message a user sent and return its inbound form.
    pub fn receive(
        &self,
        chat_id: i64,
        message_id: i32,
        sender_id: u64,
        attachment: Option<Attachment>,
    ) -> InboundMessage {
        if let Some(ref attachment) = attachment {
            self.inbox
                .lock()
                .unwrap()
                .insert((chat_id, message_id), attachment.clone());
        }
        InboundMessage {
            chat_id,
            message_id,
            sender_id: Some(sender_id),
            attachment,
        }
    }

    pub fn remove_archived(&self, archive_message_id: i32) {
        self.archive.lock().unwrap().remove(&archive_message_id);
    }

    pub fn archived_count(&self) -> usize {
        self.archive.lock().unwrap().len()
    }
}

pub fn document(unique_id: &str, file_name: Option<&str>) -> Attachment {
    Attachment {
        kind: MediaKind::Document,
        unique_id: unique_id.to_string(),
        file_ref: format!("ref-{unique_id}"),
        file_name: file_name.map(|n| n.to_string()),
        mime_type: None,
        byte_size: Some(11),
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn connect(&self) -> Result<BotIdentity, PlatformError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(PlatformError::Auth("invalid token".to_string()));
        }
        Ok(BotIdentity {
            username: "relay_test_bot".to_string(),
        })
    }

    async fn forward_to_archive(
        &self,
        chat_id: i64,
        message_id: i32,
    ) -> Result<ArchivedMessage, PlatformError> {
        self.forwards.fetch_add(1, Ordering::SeqCst);
        if self.fail_forward.load(Ordering::SeqCst) {
            return Err(PlatformError::Request("forward failed".to_string()));
        }

        let attachment = self
            .inbox
            .lock()
            .unwrap()
            .get(&(chat_id, message_id))
            .cloned()
            .ok_or_else(|| PlatformError::Request("message to forward not found".to_string()))?;

        let archive_id = self.next_archive_id.fetch_add(1, Ordering::SeqCst);
        self.archive
            .lock()
            .unwrap()
            .insert(archive_id, attachment.clone());

        Ok(ArchivedMessage {
            message_id: archive_id,
            media: Some(attachment),
        })
    }

    async fn archived_media(
        &self,
        archive_message_id: i32,
    ) -> Result<Option<Attachment>, PlatformError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.archive.lock().unwrap().get(&archive_message_id).cloned())
    }

    async fn file_path(&self, file_ref: &str) -> Result<String, PlatformError> {
        Ok(format!("documents/{file_ref}"))
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.file_server, TOKEN, file_path)
    }
}

// ============================================================================
// Upstream file server
// ============================================================================

#[derive(Clone, Default)]
pub struct UpstreamFiles {
    files: Arc<Mutex<HashMap<String, (Option<&'static str>, Bytes)>>>,
}

impl UpstreamFiles {
    /// Serve `body` for the file reference `file_ref`.
    pub fn insert(&self, file_ref: &str, content_type: Option<&'static str>, body: &'static [u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(file_ref.to_string(), (content_type, Bytes::from_static(body)));
    }
}

async fn serve_file(
    State(files): State<UpstreamFiles>,
    Path((_bot, file_ref)): Path<(String, String)>,
) -> Response {
    let entry = files.files.lock().unwrap().get(&file_ref).cloned();
    match entry {
        Some((Some(content_type), body)) => {
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Some((None, body)) => Response::new(Body::from(body)),
        None => (StatusCode::NOT_FOUND, "no such file").into_response(),
    }
}

/// A body of `size` bytes produced in 256 KiB pieces, never held at once.
async fn serve_large(Path(size): Path<usize>) -> Response {
    const PIECE: usize = 256 * 1024;
    let pieces = (0..size.div_ceil(PIECE)).map(move |i| {
        let len = PIECE.min(size - i * PIECE);
        Ok::<_, std::io::Error>(Bytes::from(vec![b'x'; len]))
    });
    let body = Body::from_stream(futures::stream::iter(pieces));
    ([(header::CONTENT_TYPE, "application/octet-stream")], body).into_response()
}

async fn serve_redirect(Path(file_ref): Path<String>) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, format!("/file/bot{TOKEN}/documents/{file_ref}"))],
    )
        .into_response()
}

/// Start a local file server and return its base URL.
pub async fn spawn_upstream(files: UpstreamFiles) -> String {
    let app = Router::new()
        .route("/file/:bot/documents/:file_ref", get(serve_file))
        .route("/large/:size", get(serve_large))
        .route("/redirect/:file_ref", get(serve_redirect))
        .with_state(files);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

// ============================================================================
// Application wiring
// ============================================================================

pub struct TestApp {
    pub dir: tempfile::TempDir,
    pub platform: Arc<FakePlatform>,
    pub session: Arc<ChannelSession>,
    pub registry: Registry,
    pub state: Arc<AppState>,
}

/// Wire an application around a fake platform. The session is not started.
pub fn test_app(file_server: &str) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    let registry = Registry::new(db);

    let platform = FakePlatform::new(file_server);
    let session = ChannelSession::new(platform.clone());

    let state = Arc::new(AppState {
        bridge: RequestBridge::new(Arc::clone(&session), Duration::from_secs(5)),
        registry: registry.clone(),
        relay: DownloadRelay::new().unwrap(),
    });

    TestApp {
        dir,
        platform,
        session,
        registry,
        state,
    }
}
