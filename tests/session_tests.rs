mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use file_relay::session::{ArchiveError, ChannelSession, ResolveError, SessionError, SessionState};
use file_relay::storage::models::UNNAMED;

use common::{document, FakePlatform};

#[tokio::test]
async fn test_lifecycle_transitions() {
    let platform = FakePlatform::new("http://files.invalid");
    let session = ChannelSession::new(platform);
    assert_eq!(session.state(), SessionState::Created);
    assert!(!session.is_ready());

    let identity = session.start(None).await.unwrap();
    assert_eq!(identity.username, "relay_test_bot");
    assert_eq!(session.state(), SessionState::Ready);

    session.stop().await;
    assert_eq!(session.state(), SessionState::Stopped);

    // Second stop is a no-op.
    session.stop().await;
    assert_eq!(session.state(), SessionState::Stopped);
}

#[tokio::test]
async fn test_start_only_once() {
    let session = ChannelSession::new(FakePlatform::new("http://files.invalid"));
    session.start(None).await.unwrap();

    assert!(matches!(
        session.start(None).await,
        Err(SessionError::AlreadyStarted)
    ));
    assert!(session.is_ready());

    session.stop().await;
}

#[tokio::test]
async fn test_failed_connect_leaves_session_stopped() {
    let platform = FakePlatform::new("http://files.invalid");
    platform.fail_connect.store(true, Ordering::SeqCst);
    let session = ChannelSession::new(platform);

    let result = session.start(None).await;
    assert!(matches!(result, Err(SessionError::Platform(_))));
    assert_eq!(session.state(), SessionState::Stopped);
}

#[tokio::test]
async fn test_stop_before_start() {
    let session = ChannelSession::new(FakePlatform::new("http://files.invalid"));
    session.stop().await;
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(matches!(
        session.start(None).await,
        Err(SessionError::AlreadyStarted)
    ));
}

#[tokio::test]
async fn test_listener_runs_until_shutdown() {
    let session = ChannelSession::new(FakePlatform::new("http://files.invalid"));
    let (stopped_tx, stopped_rx) = tokio::sync::oneshot::channel();

    session
        .start(Some(Box::new(move |shutdown| {
            Box::pin(async move {
                shutdown.cancelled().await;
                let _ = stopped_tx.send(());
            })
        })))
        .await
        .unwrap();

    session.stop().await;
    tokio::time::timeout(Duration::from_secs(5), stopped_rx)
        .await
        .expect("listener should observe shutdown")
        .unwrap();
}

#[tokio::test]
async fn test_archive_rejects_text_only_message() {
    let platform = FakePlatform::new("http://files.invalid");
    let session = ChannelSession::new(platform.clone());

    let text_only = platform.receive(42, 1, 42, None);
    let result = session.archive(&text_only).await;

    assert!(matches!(result, Err(ArchiveError::RejectedNotAFile)));
    assert_eq!(platform.forwards.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_archive_forwards_attachment() {
    let platform = FakePlatform::new("http://files.invalid");
    let session = ChannelSession::new(platform.clone());

    let message = platform.receive(42, 5, 42, Some(document("tok-1", Some("movie.mkv"))));
    let forwarded = session.archive(&message).await.unwrap();

    assert_eq!(forwarded.unique_id, "tok-1");
    assert_eq!(forwarded.display_name, "movie.mkv");
    assert_eq!(platform.archived_count(), 1);
}

#[tokio::test]
async fn test_archive_defaults_display_name() {
    let platform = FakePlatform::new("http://files.invalid");
    let session = ChannelSession::new(platform.clone());

    let message = platform.receive(42, 6, 42, Some(document("tok-2", None)));
    let forwarded = session.archive(&message).await.unwrap();
    assert_eq!(forwarded.display_name, UNNAMED);
}

#[tokio::test]
async fn test_archive_platform_failure_is_distinct() {
    let platform = FakePlatform::new("http://files.invalid");
    platform.fail_forward.store(true, Ordering::SeqCst);
    let session = ChannelSession::new(platform.clone());

    let message = platform.receive(42, 7, 42, Some(document("tok-3", Some("a.pdf"))));
    assert!(matches!(
        session.archive(&message).await,
        Err(ArchiveError::Platform(_))
    ));
}

#[tokio::test]
async fn test_resolve_download_url() {
    let platform = FakePlatform::new("http://files.invalid");
    let session = ChannelSession::new(platform.clone());

    let message = platform.receive(42, 8, 42, Some(document("tok-4", Some("movie.mkv"))));
    let forwarded = session.archive(&message).await.unwrap();

    let resolved = session
        .resolve_download_url(forwarded.archive_message_id)
        .await
        .unwrap();
    assert_eq!(
        resolved.url,
        "http://files.invalid/file/bot100:test-token/documents/ref-tok-4"
    );
    assert_eq!(resolved.file_name, "movie.mkv");
}

#[tokio::test]
async fn test_resolve_missing_archive_entry_is_not_found() {
    let platform = FakePlatform::new("http://files.invalid");
    let session = ChannelSession::new(platform.clone());

    let message = platform.receive(42, 9, 42, Some(document("tok-5", Some("gone.bin"))));
    let forwarded = session.archive(&message).await.unwrap();
    platform.remove_archived(forwarded.archive_message_id);

    assert!(matches!(
        session.resolve_download_url(forwarded.archive_message_id).await,
        Err(ResolveError::NotFound(id)) if id == forwarded.archive_message_id
    ));
}
