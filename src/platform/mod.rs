//! Chat-platform boundary.
//!
//! The channel session talks to the platform only through [`ChatPlatform`],
//! so the archive and resolve logic can run against Telegram in production
//! and against an in-memory platform in tests.

mod telegram;
pub mod types;

pub use telegram::TelegramPlatform;
pub use types::{ArchivedMessage, Attachment, BotIdentity, InboundMessage};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Archive channel {channel_id} is not accessible: {reason}")]
    ArchiveChannel { channel_id: i64, reason: String },
    #[error("Platform request failed: {0}")]
    Request(String),
}

/// Primitive operations the channel session needs from the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Authenticate and confirm the archive channel is reachable.
    async fn connect(&self) -> Result<BotIdentity, PlatformError>;

    /// Forward a message from `chat_id` into the archive channel.
    async fn forward_to_archive(
        &self,
        chat_id: i64,
        message_id: i32,
    ) -> Result<ArchivedMessage, PlatformError>;

    /// Look up the attachment of an archived message.
    ///
    /// `Ok(None)` when the message is gone or carries no attachment.
    async fn archived_media(
        &self,
        archive_message_id: i32,
    ) -> Result<Option<Attachment>, PlatformError>;

    /// Ask the platform for the download path of a file reference.
    async fn file_path(&self, file_ref: &str) -> Result<String, PlatformError>;

    /// Compose the direct-download URL for a path returned by [`file_path`](Self::file_path).
    fn file_url(&self, file_path: &str) -> String;
}
