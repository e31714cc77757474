//! Handling of files users send to the bot.

use std::sync::Arc;

use tracing::{error, warn};

use crate::platform::InboundMessage;
use crate::registry::{download_link, Registry};
use crate::session::{ArchiveError, ChannelSession};

const REGISTRATION_FAILED: &str =
    "Your file was archived but its download link could not be created. Please send it again later.";

/// Outcome of handling one inbound message, rendered as the bot's reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Saved {
        file_id: String,
        display_name: String,
        link: String,
    },
    Rejected,
    Failed(&'static str),
}

impl Reply {
    pub fn text(&self) -> String {
        match self {
            Reply::Saved {
                display_name, link, ..
            } => format!("✅ File saved to the channel!\n\n📄 {display_name}\n📥 Download link:\n{link}"),
            Reply::Rejected => "❌ Please send a document, video or audio file.".to_string(),
            Reply::Failed(reason) => format!("⚠️ {reason}"),
        }
    }
}

pub struct InboundHandler {
    session: Arc<ChannelSession>,
    registry: Registry,
    public_base_url: String,
}

impl InboundHandler {
    pub fn new(session: Arc<ChannelSession>, registry: Registry, public_base_url: String) -> Self {
        Self {
            session,
            registry,
            public_base_url,
        }
    }

    /// Archive and register a message's attachment. Every failure is turned
    /// into a reply for the user.
    pub async fn handle(&self, message: &InboundMessage) -> Reply {
        let forwarded = match self.session.archive(message).await {
            Ok(forwarded) => forwarded,
            Err(ArchiveError::RejectedNotAFile) => return Reply::Rejected,
            Err(ArchiveError::Platform(e)) => {
                warn!(
                    chat_id = message.chat_id,
                    message_id = message.message_id,
                    error = %e,
                    "Failed to archive inbound file"
                );
                return Reply::Failed(
                    "Could not save your file to the archive channel. Please send it again later.",
                );
            }
        };

        // The commit blocks; keep it off the session runtime.
        let registered = {
            let registry = self.registry.clone();
            let forwarded = forwarded.clone();
            let uploader = message.uploader();
            tokio::task::spawn_blocking(move || registry.register(&forwarded, uploader)).await
        };

        match registered {
            Ok(Ok(file_id)) => Reply::Saved {
                link: download_link(&self.public_base_url, &file_id),
                display_name: forwarded.display_name,
                file_id,
            },
            Ok(Err(e)) => {
                error!(
                    archive_message_id = forwarded.archive_message_id,
                    unique_id = %forwarded.unique_id,
                    error = %e,
                    "File archived but registration failed"
                );
                Reply::Failed(REGISTRATION_FAILED)
            }
            Err(e) => {
                error!(
                    archive_message_id = forwarded.archive_message_id,
                    error = %e,
                    "Registration task did not complete"
                );
                Reply::Failed(REGISTRATION_FAILED)
            }
        }
    }
}
