use crate::storage::models::MediaKind;

/// An attachment as reported by the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub kind: MediaKind,
    /// Stable token identifying the underlying bytes; identical across re-uploads.
    pub unique_id: String,
    /// Platform handle used to request a download path.
    pub file_ref: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub byte_size: Option<u64>,
}

/// A message received from a user.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub message_id: i32,
    pub sender_id: Option<u64>,
    pub attachment: Option<Attachment>,
}

impl InboundMessage {
    /// The submitting user, falling back to the chat id of a private chat.
    pub fn uploader(&self) -> u64 {
        self.sender_id
            .or_else(|| u64::try_from(self.chat_id).ok())
            .unwrap_or_default()
    }
}

/// The forwarded copy of a message inside the archive channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedMessage {
    pub message_id: i32,
    pub media: Option<Attachment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BotIdentity {
    pub username: String,
}
