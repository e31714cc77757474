use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder display name for attachments that carry no filename.
pub const UNNAMED: &str = "unnamed";

/// Attachment kinds accepted for archiving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Document,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
            MediaKind::Video => "video",
        }
    }
}

/// One archived file, keyed by the platform's unique-file token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: String,
    /// Message id of the forwarded copy inside the archive channel.
    pub archive_message_id: i32,
    pub display_name: String,
    pub uploaded_by: u64,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub media_kind: MediaKind,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub byte_size: Option<u64>,
}
