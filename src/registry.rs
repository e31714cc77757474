//! Maps archived files to the external identifiers handed to users.
//!
//! The identifier is the platform's unique-file token, so re-sending the same
//! file yields the same identifier and replaces the stored archive location.

use chrono::Utc;

use crate::session::ForwardedFile;
use crate::storage::models::FileRecord;
use crate::storage::{Database, DatabaseError};

#[derive(Clone)]
pub struct Registry {
    db: Database,
}

impl Registry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist the record for an archived file and return its file id.
    pub fn register(
        &self,
        forwarded: &ForwardedFile,
        uploaded_by: u64,
    ) -> Result<String, DatabaseError> {
        let now = Utc::now();
        let record = FileRecord {
            file_id: forwarded.unique_id.clone(),
            archive_message_id: forwarded.archive_message_id,
            display_name: forwarded.display_name.clone(),
            uploaded_by,
            uploaded_at: now,
            updated_at: now,
            media_kind: forwarded.kind,
            mime_type: forwarded.mime_type.clone(),
            byte_size: forwarded.byte_size,
        };

        if self.db.upsert_file(&record)? {
            tracing::debug!(file_id = %record.file_id, "Registered file");
        } else {
            tracing::info!(
                file_id = %record.file_id,
                archive_message_id = record.archive_message_id,
                "File re-submitted; archive entry replaced"
            );
        }

        Ok(record.file_id)
    }

    /// Look up a file record. `Ok(None)` for identifiers never registered.
    pub fn resolve_record(&self, file_id: &str) -> Result<Option<FileRecord>, DatabaseError> {
        self.db.get_file(file_id)
    }
}

/// Public download link for a file id.
pub fn download_link(base_url: &str, file_id: &str) -> String {
    format!(
        "{}/download/{}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(file_id)
    )
}
