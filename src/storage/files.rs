use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::models::FileRecord;
use super::tables::*;

impl Database {
    /// Insert or replace a file record.
    ///
    /// When a record already exists under the same `file_id`, its
    /// `uploaded_at` is kept and every other field is overwritten. Returns
    /// `true` when the record was newly created.
    pub fn upsert_file(&self, file: &FileRecord) -> Result<bool, DatabaseError> {
        debug_assert!(!file.file_id.is_empty(), "file id must not be empty");

        let write_txn = self.begin_write()?;
        let created = {
            let mut table = write_txn.open_table(FILES)?;

            let existing: Option<FileRecord> = match table.get(file.file_id.as_str())? {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            };

            let mut record = file.clone();
            if let Some(ref previous) = existing {
                record.uploaded_at = previous.uploaded_at;
            }

            let data = rmp_serde::to_vec_named(&record)?;
            table.insert(record.file_id.as_str(), data.as_slice())?;
            existing.is_none()
        };
        write_txn.commit()?;
        Ok(created)
    }

    /// Get a file record by its file id
    pub fn get_file(&self, file_id: &str) -> Result<Option<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        match table.get(file_id)? {
            Some(data) => {
                let file: FileRecord = rmp_serde::from_slice(data.value())?;
                Ok(Some(file))
            }
            None => Ok(None),
        }
    }
}
