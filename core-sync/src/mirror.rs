//! Field mapping between file store records and workspace entries.

use bridge_traits::storage::file_extension;
use bridge_traits::{EntryPatch, EntrySyncStatus, FileRecord, WorkspaceEntry};

/// Short file type of a record: extension first, MIME subtype otherwise
pub fn file_type_of(record: &FileRecord) -> Option<String> {
    record.extension().or_else(|| {
        record
            .mime_type
            .as_deref()
            .and_then(|mime| mime.rsplit_once('/'))
            .map(|(_, subtype)| subtype.to_lowercase())
    })
}

/// New workspace entry mirroring a file store record
pub fn entry_from_record(record: &FileRecord, external_url: Option<String>) -> WorkspaceEntry {
    let mut entry = WorkspaceEntry::new(
        record.id.clone(),
        record.name.clone(),
        record.path.clone(),
        record.modified_at,
    )
    .with_size(record.size);
    entry.file_type = file_type_of(record);
    entry.external_url = external_url;
    entry.checksum = record.checksum.clone();
    entry
}

/// Patch bringing an existing entry in line with a file store record.
///
/// Only file facts are touched; enrichment fields stay as they are.
pub fn patch_from_record(record: &FileRecord) -> EntryPatch {
    EntryPatch {
        file_name: Some(record.name.clone()),
        file_path: Some(record.path.clone()),
        file_size: Some(record.size),
        file_type: file_type_of(record),
        last_modified: Some(record.modified_at),
        sync_status: Some(EntrySyncStatus::Synced),
        checksum: record.checksum.clone(),
        ..Default::default()
    }
}

/// Replace the last segment of a `/`-separated path
pub fn rename_in_path(path: &str, new_name: &str) -> String {
    match path.rsplit_once('/') {
        Some((parent, _)) => format!("{}/{}", parent, new_name),
        None => new_name.to_string(),
    }
}

/// Last segment of a `/`-separated path
pub fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
