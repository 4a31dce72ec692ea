//! Which workspace entries may be sent to OCR.

use bridge_traits::storage::file_extension;
use bridge_traits::WorkspaceEntry;

use crate::config::OcrConfig;

/// Why an entry was not scheduled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ineligible {
    UnsupportedType(Option<String>),
    TooLarge { size: u64, limit: u64 },
    AlreadyAnalyzed,
    Tombstoned,
}

impl std::fmt::Display for Ineligible {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ineligible::UnsupportedType(Some(t)) => write!(f, "unsupported type {}", t),
            Ineligible::UnsupportedType(None) => write!(f, "unknown type"),
            Ineligible::TooLarge { size, limit } => {
                write!(f, "{} bytes exceeds limit of {}", size, limit)
            }
            Ineligible::AlreadyAnalyzed => write!(f, "already analyzed"),
            Ineligible::Tombstoned => write!(f, "entry deleted"),
        }
    }
}

/// Map aliases onto canonical type names
fn canonical(kind: &str) -> String {
    match kind.to_lowercase().as_str() {
        "jpg" => "jpeg".to_string(),
        "tif" => "tiff".to_string(),
        other => other.to_string(),
    }
}

/// Canonical document type of an entry.
///
/// Taken from `file_type`, which may hold a short type or a MIME type, and
/// falling back to the file name extension.
pub fn document_type(entry: &WorkspaceEntry) -> Option<String> {
    let declared = entry.file_type.as_deref().and_then(|t| {
        let kind = t.rsplit_once('/').map_or(t, |(_, subtype)| subtype);
        (!kind.is_empty()).then(|| canonical(kind))
    });
    declared.or_else(|| file_extension(&entry.file_name).map(|e| canonical(&e)))
}

pub fn check(entry: &WorkspaceEntry, config: &OcrConfig) -> Result<(), Ineligible> {
    if entry.is_tombstoned() {
        return Err(Ineligible::Tombstoned);
    }
    if entry.ocr_analyzed {
        return Err(Ineligible::AlreadyAnalyzed);
    }

    let kind = document_type(entry);
    let supported = kind
        .as_deref()
        .is_some_and(|k| config.eligible_types.iter().any(|t| canonical(t) == k));
    if !supported {
        return Err(Ineligible::UnsupportedType(kind));
    }

    if entry.file_size > config.max_file_size {
        return Err(Ineligible::TooLarge {
            size: entry.file_size,
            limit: config.max_file_size,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_FILE_SIZE;
    use bridge_traits::EntrySyncStatus;
    use chrono::Utc;

    fn entry(name: &str) -> WorkspaceEntry {
        WorkspaceEntry::new("f1", name, format!("/{}", name), Utc::now()).with_size(2_000_000)
    }

    #[test]
    fn test_type_sources() {
        assert_eq!(document_type(&entry("scan.JPG")).as_deref(), Some("jpeg"));
        assert_eq!(
            document_type(&entry("noext").with_file_type("image/tiff")).as_deref(),
            Some("tiff")
        );
        assert_eq!(
            document_type(&entry("a.bin").with_file_type("pdf")).as_deref(),
            Some("pdf")
        );
        assert_eq!(document_type(&entry("README")), None);
    }

    #[test]
    fn test_eligibility() {
        let config = OcrConfig::default();
        assert!(check(&entry("invoice.pdf"), &config).is_ok());
        assert!(check(&entry("photo.tif"), &config).is_ok());
        assert_eq!(
            check(&entry("notes.docx"), &config),
            Err(Ineligible::UnsupportedType(Some("docx".to_string())))
        );

        let big = entry("huge.pdf").with_size(DEFAULT_MAX_FILE_SIZE + 1);
        assert!(matches!(check(&big, &config), Err(Ineligible::TooLarge { .. })));

        let mut done = entry("done.pdf");
        done.ocr_analyzed = true;
        assert_eq!(check(&done, &config), Err(Ineligible::AlreadyAnalyzed));

        let mut gone = entry("gone.pdf");
        gone.sync_status = EntrySyncStatus::Deleted;
        assert_eq!(check(&gone, &config), Err(Ineligible::Tombstoned));
    }
}
