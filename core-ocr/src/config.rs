//! OCR pipeline configuration.
//!
//! Deserializable from JSON with every field optional:
//!
//! ```ignore
//! let config: OcrConfig = serde_json::from_str(r#"{ "max_attempts": 5 }"#)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{OcrError, Result};

/// 50 MB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Priority used for freshly mirrored documents
pub const DEFAULT_PRIORITY: u8 = 5;

/// Priority used for backlog sweeps
pub const BACKLOG_PRIORITY: u8 = 10;

/// Filename keywords hinting at a document language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageHint {
    /// ISO 639-1 code passed to the OCR service
    pub code: String,
    pub keywords: Vec<String>,
}

impl LanguageHint {
    pub fn new(code: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            code: code.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Canonical document types accepted for OCR
    pub eligible_types: Vec<String>,

    pub max_file_size: u64,

    /// Checked in order; the first hint with a matching keyword wins
    pub languages: Vec<LanguageHint>,

    /// Attempts per document before the soft failure is written
    pub max_attempts: u32,

    pub default_priority: u8,

    pub backlog_priority: u8,

    pub extract_tables: bool,

    pub extract_handwriting: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            eligible_types: ["pdf", "jpeg", "png", "tiff", "bmp", "gif"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            languages: vec![
                LanguageHint::new(
                    "de",
                    &["rechnung", "vertrag", "quittung", "beleg", "angebot", "mahnung"],
                ),
                LanguageHint::new("fr", &["facture", "contrat", "devis", "reçu"]),
                LanguageHint::new(
                    "en",
                    &["invoice", "contract", "receipt", "statement", "quote"],
                ),
            ],
            max_attempts: 3,
            default_priority: DEFAULT_PRIORITY,
            backlog_priority: BACKLOG_PRIORITY,
            extract_tables: true,
            extract_handwriting: false,
        }
    }
}

impl OcrConfig {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn with_languages(mut self, languages: Vec<LanguageHint>) -> Self {
        self.languages = languages;
        self
    }

    pub fn with_backlog_priority(mut self, priority: u8) -> Self {
        self.backlog_priority = priority;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(OcrError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.eligible_types.is_empty() {
            return Err(OcrError::Config(
                "at least one eligible document type is required".to_string(),
            ));
        }
        if self.max_file_size == 0 {
            return Err(OcrError::Config(
                "max_file_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
