//! OCR Service Abstraction
//!
//! The OCR model server is an external collaborator. The core submits
//! base64-encoded documents and receives plain text plus structured fields.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Structured fields extracted from a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedData {
    #[serde(default)]
    pub dates: Vec<String>,
    #[serde(default)]
    pub amounts: Vec<String>,
    #[serde(default)]
    pub invoice_numbers: Vec<String>,
    #[serde(default)]
    pub companies: Vec<String>,
    /// Model confidence in `[0.0, 1.0]`
    #[serde(default)]
    pub confidence: f64,
}

impl ExtractedData {
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
            && self.amounts.is_empty()
            && self.invoice_numbers.is_empty()
            && self.companies.is_empty()
    }
}

/// OCR request payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrRequest {
    pub image_base64: String,
    /// ISO language code or `"auto"`
    pub language: String,
    pub extract_tables: bool,
    pub extract_handwriting: bool,
}

/// OCR response payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResponse {
    pub success: bool,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub extracted_data: ExtractedData,
    #[serde(default)]
    pub error: Option<String>,
}

impl OcrResponse {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Health report of the OCR server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrHealth {
    pub healthy: bool,
    pub model: Option<String>,
    pub message: Option<String>,
}

/// OCR collaborator trait
#[async_trait]
pub trait OcrService: Send + Sync {
    /// Run OCR on a base64-encoded document
    async fn perform_ocr(&self, request: OcrRequest) -> Result<OcrResponse>;

    /// Report server health
    async fn health_check(&self) -> Result<OcrHealth>;
}
