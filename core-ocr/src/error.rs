use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] BridgeError),

    #[error("Failed to download document {file_id}: {message}")]
    Download { file_id: String, message: String },

    #[error("OCR service reported failure: {0}")]
    Service(String),

    #[error("Failed to update entry {file_id}: {message}")]
    Update { file_id: String, message: String },

    #[error("OCR service not configured")]
    ServiceUnavailable,

    #[error("Invalid OCR configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, OcrError>;
