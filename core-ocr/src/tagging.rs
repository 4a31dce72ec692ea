//! Tag and category derivation from OCR output.

use bridge_traits::ExtractedData;

pub const TAG_INVOICE: &str = "Invoice";
pub const TAG_FINANCIAL: &str = "Financial";
pub const TAG_DATED: &str = "Dated";
pub const TAG_BUSINESS: &str = "Business";
pub const TAG_LOW_CONFIDENCE: &str = "Low-Confidence";
pub const TAG_CONTRACT: &str = "Contract";
pub const TAG_RECEIPT: &str = "Receipt";
pub const TAG_OCR_ERROR: &str = "OCR-Error";

/// Below this confidence a document is tagged [`TAG_LOW_CONFIDENCE`]
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;

const CONTRACT_KEYWORDS: &[&str] = &["contract", "agreement", "vertrag", "contrat"];
const RECEIPT_KEYWORDS: &[&str] = &["receipt", "quittung", "kassenbon", "reçu"];

/// Categories a derived one may replace
const GENERIC_CATEGORIES: &[&str] = &["", "document", "documents", "general", "other", "uncategorized"];

pub fn derive_tags(text: &str, data: &ExtractedData, confidence: f64) -> Vec<String> {
    let mut tags = Vec::new();
    if !data.invoice_numbers.is_empty() {
        tags.push(TAG_INVOICE);
    }
    if !data.amounts.is_empty() {
        tags.push(TAG_FINANCIAL);
    }
    if !data.dates.is_empty() {
        tags.push(TAG_DATED);
    }
    if !data.companies.is_empty() {
        tags.push(TAG_BUSINESS);
    }
    if confidence < LOW_CONFIDENCE_THRESHOLD {
        tags.push(TAG_LOW_CONFIDENCE);
    }

    let lower = text.to_lowercase();
    if CONTRACT_KEYWORDS.iter().any(|k| lower.contains(k)) {
        tags.push(TAG_CONTRACT);
    }
    if RECEIPT_KEYWORDS.iter().any(|k| lower.contains(k)) {
        tags.push(TAG_RECEIPT);
    }

    tags.into_iter().map(String::from).collect()
}

/// Append `derived` to `existing`, skipping case-insensitive duplicates
pub fn merge_tags(existing: &[String], derived: &[String]) -> Vec<String> {
    let mut merged = existing.to_vec();
    for tag in derived {
        if !merged.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            merged.push(tag.clone());
        }
    }
    merged
}

/// New category for an entry, if the current one is unset or generic
pub fn refine_category(current: Option<&str>, tags: &[String]) -> Option<String> {
    if let Some(category) = current {
        let normalized = category.trim().to_lowercase();
        if !GENERIC_CATEGORIES.contains(&normalized.as_str()) {
            return None;
        }
    }

    let has = |tag: &str| tags.iter().any(|t| t == tag);
    let category = if has(TAG_INVOICE) {
        "Invoice"
    } else if has(TAG_RECEIPT) {
        "Receipt"
    } else if has(TAG_CONTRACT) {
        "Contract"
    } else if has(TAG_FINANCIAL) {
        "Finance"
    } else {
        return None;
    };
    Some(category.to_string())
}
