use crate::config::LanguageHint;

/// Language passed to the OCR service when no hint matches
pub const AUTO: &str = "auto";

/// Guess the document language from keywords in its file name
pub fn detect_language(file_name: &str, hints: &[LanguageHint]) -> String {
    let name = file_name.to_lowercase();
    hints
        .iter()
        .find(|hint| {
            hint.keywords
                .iter()
                .any(|k| !k.is_empty() && name.contains(&k.to_lowercase()))
        })
        .map_or_else(|| AUTO.to_string(), |hint| hint.code.clone())
}
