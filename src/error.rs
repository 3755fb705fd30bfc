use thiserror::Error;

/// Failures that abort a taxonomy build. A partial taxonomy would silently
/// produce false negatives for every product, so none of these are recovered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaxonomyError {
    #[error("taxonomy source '{source_name}' unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    #[error("taxonomy source '{source_name}': window {start}..{end} exceeds {len} extracted names")]
    WindowOutOfRange {
        source_name: String,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("correction index {index} out of range for reference list of length {len}")]
    CorrectionOutOfRange { index: usize, len: usize },

    #[error("invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid {field} selector '{selector}': {message}")]
pub struct SelectorError {
    pub field: &'static str,
    pub selector: String,
    pub message: String,
}
