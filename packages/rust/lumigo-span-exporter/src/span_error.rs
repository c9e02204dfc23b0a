//! Extraction of the error sub-record from span attributes.

use crate::attributes::AttributeBag;
use crate::constants::attributes;
use crate::record::ErrorRecord;

/// Builds the error sub-record of a span.
///
/// The three error attributes are read independently. Returns `None` when
/// all of them are missing or empty; otherwise missing fields are left as
/// empty strings.
pub fn extract(bag: &AttributeBag) -> Option<ErrorRecord> {
    let read = |key: &str| bag.get_string(key).unwrap_or_default();

    let error = ErrorRecord {
        error_type: read(attributes::ERROR_TYPE),
        message: read(attributes::ERROR_MESSAGE),
        stacktrace: read(attributes::ERROR_STACKTRACE),
    };

    if error.is_empty() {
        None
    } else {
        Some(error)
    }
}
