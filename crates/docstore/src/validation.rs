use tracing::{debug, trace};

use crate::error::ValidationError;

/// Windows reserved names that cannot be used as filenames.
/// Collections become directories in the filesystem backend, so these are refused
/// everywhere to keep collection names portable across backends.
pub const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8", "COM9", "LPT1", "LPT2",
    "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Prefix reserved by document databases for internal collections.
const SYSTEM_PREFIX: &str = "system.";

/// Checks if a name contains only valid characters.
///
/// Valid characters are: alphanumeric, underscore (_), hyphen (-), and dot (.).
pub fn is_valid_name_chars(name: &str) -> bool {
    name.chars()
        .all(|ch| matches!(ch, 'a' ..= 'z' | 'A' ..= 'Z' | '0' ..= '9' | '_' | '-' | '.'))
}

/// Checks if a name is a Windows reserved name (case-insensitive).
///
/// Also checks the base name before any extension.
pub fn is_reserved_name(name: &str) -> bool {
    let name_upper = name.to_uppercase();
    let base_name = name_upper.split('.').next().unwrap_or(&name_upper);
    WINDOWS_RESERVED_NAMES.contains(&name_upper.as_str()) || WINDOWS_RESERVED_NAMES.contains(&base_name)
}

/// Validates a collection name.
///
/// - Must not be empty
/// - Must only contain alphanumeric characters, underscores (_), hyphens (-), and dots (.)
/// - Must not start with a dot or with `system.`
/// - Must not end with a dot
/// - Must not be a Windows reserved name (CON, PRN, AUX, NUL, COM1-9, LPT1-9)
///
/// # Errors
///
/// Returns `ValidationError::InvalidCollectionName` if the name is invalid.
pub fn validate_collection_name(name: &str) -> Result<(), ValidationError> {
    trace!("Validating collection name: {}", name);
    let invalid = || {
        ValidationError::InvalidCollectionName {
            name: name.to_owned(),
        }
    };

    if name.is_empty() {
        debug!("Collection name is empty");
        return Err(invalid());
    }
    if name.starts_with('.') || name.starts_with(SYSTEM_PREFIX) {
        debug!("Collection name uses a reserved prefix: {}", name);
        return Err(invalid());
    }
    if name.ends_with('.') {
        debug!("Collection name ends with dot: {}", name);
        return Err(invalid());
    }
    if !is_valid_name_chars(name) {
        debug!("Collection name contains invalid characters: {}", name);
        return Err(invalid());
    }
    if is_reserved_name(name) {
        debug!("Collection name is a reserved name: {}", name);
        return Err(invalid());
    }

    Ok(())
}
