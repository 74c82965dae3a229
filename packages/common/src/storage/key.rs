use super::error::MirrorError;

/// Validates an object key before it reaches a backend.
///
/// Keys are `/`-separated relative paths. Empty segments, `.`/`..` segments,
/// backslashes and control characters are rejected so a key can never
/// address anything outside the mirror's namespace.
pub fn validate_key(key: &str) -> Result<&str, MirrorError> {
    if key.is_empty() {
        return Err(MirrorError::InvalidKey("key cannot be empty".into()));
    }
    if key.starts_with('/') {
        return Err(MirrorError::InvalidKey(format!("{key}: leading '/'")));
    }
    if key.contains('\\') || key.chars().any(|c| c.is_control()) {
        return Err(MirrorError::InvalidKey(format!(
            "{key}: backslashes and control characters are not allowed"
        )));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(MirrorError::InvalidKey(format!(
            "{key}: empty or relative path segment"
        )));
    }
    Ok(key)
}

/// Guess a content type for `key` from its extension.
pub fn content_type_for(key: &str) -> String {
    mime_guess::from_path(key)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
