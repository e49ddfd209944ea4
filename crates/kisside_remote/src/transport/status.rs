/// Legacy proxy/connector codes observed on the wire by older user agents.
/// Kept as a closed set; anything else goes through the conservative default.
const LEGACY_CONNECTION_CODES: [u16; 7] = [12002, 12007, 12029, 12030, 12031, 12152, 13030];

/// IE alias for 204 No Content.
const LEGACY_NO_CONTENT: u16 = 1223;

/// Interpret an HTTP status as success or failure.
///
/// `fully_loaded` distinguishes a final verdict from a mid-flight reading:
/// some codes (206, unknown codes, absent status) only count as failures
/// once the response has fully arrived. `local_file` relaxes the absent
/// status case for file-scheme URLs, which report no status at all.
pub fn is_successful(status: Option<u16>, fully_loaded: bool, local_file: bool) -> bool {
    let Some(status) = status.filter(|status| *status != 0) else {
        if local_file {
            return true;
        }
        return !fully_loaded;
    };

    match status {
        206 => !fully_loaded,
        200..=299 => true,
        304 => true,
        LEGACY_NO_CONTENT => true,
        300..=303 | 305..=307 => false,
        400..=417 => false,
        500..=505 => false,
        status if LEGACY_CONNECTION_CODES.contains(&status) => false,
        status => {
            if fully_loaded {
                tracing::warn!(status, "unknown http status treated as failure");
                false
            } else {
                true
            }
        }
    }
}

pub fn is_local_url(url: &str) -> bool {
    url.starts_with("file:")
}
