//! URL modeling and filename derivation (§4.D).
//!
//! Derives a safe local filename from the URL path tail, sanitized for Linux
//! filesystems, the same way the teacher's filename derivation works minus
//! the `Content-Disposition` sniffing step — this engine has no separate
//! metadata probe, so the header is never available before the GET starts.

mod path;
mod sanitize;

pub use path::filename_from_url_path;
pub use sanitize::sanitize_filename_for_linux;

/// Default filename when the URL path yields nothing usable (§4.D: "default
/// to `download` if empty").
const DEFAULT_FILENAME: &str = "download";

/// Derives a filename for a new download from its URL, per §4.D:
/// "derive from URL path tail (strip query), default to `download` if empty".
pub fn derive_filename(url: &str) -> String {
    let raw = match filename_from_url_path(url) {
        Some(c) => c,
        None => return DEFAULT_FILENAME.to_string(),
    };

    let sanitized = sanitize_filename_for_linux(&raw);
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        sanitized
    }
}
