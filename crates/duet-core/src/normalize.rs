//! Rewrites sharing links into URLs an image element can load directly.
//!
//! Photo-album share pages (`photos.app.goo.gl`, `photos.google.com`) are
//! HTML landing pages and cannot be rewritten without a server round trip;
//! they come back unchanged. Image addresses copied from those pages
//! (`lh3.googleusercontent.com/...`) are already direct and also pass through.

use std::sync::OnceLock;

use regex::Regex;

/// Map a user-supplied link to a direct image link. Pure and idempotent.
pub fn to_direct_link(url: &str) -> String {
    static DRIVE_FILE_VIEW: OnceLock<Regex> = OnceLock::new();
    static DROPBOX_VIEW_PARAM: OnceLock<Regex> = OnceLock::new();

    if url.is_empty() {
        return String::new();
    }

    // https://drive.google.com/file/d/<ID>/view?usp=sharing
    let drive = DRIVE_FILE_VIEW.get_or_init(|| {
        Regex::new(r"drive\.google\.com/file/d/([A-Za-z0-9_-]+)").expect("valid drive link regex")
    });
    if let Some(id) = drive.captures(url).and_then(|c| c.get(1)) {
        return format!("https://drive.google.com/uc?export=view&id={}", id.as_str());
    }

    // https://www.dropbox.com/s/<ID>/<name>?dl=0 -> ?dl=1
    let dropbox = DROPBOX_VIEW_PARAM
        .get_or_init(|| Regex::new(r"([?&])dl=0\b").expect("valid dropbox param regex"));
    if url.contains("dropbox.com") && dropbox.is_match(url) {
        return dropbox.replace_all(url, "${1}dl=1").into_owned();
    }

    url.to_string()
}
