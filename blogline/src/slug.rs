//! Text normalizers used when authoring posts: slugs, upload names and excerpts.

use once_cell::sync::Lazy;
use regex::Regex;

static NON_SLUG_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9-]").expect("valid slug regex"));
static NON_FILE_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9.\-_]").expect("valid file name regex"));

/// Derives the URL-safe slug for a post title.
///
/// Lowercases, turns every space into `-`, then drops anything outside `[a-z0-9-]`.
/// Slugs are not guaranteed unique.
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase().replace(' ', "-");
    NON_SLUG_CHARS.replace_all(&lowered, "").into_owned()
}

/// Strips an uploaded file name down to `[a-z0-9._-]`.
pub fn sanitize_file_name(name: &str) -> String {
    NON_FILE_NAME_CHARS.replace_all(name, "").to_lowercase()
}

/// Storage path for an upload: `{unix_millis}-{sanitized name}`.
pub fn upload_path(file_name: &str, unix_millis: i64) -> String {
    format!("{unix_millis}-{}", sanitize_file_name(file_name))
}

/// Truncates `text` to `max_chars` characters, appending `...` when anything was cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Best-effort content type for an image file, from its extension.
pub fn image_content_type(file_name: &str) -> Option<&'static str> {
    let extension = file_name.rsplit_once('.')?.1.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        "avif" => Some("image/avif"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}
