//! Filesystem-safe filenames for saved hits.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use super::constants::MAX_FILENAME_LEN;

/// Runs of characters not allowed in saved filenames.
#[allow(clippy::expect_used)]
static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^A-Za-z0-9._-]+").expect("filename regex is valid")
});

#[allow(clippy::expect_used)]
static REPEATED_UNDERSCORES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_{2,}").expect("underscore regex is valid"));

/// Name used when a URL path reduces to nothing (e.g. `/`).
const ROOT_NAME: &str = "index";

/// Derives a filename from a hit's URL path.
///
/// Path separators become `_`, other unsafe characters are replaced, and the
/// result is capped at a fixed length with its extension preserved. A name
/// with no extension gets one from `content_type`.
///
/// ```
/// use url::Url;
/// use driller_core::fuzz::filename::derive_filename;
///
/// let url = Url::parse("http://example.test/admin/panel").unwrap();
/// assert_eq!(derive_filename(&url, Some("text/html; charset=utf-8")), "admin_panel.html");
/// ```
#[must_use]
pub fn derive_filename(url: &Url, content_type: Option<&str>) -> String {
    let raw_path = url.path();
    let decoded = urlencoding::decode(raw_path).map_or_else(|_| raw_path.to_string(), |d| d.into_owned());

    let flattened = decoded.trim_matches('/').replace(['/', '\\'], "_");
    let replaced = UNSAFE_CHARS.replace_all(&flattened, "_");
    let collapsed = REPEATED_UNDERSCORES.replace_all(&replaced, "_");
    let mut name = collapsed.trim_matches(|c| c == '_' || c == '.').to_string();
    if name.is_empty() {
        name = ROOT_NAME.to_string();
    }

    if split_extension(&name).1.is_empty() {
        name.push_str(content_type.map_or(".bin", extension_from_content_type));
    }

    truncate_preserving_extension(&name, MAX_FILENAME_LEN)
}

/// Splits `name` into stem and extension (with its dot). The extension is
/// empty when the name has none.
#[must_use]
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos)
            if pos > 0
                && (2..=11).contains(&(name.len() - pos))
                && name[pos + 1..].chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            (&name[..pos], &name[pos..])
        }
        _ => (name, ""),
    }
}

fn truncate_preserving_extension(name: &str, max_chars: usize) -> String {
    if name.chars().count() <= max_chars {
        return name.to_string();
    }
    let (stem, ext) = split_extension(name);
    let keep = max_chars.saturating_sub(ext.chars().count()).max(1);
    let mut truncated: String = stem.chars().take(keep).collect();
    truncated.push_str(ext);
    truncated
}

/// Guess file extension from Content-Type header.
#[must_use]
pub fn extension_from_content_type(content_type: &str) -> &'static str {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    match mime.as_str() {
        "text/html" | "application/xhtml+xml" => ".html",
        "text/plain" => ".txt",
        "application/json" | "application/problem+json" => ".json",
        "application/xml" | "text/xml" => ".xml",
        "text/javascript" | "application/javascript" => ".js",
        "application/x-httpd-php" | "application/x-php" | "text/x-php" => ".php",
        "text/css" => ".css",
        "text/csv" => ".csv",
        "application/pdf" => ".pdf",
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/svg+xml" => ".svg",
        "application/zip" => ".zip",
        "application/gzip" => ".gz",
        _ => ".bin",
    }
}
