//! Wordlist loading.
//!
//! A wordlist is plain text with one entry per line. Blank lines and lines
//! starting with `#` are ignored. Duplicates are dropped, keeping the first
//! occurrence, so candidate order follows the file.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info, warn};

/// Default wordlist location, relative to the working directory.
pub const DEFAULT_WORDLIST: &str = "Wordlist/pro_100.txt";

/// Paths probed on every run unless disabled.
pub const COMMON_PATHS: [&str; 5] = ["/admin", "/login", "/dashboard", "/user", "/api"];

/// Parses wordlist text into trimmed, de-duplicated entries.
///
/// # Examples
///
/// ```
/// use driller_core::wordlist::parse_wordlist;
///
/// let words = parse_wordlist("admin\n\n# comment\n login \nadmin\n");
/// assert_eq!(words, vec!["admin", "login"]);
/// ```
#[must_use]
pub fn parse_wordlist(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| seen.insert(*line))
        .map(ToString::to_string)
        .collect()
}

/// Loads the wordlist at `path`, optionally followed by [`COMMON_PATHS`].
///
/// A missing file is not an error: it is logged and only the common paths
/// are used. Lines that are not valid UTF-8 are skipped with a warning. Any
/// other read failure is returned.
///
/// # Errors
///
/// Returns the I/O error when the file exists but cannot be read.
pub fn load_wordlist(path: &Path, include_common: bool) -> std::io::Result<Vec<String>> {
    let mut words = match std::fs::read(path) {
        Ok(bytes) => parse_wordlist(&decode_lines(&bytes, path)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "wordlist not found, using common paths only");
            Vec::new()
        }
        Err(error) => return Err(error),
    };

    if include_common {
        append_common_paths(&mut words);
    }
    info!(path = %path.display(), entries = words.len(), "loaded wordlist");
    Ok(words)
}

fn decode_lines(bytes: &[u8], path: &Path) -> String {
    let mut text = String::with_capacity(bytes.len());
    let mut invalid = 0usize;
    for line in bytes.split(|&b| b == b'\n') {
        match std::str::from_utf8(line) {
            Ok(line) => {
                text.push_str(line);
                text.push('\n');
            }
            Err(_) => invalid += 1,
        }
    }
    if invalid > 0 {
        warn!(path = %path.display(), invalid, "skipped wordlist lines that are not valid UTF-8");
    }
    text
}

fn append_common_paths(words: &mut Vec<String>) {
    let mut seen: HashSet<String> = words
        .iter()
        .map(|w| w.trim_matches('/').to_string())
        .collect();
    for path in COMMON_PATHS {
        if seen.insert(path.trim_matches('/').to_string()) {
            words.push(path.to_string());
        } else {
            debug!(path, "common path already in wordlist");
        }
    }
}
