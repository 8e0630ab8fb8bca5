//! Candidate generation from a wordlist and a target descriptor.
//!
//! [`CandidateGenerator`] is a restartable, lazy producer: every call to
//! [`CandidateGenerator::iter`] walks the wordlist again from the start in
//! insertion order. For each entry and each of the target's methods it yields
//! the bare path first, then one candidate per configured extension. Entries
//! that cannot be turned into a URL path are skipped and counted.

use std::sync::Arc;

use tracing::debug;
use url::Url;

use super::target::{HttpMethod, TargetDescriptor};

/// One fully-resolved request to probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Position in the generated sequence (0-based).
    pub index: usize,
    /// The wordlist entry this candidate came from.
    pub word: String,
    /// Extension appended to the entry, including the leading dot.
    pub extension: Option<String>,
    /// Resolved request URL.
    pub url: Url,
    /// Request method.
    pub method: HttpMethod,
    /// Rendered request body, if the target has a body template.
    pub body: Option<Vec<u8>>,
}

/// Lazy producer of [`Candidate`]s.
#[derive(Debug, Clone)]
pub struct CandidateGenerator {
    target: Arc<TargetDescriptor>,
    words: Arc<[String]>,
    extensions: Arc<[String]>,
}

impl CandidateGenerator {
    /// Creates a generator over `words`, expanding each with `extensions`.
    ///
    /// Extensions are normalised to start with a dot; blank extensions are dropped.
    pub fn new<I, S>(target: Arc<TargetDescriptor>, words: I, extensions: &[String]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words: Vec<String> = words.into_iter().map(Into::into).collect();
        let extensions: Vec<String> = extensions
            .iter()
            .filter_map(|ext| normalize_extension(ext))
            .collect();
        Self {
            target,
            words: words.into(),
            extensions: extensions.into(),
        }
    }

    /// Starts a fresh pass over the wordlist.
    #[must_use]
    pub fn iter(&self) -> Candidates<'_> {
        Candidates {
            generator: self,
            word_index: 0,
            variant: 0,
            current: None,
            emitted: 0,
            skipped: 0,
        }
    }

    /// Number of wordlist entries.
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Upper bound on the number of candidates (before skipping malformed entries).
    #[must_use]
    pub fn max_candidates(&self) -> usize {
        self.words.len().saturating_mul(self.variants_per_word())
    }

    /// Candidates per entry: every method times the bare path plus each extension.
    fn variants_per_word(&self) -> usize {
        self.target
            .methods()
            .len()
            .saturating_mul(1 + self.extensions.len())
    }

    /// The target every candidate is resolved against.
    #[must_use]
    pub fn target(&self) -> &TargetDescriptor {
        &self.target
    }
}

/// One pass over a [`CandidateGenerator`].
#[derive(Debug)]
pub struct Candidates<'a> {
    generator: &'a CandidateGenerator,
    word_index: usize,
    /// Counts through methods x (bare entry, extensions) for the current entry.
    variant: usize,
    /// Trimmed entry currently being expanded.
    current: Option<String>,
    emitted: usize,
    skipped: usize,
}

impl Candidates<'_> {
    /// Malformed entries skipped so far in this pass.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Candidates yielded so far in this pass.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

impl Iterator for Candidates<'_> {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        let generator = self.generator;
        loop {
            if self.current.is_none() {
                let raw = generator.words.get(self.word_index)?;
                self.word_index += 1;
                self.variant = 0;

                let word = raw.trim();
                if !is_valid_entry(word) {
                    self.skipped += 1;
                    debug!(entry = %raw, "skipping malformed wordlist entry");
                    continue;
                }
                self.current = Some(word.to_string());
            }

            let word = self.current.as_deref().unwrap_or_default();
            if self.variant >= generator.variants_per_word() {
                self.current = None;
                continue;
            }

            let per_method = 1 + generator.extensions.len();
            let Some(&method) = generator.target.methods().get(self.variant / per_method) else {
                self.current = None;
                continue;
            };
            let extension = match self.variant % per_method {
                0 => None,
                n => generator.extensions.get(n - 1).map(String::as_str),
            };
            self.variant += 1;

            let Some(url) = resolve_candidate_url(generator.target.base_url(), word, extension)
            else {
                // A bare entry that fails resolution means the entry itself is malformed.
                if extension.is_none() {
                    debug!(entry = %word, "skipping entry that does not resolve to a URL");
                    self.skipped += 1;
                    self.current = None;
                }
                continue;
            };

            let candidate = Candidate {
                index: self.emitted,
                word: word.to_string(),
                extension: extension.map(ToString::to_string),
                url,
                method,
                body: generator.target.render_body(word),
            };
            self.emitted += 1;
            return Some(candidate);
        }
    }
}

/// Normalises an extension to `.ext` form; returns `None` for blank input.
#[must_use]
pub fn normalize_extension(ext: &str) -> Option<String> {
    let trimmed = ext.trim().trim_start_matches('.');
    if trimmed.is_empty() || trimmed.contains(['/', '?', '#']) {
        return None;
    }
    Some(format!(".{trimmed}"))
}

fn is_valid_entry(word: &str) -> bool {
    !word.is_empty()
        && !word.contains("://")
        && !word.contains('#')
        && !word.chars().any(|c| c.is_control() || c.is_whitespace())
        && word.split('?').next().is_some_and(|path| !path.trim_matches('/').is_empty() || word.ends_with('/'))
}

/// Joins a wordlist entry (plus optional extension) onto the base URL path.
///
/// Duplicate slashes are collapsed. A query string in the entry is kept and
/// the extension goes onto the path part. Returns `None` for entries that do
/// not form a usable path.
#[must_use]
pub fn resolve_candidate_url(base: &Url, word: &str, extension: Option<&str>) -> Option<Url> {
    let word = word.trim();
    if !is_valid_entry(word) {
        return None;
    }

    let (path_part, query) = match word.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (word, None),
    };

    let mut path = base.path().trim_end_matches('/').to_string();
    path.push('/');
    match extension {
        Some(ext) => {
            let stem = path_part.trim_start_matches('/').trim_end_matches('/');
            if stem.is_empty() {
                return None;
            }
            path.push_str(stem);
            path.push_str(ext);
        }
        None => path.push_str(path_part.trim_start_matches('/')),
    }

    let path = collapse_slashes(&path);
    let mut url = base.clone();
    url.set_path(&path);
    url.set_query(query.filter(|q| !q.is_empty()));
    url.set_fragment(None);
    Some(url)
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut previous_slash = false;
    for ch in path.chars() {
        if ch == '/' {
            if !previous_slash {
                out.push(ch);
            }
            previous_slash = true;
        } else {
            out.push(ch);
            previous_slash = false;
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn target(base: &str) -> Arc<TargetDescriptor> {
        Arc::new(TargetDescriptor::new(base, HttpMethod::Get).unwrap())
    }

    fn urls(generator: &CandidateGenerator) -> Vec<String> {
        generator.iter().map(|c| c.url.to_string()).collect()
    }

    #[test]
    fn test_yields_one_candidate_per_entry_in_order() {
        let words = ["admin", "login", "404page"];
        let generator = CandidateGenerator::new(target("http://example.test"), words, &[]);
        assert_eq!(
            urls(&generator),
            vec![
                "http://example.test/admin",
                "http://example.test/login",
                "http://example.test/404page",
            ]
        );
    }

    #[test]
    fn test_count_matches_wordlist_size_without_extensions() {
        for n in [0usize, 1, 7, 250] {
            let words: Vec<String> = (0..n).map(|i| format!("entry{i}")).collect();
            let generator =
                CandidateGenerator::new(target("http://example.test"), words.clone(), &[]);
            let produced: Vec<Candidate> = generator.iter().collect();
            assert_eq!(produced.len(), n);
            for (i, candidate) in produced.iter().enumerate() {
                assert_eq!(candidate.word, words[i]);
                assert_eq!(candidate.index, i);
            }
        }
    }

    #[test]
    fn test_extensions_expand_bare_first() {
        let generator = CandidateGenerator::new(
            target("http://example.test/"),
            ["index"],
            &["php".to_string(), ".bak".to_string()],
        );
        assert_eq!(
            urls(&generator),
            vec![
                "http://example.test/index",
                "http://example.test/index.php",
                "http://example.test/index.bak",
            ]
        );
        assert_eq!(generator.max_candidates(), 3);
    }

    #[test]
    fn test_malformed_entries_skipped_and_counted() {
        let generator = CandidateGenerator::new(
            target("http://example.test"),
            ["", "   ", "ok", "has space", "http://evil.test/x", "tab\there", "frag#x"],
            &[],
        );
        let mut iter = generator.iter();
        let produced: Vec<Candidate> = iter.by_ref().collect();
        assert_eq!(produced.len(), 1);
        assert_eq!(produced[0].word, "ok");
        assert_eq!(iter.skipped(), 6);
    }

    #[test]
    fn test_iter_is_restartable() {
        let generator =
            CandidateGenerator::new(target("http://example.test"), ["a", "b", "c"], &[]);
        let first = urls(&generator);
        let second = urls(&generator);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_resolve_collapses_duplicate_slashes() {
        let base = Url::parse("http://example.test/app//").unwrap();
        let url = resolve_candidate_url(&base, "//admin//panel", None).unwrap();
        assert_eq!(url.as_str(), "http://example.test/app/admin/panel");
    }

    #[test]
    fn test_resolve_keeps_base_path() {
        let base = Url::parse("http://example.test/api/v1").unwrap();
        let url = resolve_candidate_url(&base, "users", None).unwrap();
        assert_eq!(url.as_str(), "http://example.test/api/v1/users");
    }

    #[test]
    fn test_resolve_keeps_trailing_slash_entries() {
        let base = Url::parse("http://example.test").unwrap();
        let url = resolve_candidate_url(&base, "backup/", None).unwrap();
        assert_eq!(url.as_str(), "http://example.test/backup/");
        let with_ext = resolve_candidate_url(&base, "backup/", Some(".zip")).unwrap();
        assert_eq!(with_ext.as_str(), "http://example.test/backup.zip");
    }

    #[test]
    fn test_resolve_places_extension_before_query() {
        let base = Url::parse("http://example.test").unwrap();
        let url = resolve_candidate_url(&base, "search?q=1", Some(".php")).unwrap();
        assert_eq!(url.as_str(), "http://example.test/search.php?q=1");
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension("php").as_deref(), Some(".php"));
        assert_eq!(normalize_extension(".html").as_deref(), Some(".html"));
        assert_eq!(normalize_extension("  "), None);
        assert_eq!(normalize_extension("a/b"), None);
    }

    #[test]
    fn test_every_method_probes_every_variant() {
        let target = Arc::new(
            TargetDescriptor::new("http://example.test", HttpMethod::Head)
                .unwrap()
                .with_methods([HttpMethod::Head, HttpMethod::Get]),
        );
        let generator = CandidateGenerator::new(target, ["admin", "", "api"], &["php".to_string()]);
        let produced: Vec<(HttpMethod, String)> = generator
            .iter()
            .map(|c| (c.method, c.url.path().to_string()))
            .collect();
        assert_eq!(
            produced,
            vec![
                (HttpMethod::Head, "/admin".to_string()),
                (HttpMethod::Head, "/admin.php".to_string()),
                (HttpMethod::Get, "/admin".to_string()),
                (HttpMethod::Get, "/admin.php".to_string()),
                (HttpMethod::Head, "/api".to_string()),
                (HttpMethod::Head, "/api.php".to_string()),
                (HttpMethod::Get, "/api".to_string()),
                (HttpMethod::Get, "/api.php".to_string()),
            ]
        );
        assert_eq!(generator.max_candidates(), 12);

        let mut iter = generator.iter();
        assert_eq!(iter.by_ref().count(), 8);
        assert_eq!(iter.skipped(), 1);
    }

    #[test]
    fn test_body_template_rendered_per_candidate() {
        let target = Arc::new(
            TargetDescriptor::new("http://example.test", HttpMethod::Post)
                .unwrap()
                .with_body("name=FUZZ"),
        );
        let generator = CandidateGenerator::new(target, ["admin"], &[]);
        let candidate = generator.iter().next().unwrap();
        assert_eq!(candidate.body.as_deref(), Some(&b"name=admin"[..]));
        assert_eq!(candidate.method, HttpMethod::Post);
    }
}
