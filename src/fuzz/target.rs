//! Target descriptor: the immutable request template for a run.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use url::Url;

use super::error::ConfigError;

/// HTTP method used for probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// HEAD (default: cheapest probe, body fetched separately for hits)
    #[default]
    Head,
    /// PUT
    Put,
    /// DELETE
    Delete,
    /// PATCH
    Patch,
    /// OPTIONS
    Options,
}

impl HttpMethod {
    /// Returns the canonical upper-case method name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Head => "HEAD",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Options => "OPTIONS",
        }
    }

    /// Whether responses to this method carry no body.
    #[must_use]
    pub fn is_bodiless(self) -> bool {
        matches!(self, Self::Head)
    }

    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Head => reqwest::Method::HEAD,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
            Self::Patch => reqwest::Method::PATCH,
            Self::Options => reqwest::Method::OPTIONS,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "HEAD" => Ok(Self::Head),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            "OPTIONS" => Ok(Self::Options),
            _ => Err(ConfigError::InvalidMethod {
                method: s.to_string(),
            }),
        }
    }
}

/// Base URL, methods, headers, cookies and body template for every probe in a run.
///
/// Header names are case-insensitive; setting a header twice keeps the last
/// value. Cookies are keyed by exact name, also last write wins. Every path is
/// probed once per method, in the order the methods were given.
#[derive(Debug, Clone)]
pub struct TargetDescriptor {
    base_url: Url,
    /// Never empty, no duplicates.
    methods: Vec<HttpMethod>,
    /// Lower-cased name -> (name as given, value).
    headers: BTreeMap<String, (String, String)>,
    cookies: BTreeMap<String, String>,
    body: Option<Vec<u8>>,
}

impl TargetDescriptor {
    /// Creates a descriptor for an absolute http(s) base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if the URL does not parse or has no
    /// host, and [`ConfigError::UnsupportedScheme`] for non-http(s) schemes.
    pub fn new(base_url: &str, method: HttpMethod) -> Result<Self, ConfigError> {
        let trimmed = base_url.trim();
        let parsed =
            Url::parse(trimmed).map_err(|e| ConfigError::invalid_url(trimmed, e.to_string()))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme {
                url: trimmed.to_string(),
                scheme: parsed.scheme().to_string(),
            });
        }
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(ConfigError::invalid_url(trimmed, "missing host"));
        }

        Ok(Self {
            base_url: parsed,
            methods: vec![method],
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
            body: None,
        })
    }

    /// Replaces the probe methods. Duplicates are dropped (first one kept); an
    /// empty list leaves the current methods in place.
    #[must_use]
    pub fn with_methods(mut self, methods: impl IntoIterator<Item = HttpMethod>) -> Self {
        let mut unique = Vec::new();
        for method in methods {
            if !unique.contains(&method) {
                unique.push(method);
            }
        }
        if !unique.is_empty() {
            self.methods = unique;
        }
        self
    }

    /// Adds or replaces a header (case-insensitive name).
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers
            .insert(name.to_ascii_lowercase(), (name, value.into()));
        self
    }

    /// Adds or replaces a cookie.
    #[must_use]
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Sets the body template. Occurrences of `FUZZ` are replaced per candidate.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// The base URL every candidate path is joined onto.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The first probe method.
    #[must_use]
    pub fn method(&self) -> HttpMethod {
        self.methods.first().copied().unwrap_or_default()
    }

    /// Every probe method, in probe order.
    #[must_use]
    pub fn methods(&self) -> &[HttpMethod] {
        &self.methods
    }

    /// Headers in name order, with the name spelled as last given.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Looks up a header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    /// Cookies in name order.
    pub fn cookies(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cookies
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// The raw body template, if any.
    #[must_use]
    pub fn body_template(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Renders the cookie set as a `Cookie` header value (`a=1; b=2`).
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Renders the body for one wordlist entry.
    #[must_use]
    pub fn render_body(&self, word: &str) -> Option<Vec<u8>> {
        let template = self.body.as_deref()?;
        let placeholder = super::constants::BODY_PLACEHOLDER.as_bytes();
        if !contains_subslice(template, placeholder) {
            return Some(template.to_vec());
        }

        let mut rendered = Vec::with_capacity(template.len() + word.len());
        let mut rest = template;
        while let Some(pos) = find_subslice(rest, placeholder) {
            rendered.extend_from_slice(&rest[..pos]);
            rendered.extend_from_slice(word.as_bytes());
            rest = &rest[pos + placeholder.len()..];
        }
        rendered.extend_from_slice(rest);
        Some(rendered)
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    find_subslice(haystack, needle).is_some()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_accepts_http_and_https() {
        assert!(TargetDescriptor::new("http://example.test", HttpMethod::Get).is_ok());
        assert!(TargetDescriptor::new("https://example.test/app/", HttpMethod::Head).is_ok());
    }

    #[test]
    fn test_new_rejects_relative_url() {
        let result = TargetDescriptor::new("example.test/admin", HttpMethod::Get);
        assert!(matches!(result, Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn test_new_rejects_other_schemes() {
        let result = TargetDescriptor::new("ftp://example.test", HttpMethod::Get);
        assert!(matches!(
            result,
            Err(ConfigError::UnsupportedScheme { scheme, .. }) if scheme == "ftp"
        ));
    }

    #[test]
    fn test_headers_case_insensitive_last_write_wins() {
        let target = TargetDescriptor::new("http://example.test", HttpMethod::Get)
            .unwrap()
            .with_header("X-Token", "one")
            .with_header("x-token", "two");
        assert_eq!(target.header("X-TOKEN"), Some("two"));
        assert_eq!(target.headers().count(), 1);
        let (name, _) = target.headers().next().unwrap();
        assert_eq!(name, "x-token");
    }

    #[test]
    fn test_cookie_header_joins_in_name_order() {
        let target = TargetDescriptor::new("http://example.test", HttpMethod::Get)
            .unwrap()
            .with_cookie("session", "abc")
            .with_cookie("lang", "en")
            .with_cookie("session", "xyz");
        assert_eq!(
            target.cookie_header().as_deref(),
            Some("lang=en; session=xyz")
        );
    }

    #[test]
    fn test_cookie_header_none_when_empty() {
        let target = TargetDescriptor::new("http://example.test", HttpMethod::Get).unwrap();
        assert!(target.cookie_header().is_none());
    }

    #[test]
    fn test_render_body_replaces_placeholder() {
        let target = TargetDescriptor::new("http://example.test", HttpMethod::Post)
            .unwrap()
            .with_body(r#"{"path":"FUZZ","again":"FUZZ"}"#);
        let body = target.render_body("admin").unwrap();
        assert_eq!(body, br#"{"path":"admin","again":"admin"}"#.to_vec());
    }

    #[test]
    fn test_render_body_without_placeholder_is_verbatim() {
        let target = TargetDescriptor::new("http://example.test", HttpMethod::Post)
            .unwrap()
            .with_body("a=1");
        assert_eq!(target.render_body("admin").unwrap(), b"a=1".to_vec());
    }

    #[test]
    fn test_with_methods_dedupes_and_keeps_order() {
        let target = TargetDescriptor::new("http://example.test", HttpMethod::Head)
            .unwrap()
            .with_methods([HttpMethod::Get, HttpMethod::Post, HttpMethod::Get]);
        assert_eq!(target.methods(), &[HttpMethod::Get, HttpMethod::Post]);
        assert_eq!(target.method(), HttpMethod::Get);

        let unchanged = target.with_methods([]);
        assert_eq!(unchanged.methods(), &[HttpMethod::Get, HttpMethod::Post]);
    }

    #[test]
    fn test_method_parse_case_insensitive() {
        assert_eq!("head".parse::<HttpMethod>().unwrap(), HttpMethod::Head);
        assert_eq!(" Post ".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert!("BREW".parse::<HttpMethod>().is_err());
    }
}
