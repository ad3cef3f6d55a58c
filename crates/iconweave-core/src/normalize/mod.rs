//! Key & URL normalizer.
//!
//! Resolves raw references against the document base (falling back to the
//! origin) and memoizes both `raw -> canonical` and `canonical -> canonical`.
//! The memo maps grow for the process lifetime; they are not an LRU.

pub mod mirror;

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use tracing::debug;
use url::Url;

pub use self::mirror::{HostPattern, MirrorRule, MirrorTable, PathPattern, Rewrite};

/// Absolute, comparable identity of an asset reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalUrl(Url);

impl CanonicalUrl {
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

#[derive(Default)]
struct Memo {
    raw: HashMap<String, CanonicalUrl>,
    canonical: HashMap<String, CanonicalUrl>,
}

pub struct UrlNormalizer {
    origin: Url,
    base: Url,
    mirrors: MirrorTable,
    memo: Mutex<Memo>,
}

impl UrlNormalizer {
    /// `base` falls back to `origin` when absent or unparsable.
    pub fn new(origin: Url, base: Option<&str>, mirrors: MirrorTable) -> Self {
        let base = base
            .and_then(|b| Url::parse(b).or_else(|_| origin.join(b)).ok())
            .unwrap_or_else(|| origin.clone());
        Self {
            origin,
            base,
            mirrors,
            memo: Mutex::new(Memo::default()),
        }
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn mirrors(&self) -> &MirrorTable {
        &self.mirrors
    }

    /// Resolve `raw` into its canonical form.
    pub fn normalize(&self, raw: &str) -> Result<CanonicalUrl, url::ParseError> {
        let raw = raw.trim();
        {
            let memo = self.memo.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(hit) = memo.raw.get(raw).or_else(|| memo.canonical.get(raw)) {
                return Ok(hit.clone());
            }
        }

        let mut url = self.base.join(raw)?;
        url.set_fragment(None);
        let canonical = CanonicalUrl(url);

        let mut memo = self.memo.lock().unwrap_or_else(|e| e.into_inner());
        memo.raw.insert(raw.to_string(), canonical.clone());
        memo.canonical
            .insert(canonical.as_str().to_string(), canonical.clone());
        Ok(canonical)
    }

    /// `true` for references that still need loading; `false` for inline or
    /// already-encoded values. Never panics.
    pub fn is_resolvable(&self, value: &str) -> bool {
        let value = value.trim();
        if is_pre_resolved(value) {
            return false;
        }
        match self.base.join(value) {
            Ok(url) => matches!(url.scheme(), "http" | "https" | "file"),
            Err(_) => looks_like_path(value),
        }
    }

    /// Same-origin proxy URL for `url`, if a mirror rule knows one.
    pub fn proxy_url(&self, url: &Url) -> Option<Url> {
        let path = self.mirrors.rewrite(url)?.proxy_path?;
        self.origin.join(&path).ok()
    }

    /// Alternative hosts for `url`.
    pub fn mirror_urls(&self, url: &Url) -> Vec<Url> {
        self.mirrors
            .rewrite(url)
            .map(|rw| rw.mirrors)
            .unwrap_or_default()
    }

    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin()
    }

    /// Entries in the two memo maps (raw, canonical).
    pub fn memo_len(&self) -> (usize, usize) {
        let memo = self.memo.lock().unwrap_or_else(|e| e.into_inner());
        (memo.raw.len(), memo.canonical.len())
    }

    pub fn clear_memo(&self) {
        let mut memo = self.memo.lock().unwrap_or_else(|e| e.into_inner());
        memo.raw.clear();
        memo.canonical.clear();
        debug!("normalizer memo cleared");
    }
}

fn is_pre_resolved(value: &str) -> bool {
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return true;
    }
    let lower = value
        .get(..value.len().min(8))
        .unwrap_or_default()
        .to_ascii_lowercase();
    lower.starts_with("data:")
        || lower.starts_with("blob:")
        || lower.starts_with("url(")
        || lower.starts_with("image-se")
        || value.starts_with('<')
}

fn looks_like_path(value: &str) -> bool {
    !value.chars().any(char::is_whitespace)
        && (value.starts_with('/')
            || value.starts_with("./")
            || value.starts_with("../")
            || value.contains("://"))
}
