//! Mirror rewriting table.
//!
//! An ordered list of `(host pattern, path pattern) -> templates`. The first
//! rule that matches wins; URLs no rule matches pass through unchanged.

use std::collections::HashMap;

use url::Url;

/// Host matcher: exact (`cdn.example`) or suffix wildcard (`*.example`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPattern(String);

impl HostPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into().to_ascii_lowercase())
    }

    pub fn matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        match self.0.strip_prefix("*.") {
            Some(suffix) => host.len() > suffix.len() && host.ends_with(&format!(".{suffix}")),
            None => host == self.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `prefix{name}`; an empty prefix is a plain capture.
    Capture { prefix: String, name: String },
    Any,
}

/// `/`-separated path matcher with `{name}` captures and `*` wildcards.
///
/// `/npm/@scope/core@{version}/assets/{style}/{file}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

pub type Captures = HashMap<String, String>;

impl PathPattern {
    pub fn parse(pattern: &str) -> Self {
        let segments = pattern
            .trim_start_matches('/')
            .split('/')
            .map(|seg| {
                if seg == "*" {
                    return Segment::Any;
                }
                match (seg.find('{'), seg.ends_with('}')) {
                    (Some(open), true) => Segment::Capture {
                        prefix: seg[..open].to_string(),
                        name: seg[open + 1..seg.len() - 1].to_string(),
                    },
                    _ => Segment::Literal(seg.to_string()),
                }
            })
            .collect();
        Self { segments }
    }

    pub fn matches(&self, path: &str) -> Option<Captures> {
        let parts: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut captures = Captures::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Any => {}
                Segment::Literal(lit) => {
                    if lit != part {
                        return None;
                    }
                }
                Segment::Capture { prefix, name } => {
                    let value = part.strip_prefix(prefix.as_str())?;
                    if value.is_empty() {
                        return None;
                    }
                    captures.insert(name.clone(), value.to_string());
                }
            }
        }
        Some(captures)
    }
}

fn fill(template: &str, captures: &Captures) -> String {
    let mut out = template.to_string();
    for (name, value) in captures {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

/// One row of the table.
#[derive(Debug, Clone)]
pub struct MirrorRule {
    pub name: String,
    pub host: HostPattern,
    pub path: PathPattern,
    /// Same-origin proxy path template.
    pub proxy: Option<String>,
    /// Absolute mirror URL templates, tried in order.
    pub mirrors: Vec<String>,
}

impl MirrorRule {
    pub fn new(name: &str, host: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            host: HostPattern::new(host),
            path: PathPattern::parse(path),
            proxy: None,
            mirrors: Vec::new(),
        }
    }

    pub fn with_proxy(mut self, template: &str) -> Self {
        self.proxy = Some(template.to_string());
        self
    }

    pub fn with_mirror(mut self, template: &str) -> Self {
        self.mirrors.push(template.to_string());
        self
    }
}

/// What a matching rule produced for one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub rule: String,
    pub proxy_path: Option<String>,
    pub mirrors: Vec<Url>,
}

#[derive(Debug, Clone, Default)]
pub struct MirrorTable {
    rules: Vec<MirrorRule>,
}

impl MirrorTable {
    pub fn new(rules: Vec<MirrorRule>) -> Self {
        Self { rules }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in rules for the public icon CDNs.
    pub fn builtin() -> Self {
        Self::new(vec![
            MirrorRule::new(
                "phosphor-jsdelivr",
                "cdn.jsdelivr.net",
                "/npm/@phosphor-icons/core@{version}/assets/{style}/{file}",
            )
            .with_proxy("/icon-proxy/phosphor/{style}/{file}")
            .with_mirror("https://fastly.jsdelivr.net/npm/@phosphor-icons/core@{version}/assets/{style}/{file}")
            .with_mirror("https://unpkg.com/@phosphor-icons/core@{version}/assets/{style}/{file}"),
            MirrorRule::new(
                "phosphor-unpkg",
                "unpkg.com",
                "/@phosphor-icons/core@{version}/assets/{style}/{file}",
            )
            .with_proxy("/icon-proxy/phosphor/{style}/{file}")
            .with_mirror("https://cdn.jsdelivr.net/npm/@phosphor-icons/core@{version}/assets/{style}/{file}"),
        ])
    }

    pub fn push(&mut self, rule: MirrorRule) {
        self.rules.push(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First matching rule wins; `None` means pass through unchanged.
    pub fn rewrite(&self, url: &Url) -> Option<Rewrite> {
        let host = url.host_str()?;
        self.rules.iter().find_map(|rule| {
            if !rule.host.matches(host) {
                return None;
            }
            let captures = rule.path.matches(url.path())?;
            let mirrors = rule
                .mirrors
                .iter()
                .filter_map(|t| Url::parse(&fill(t, &captures)).ok())
                .filter(|m| m != url)
                .collect();
            Some(Rewrite {
                rule: rule.name.clone(),
                proxy_path: rule.proxy.as_deref().map(|t| fill(t, &captures)),
                mirrors,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_patterns() {
        assert!(HostPattern::new("cdn.example").matches("CDN.example"));
        assert!(HostPattern::new("*.example").matches("a.example"));
        assert!(!HostPattern::new("*.example").matches("example"));
        assert!(!HostPattern::new("cdn.example").matches("evil-cdn.example"));
    }

    #[test]
    fn path_pattern_captures_prefixed_segments() {
        let p = PathPattern::parse("/npm/@x/core@{version}/assets/{style}/{file}");
        let caps = p.matches("/npm/@x/core@2.1.0/assets/duotone/folder-duotone.svg").unwrap();
        assert_eq!(caps["version"], "2.1.0");
        assert_eq!(caps["style"], "duotone");
        assert_eq!(caps["file"], "folder-duotone.svg");
        assert!(p.matches("/npm/@x/core@2.1.0/assets/duotone").is_none());
        assert!(p.matches("/npm/@y/core@2.1.0/assets/duotone/a.svg").is_none());
    }

    #[test]
    fn wildcard_segment() {
        let p = PathPattern::parse("/a/*/c");
        assert!(p.matches("/a/anything/c").is_some());
        assert!(p.matches("/a/anything/d").is_none());
    }

    #[test]
    fn builtin_rewrites_preserve_style() {
        let table = MirrorTable::builtin();
        let url = Url::parse(
            "https://cdn.jsdelivr.net/npm/@phosphor-icons/core@2.1.1/assets/bold/house-bold.svg",
        )
        .unwrap();
        let rw = table.rewrite(&url).unwrap();
        assert_eq!(rw.rule, "phosphor-jsdelivr");
        assert_eq!(
            rw.proxy_path.as_deref(),
            Some("/icon-proxy/phosphor/bold/house-bold.svg")
        );
        assert_eq!(rw.mirrors.len(), 2);
        assert_eq!(rw.mirrors[0].host_str(), Some("fastly.jsdelivr.net"));
        assert!(rw.mirrors[1].as_str().contains("/assets/bold/house-bold.svg"));
    }

    #[test]
    fn unknown_urls_pass_through() {
        let table = MirrorTable::builtin();
        let url = Url::parse("https://example.com/icons/a.svg").unwrap();
        assert!(table.rewrite(&url).is_none());
    }

    #[test]
    fn first_match_wins() {
        let table = MirrorTable::new(vec![
            MirrorRule::new("first", "*.example", "/{file}").with_proxy("/p1/{file}"),
            MirrorRule::new("second", "cdn.example", "/{file}").with_proxy("/p2/{file}"),
        ]);
        let url = Url::parse("https://cdn.example/a.svg").unwrap();
        assert_eq!(table.rewrite(&url).unwrap().rule, "first");
    }
}
