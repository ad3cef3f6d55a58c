//! Key -> safe filename mapping.

use std::fmt;

/// The two content namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Vector,
    Raster,
}

impl Namespace {
    pub const ALL: [Namespace; 2] = [Namespace::Vector, Namespace::Raster];

    pub fn dir(self) -> &'static str {
        match self {
            Namespace::Vector => "vector",
            Namespace::Raster => "raster",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir())
    }
}

/// Addresses one record: vector originals by key, rasters by key + bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlobKey {
    Vector(String),
    Raster { key: String, bucket: u32 },
}

impl BlobKey {
    pub fn vector(key: impl Into<String>) -> Self {
        BlobKey::Vector(key.into())
    }

    pub fn raster(key: impl Into<String>, bucket: u32) -> Self {
        BlobKey::Raster {
            key: key.into(),
            bucket,
        }
    }

    pub fn namespace(&self) -> Namespace {
        match self {
            BlobKey::Vector(_) => Namespace::Vector,
            BlobKey::Raster { .. } => Namespace::Raster,
        }
    }

    /// `vector/<sanitized>.svg` or `raster/<sanitized>@<bucket>.png`.
    pub fn path(&self, max_len: usize) -> String {
        match self {
            BlobKey::Vector(key) => format!("vector/{}.svg", sanitize(key, max_len)),
            BlobKey::Raster { key, bucket } => {
                format!("raster/{}@{}.png", sanitize(key, max_len), bucket)
            }
        }
    }
}

/// Strip path-control characters and cap the length.
///
/// Any name that had to be rewritten or truncated gets an FNV-1a suffix of
/// the full key, so `a:b_c` and `a_b:c` land in different files.
pub fn sanitize(key: &str, max_len: usize) -> String {
    let mut out: String = key
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '%' | '#' | '@' => '_',
            c if c.is_control() || c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    if out.starts_with('.') {
        out.replace_range(..1, "_");
    }
    if out.is_empty() {
        out.push('_');
    }
    if out == key && out.len() <= max_len {
        return out;
    }
    let suffix = format!("-{:016x}", fnv1a(key.as_bytes()));
    let mut cut = max_len.saturating_sub(suffix.len()).min(out.len());
    while !out.is_char_boundary(cut) {
        cut -= 1;
    }
    out.truncate(cut);
    out.push_str(&suffix);
    out
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_path_control() {
        let url = sanitize("https://app.example/icons/a b.svg?x=1", 180);
        assert!(url.starts_with("https___app.example_icons_a_b.svg_x=1-"));
        assert!(!url.contains('/'));
        assert!(sanitize("../../etc/passwd", 180).starts_with("_._.._etc_passwd-"));
        assert!(sanitize("", 180).starts_with("_-"));
    }

    #[test]
    fn plain_keys_are_kept_verbatim() {
        assert_eq!(sanitize("folder-bold", 180), "folder-bold");
        assert_eq!(sanitize("a_b", 180), "a_b");
    }

    #[test]
    fn rewritten_keys_do_not_collide() {
        assert_ne!(sanitize("a:b_c", 180), sanitize("a_b:c", 180));
        assert_ne!(sanitize("a_b_c", 180), sanitize("a:b_c", 180));
        assert_ne!(
            sanitize("https://app.example/a.svg?v=1", 180),
            sanitize("https://app.example/a.svg_v=1", 180)
        );
        assert_ne!(
            BlobKey::raster("a:b_c", 64).path(180),
            BlobKey::raster("a_b:c", 64).path(180)
        );
    }

    #[test]
    fn caps_length_with_stable_suffix() {
        let long_a = format!("https://cdn.example/{}", "a".repeat(400));
        let long_b = format!("https://cdn.example/{}b", "a".repeat(399));
        let a = sanitize(&long_a, 64);
        let b = sanitize(&long_b, 64);
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(a, sanitize(&long_a, 64));
    }

    #[test]
    fn layout_paths() {
        assert_eq!(BlobKey::vector("k").path(180), "vector/k.svg");
        assert_eq!(BlobKey::raster("k", 64).path(180), "raster/k@64.png");
        assert_eq!(BlobKey::raster("k", 64).namespace(), Namespace::Raster);
    }
}
