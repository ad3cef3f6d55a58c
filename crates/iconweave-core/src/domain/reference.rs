//! What a caller hands the pipeline, and what it gets back.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use futures::future::BoxFuture;

use super::errors::FetchError;

/// Host-supplied content producer (e.g. a bundled glyph loader).
pub type Producer = Arc<dyn Fn() -> BoxFuture<'static, Result<Bytes, FetchError>> + Send + Sync>;

/// Reference は入口で一度だけ判定する tagged union
///
/// - `Path`: 正規化して store → network の順に解決
/// - `Inline`: 既にデコード済みの内容、そのまま表示用表現へ
/// - `Producer`: ホストが中身を生成する。timeout と retry の対象
#[derive(Clone)]
pub enum Reference {
    Path(String),
    Inline(Bytes),
    Producer(Producer),
}

impl Reference {
    pub fn path(raw: impl Into<String>) -> Self {
        Reference::Path(raw.into())
    }

    pub fn inline(bytes: impl Into<Bytes>) -> Self {
        Reference::Inline(bytes.into())
    }

    pub fn producer<F>(f: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<Bytes, FetchError>> + Send + Sync + 'static,
    {
        Reference::Producer(Arc::new(f))
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Path(raw) => f.debug_tuple("Path").field(raw).finish(),
            Reference::Inline(bytes) => write!(f, "Inline({} bytes)", bytes.len()),
            Reference::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

/// Payload content kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Vector,
    Raster,
}

impl PayloadKind {
    pub fn mime(self) -> &'static str {
        match self {
            PayloadKind::Vector => "image/svg+xml",
            PayloadKind::Raster => "image/png",
        }
    }
}

/// Raw bytes with their content kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPayload {
    pub kind: PayloadKind,
    pub bytes: Bytes,
}

impl AssetPayload {
    pub fn vector(bytes: impl Into<Bytes>) -> Self {
        Self {
            kind: PayloadKind::Vector,
            bytes: bytes.into(),
        }
    }

    pub fn raster(bytes: impl Into<Bytes>) -> Self {
        Self {
            kind: PayloadKind::Raster,
            bytes: bytes.into(),
        }
    }

    /// Encode as a self-contained `data:` URL.
    pub fn to_representation(&self) -> Representation {
        Representation::new(format!(
            "data:{};base64,{}",
            self.kind.mime(),
            STANDARD.encode(&self.bytes)
        ))
    }
}

/// A displayable, reusable URL (data URL, object handle, or plain URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Representation(String);

impl Representation {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_inline(&self) -> bool {
        self.0.starts_with("data:")
    }

    /// Decode a base64 `data:` URL back into bytes.
    pub fn decode_inline(&self) -> Option<Bytes> {
        let rest = self.0.strip_prefix("data:")?;
        let (meta, data) = rest.split_once(',')?;
        if meta.ends_with(";base64") {
            STANDARD.decode(data).ok().map(Bytes::from)
        } else {
            Some(Bytes::copy_from_slice(data.as_bytes()))
        }
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Structural check for vector markup: optional BOM / whitespace, then an
/// XML prolog or an `<svg` root.
pub fn looks_like_vector(bytes: &[u8]) -> bool {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let head = &bytes[start..];
    head.starts_with(b"<svg") || head.starts_with(b"<?xml")
}

/// Neutral placeholder glyph substituted when every path fails.
pub const FALLBACK_SVG: &str = concat!(
    r#"<svg xmlns="http://www.w3.org/2000/svg" width="24" height="24" viewBox="0 0 24 24">"#,
    r##"<rect x="3" y="3" width="18" height="18" rx="3" fill="none" stroke="#9e9e9e" stroke-width="2"/>"##,
    r##"<circle cx="12" cy="12" r="2" fill="#9e9e9e"/>"##,
    "</svg>"
);

pub fn fallback_representation() -> Representation {
    AssetPayload::vector(Bytes::from_static(FALLBACK_SVG.as_bytes())).to_representation()
}
