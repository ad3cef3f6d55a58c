//! GeometryRasterHost - 描画命令だけを記録するソフトウェア RasterHost
//!
//! 実際のピクセルは作らない。SVG のルート要素から intrinsic size を読み取り、
//! `draw_image` / `fill_rect` を記録して、決定的な PNG タグ付き payload を出力する。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};

use crate::domain::{AssetPayload, DecodeError, Representation};
use crate::ports::{DecodedImage, RasterHost, RasterOutput, RasterSurface, Rgba};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// One recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Image { dx: i64, dy: i64, dw: u32, dh: u32 },
    Rect { x: i64, y: i64, w: u32, h: u32, color: Rgba },
}

/// Everything drawn on one exported surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceRecord {
    pub size: u32,
    pub ops: Vec<DrawOp>,
}

#[derive(Default)]
pub struct GeometryRasterHost {
    exported: Arc<Mutex<Vec<SurfaceRecord>>>,
    decodes: AtomicUsize,
    fail_draw: Arc<AtomicBool>,
    fail_surface: AtomicBool,
}

impl GeometryRasterHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_draw(&self, fail: bool) {
        self.fail_draw.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_surface(&self, fail: bool) {
        self.fail_surface.store(fail, Ordering::SeqCst);
    }

    pub fn exported(&self) -> Vec<SurfaceRecord> {
        self.exported.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RasterHost for GeometryRasterHost {
    async fn decode(&self, source: &Representation) -> Result<DecodedImage, DecodeError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        let bytes = source
            .decode_inline()
            .ok_or_else(|| DecodeError::Decode(format!("not an inline source: {source}")))?;
        let (width, height) = if let Some(rest) = bytes.strip_prefix(PNG_SIGNATURE) {
            png_size(rest)?
        } else {
            svg_size(&bytes)?
        };
        Ok(DecodedImage {
            source: source.clone(),
            width,
            height,
        })
    }

    fn create_surface(&self, size: u32) -> Result<Box<dyn RasterSurface>, DecodeError> {
        if self.fail_surface.load(Ordering::SeqCst) || size == 0 {
            return Err(DecodeError::Surface(format!("cannot allocate {size}x{size}")));
        }
        Ok(Box::new(GeometrySurface {
            size,
            ops: Vec::new(),
            fail_draw: Arc::clone(&self.fail_draw),
            exported: Arc::clone(&self.exported),
        }))
    }
}

struct GeometrySurface {
    size: u32,
    ops: Vec<DrawOp>,
    fail_draw: Arc<AtomicBool>,
    exported: Arc<Mutex<Vec<SurfaceRecord>>>,
}

#[async_trait]
impl RasterSurface for GeometrySurface {
    fn size(&self) -> u32 {
        self.size
    }

    fn draw_image(
        &mut self,
        _image: &DecodedImage,
        dx: i64,
        dy: i64,
        dw: u32,
        dh: u32,
    ) -> Result<(), DecodeError> {
        if self.fail_draw.load(Ordering::SeqCst) {
            return Err(DecodeError::Draw("tainted source".to_string()));
        }
        self.ops.push(DrawOp::Image { dx, dy, dw, dh });
        Ok(())
    }

    fn fill_rect(&mut self, x: i64, y: i64, w: u32, h: u32, color: Rgba) {
        self.ops.push(DrawOp::Rect { x, y, w, h, color });
    }

    async fn export(self: Box<Self>) -> Result<RasterOutput, DecodeError> {
        let mut buf = BytesMut::with_capacity(PNG_SIGNATURE.len() + 8 + self.ops.len() * 24);
        buf.put_slice(PNG_SIGNATURE);
        buf.put_u32(self.size);
        buf.put_u32(self.size);
        for op in &self.ops {
            match op {
                DrawOp::Image { dx, dy, dw, dh } => {
                    buf.put_u8(b'I');
                    buf.put_i64(*dx);
                    buf.put_i64(*dy);
                    buf.put_u32(*dw);
                    buf.put_u32(*dh);
                }
                DrawOp::Rect { x, y, w, h, .. } => {
                    buf.put_u8(b'R');
                    buf.put_i64(*x);
                    buf.put_i64(*y);
                    buf.put_u32(*w);
                    buf.put_u32(*h);
                }
            }
        }
        let bytes = buf.freeze();
        self.exported
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SurfaceRecord {
                size: self.size,
                ops: self.ops.clone(),
            });
        Ok(RasterOutput {
            representation: AssetPayload::raster(bytes.clone()).to_representation(),
            bytes,
        })
    }
}

fn png_size(rest: &[u8]) -> Result<(f64, f64), DecodeError> {
    if rest.len() < 8 {
        return Err(DecodeError::Decode("truncated raster header".to_string()));
    }
    let w = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
    let h = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]);
    Ok((f64::from(w), f64::from(h)))
}

/// Intrinsic size from the `<svg>` root: `width`/`height`, else `viewBox`.
fn svg_size(bytes: &Bytes) -> Result<(f64, f64), DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|e| DecodeError::Decode(e.to_string()))?;
    let start = text
        .find("<svg")
        .ok_or_else(|| DecodeError::Decode("no <svg> root".to_string()))?;
    let end = text[start..]
        .find('>')
        .map(|i| start + i)
        .ok_or_else(|| DecodeError::Decode("unterminated <svg> tag".to_string()))?;
    let tag = &text[start..end];

    let width = attr(tag, "width").and_then(parse_length);
    let height = attr(tag, "height").and_then(parse_length);
    if let (Some(w), Some(h)) = (width, height) {
        return Ok((w, h));
    }
    let view_box: Vec<f64> = attr(tag, "viewBox")
        .map(|vb| {
            vb.split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .filter_map(|s| s.parse().ok())
                .collect()
        })
        .unwrap_or_default();
    match view_box.as_slice() {
        [_, _, w, h] if *w > 0.0 && *h > 0.0 => Ok((*w, *h)),
        _ => Err(DecodeError::NoIntrinsicSize),
    }
}

fn attr<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    for quote in ['"', '\''] {
        let needle = format!(" {name}={quote}");
        if let Some(pos) = tag.find(&needle) {
            let rest = &tag[pos + needle.len()..];
            return rest.find(quote).map(|end| &rest[..end]);
        }
    }
    None
}

fn parse_length(raw: &str) -> Option<f64> {
    let number = raw.trim().trim_end_matches("px");
    number.parse::<f64>().ok().filter(|v| *v > 0.0)
}
