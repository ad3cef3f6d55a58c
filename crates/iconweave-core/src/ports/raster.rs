//! RasterHost port - ホストが提供するラスタライズ面
//!
//! 自前のラスタライザは持たない。decode と描画はホストに委譲する。

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::{DecodeError, Representation};

/// A decoded, drawable image.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub source: Representation,
    pub width: f64,
    pub height: f64,
}

/// Straight RGBA, alpha in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

/// Result of serializing a surface.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterOutput {
    pub representation: Representation,
    pub bytes: Bytes,
}

#[async_trait]
pub trait RasterSurface: Send {
    fn size(&self) -> u32;

    fn draw_image(
        &mut self,
        image: &DecodedImage,
        dx: i64,
        dy: i64,
        dw: u32,
        dh: u32,
    ) -> Result<(), DecodeError>;

    fn fill_rect(&mut self, x: i64, y: i64, w: u32, h: u32, color: Rgba);

    async fn export(self: Box<Self>) -> Result<RasterOutput, DecodeError>;
}

#[async_trait]
pub trait RasterHost: Send + Sync {
    /// Suspends until the host has decoded `source`.
    async fn decode(&self, source: &Representation) -> Result<DecodedImage, DecodeError>;

    fn create_surface(&self, size: u32) -> Result<Box<dyn RasterSurface>, DecodeError>;
}
