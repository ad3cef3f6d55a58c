//! Rasterizer - vector を bucket サイズのラスタに焼く
//!
//! 描画失敗はプレースホルダ矩形で代替する。空の結果より見た目の崩れを優先。
//! surface 生成や export の失敗だけは `DeclarationValue::None` になる。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::domain::{AssetPayload, DeclarationValue, DecodeError, MIN_BUCKET, Representation};
use crate::ports::{DecodedImage, RasterHost, RasterSurface, Rgba};
use crate::store::{BlobKey, TieredStore};

/// Neutral translucent gray.
pub const PLACEHOLDER: Rgba = Rgba {
    r: 128,
    g: 128,
    b: 128,
    a: 0.35,
};

/// Where the image lands on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub surface: u32,
    pub dx: i64,
    pub dy: i64,
    pub dw: u32,
    pub dh: u32,
}

/// Uniform scale into `bucket`, centered on a `max(bucket, MIN_BUCKET)`
/// surface with floored offsets. No distortion, no cropping.
pub fn placement(width: f64, height: f64, bucket: u32) -> Result<Placement, DecodeError> {
    if !(width.is_finite() && height.is_finite()) || width <= 0.0 || height <= 0.0 {
        return Err(DecodeError::NoIntrinsicSize);
    }
    let surface = bucket.max(MIN_BUCKET);
    let target = f64::from(bucket);
    let scale = (target / width).min(target / height);
    let w = width * scale;
    let h = height * scale;
    let side = f64::from(surface);
    Ok(Placement {
        surface,
        dx: ((side - w) / 2.0).floor() as i64,
        dy: ((side - h) / 2.0).floor() as i64,
        dw: w.round().max(1.0) as u32,
        dh: h.round().max(1.0) as u32,
    })
}

pub struct Rasterizer {
    host: Arc<dyn RasterHost>,
    store: Arc<TieredStore>,
    memo: Mutex<HashMap<(String, u32), DeclarationValue>>,
}

impl Rasterizer {
    pub fn new(host: Arc<dyn RasterHost>, store: Arc<TieredStore>) -> Self {
        Self {
            host,
            store,
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub async fn rasterize(
        &self,
        vector: &Representation,
        bucket: u32,
        cache_key: &str,
    ) -> DeclarationValue {
        let memo_key = (cache_key.to_string(), bucket);
        if let Some(hit) = self.memo_get(&memo_key) {
            return hit;
        }

        let blob_key = BlobKey::raster(cache_key, bucket);
        if let Some(bytes) = self.store.get(&blob_key).await
            && !bytes.is_empty()
        {
            debug!(cache_key, bucket, "raster store hit");
            let value = DeclarationValue::url(AssetPayload::raster(bytes).to_representation());
            return self.remember(memo_key, value);
        }

        let size = bucket.max(MIN_BUCKET);
        let mut surface = match self.host.create_surface(size) {
            Ok(surface) => surface,
            Err(e) => {
                warn!(cache_key, bucket, error = %e, "no raster surface");
                return DeclarationValue::None;
            }
        };

        let drawn = match self.host.decode(vector).await {
            Ok(image) => draw(surface.as_mut(), &image, bucket),
            Err(e) => Err(e),
        };
        if let Err(e) = drawn {
            debug!(cache_key, bucket, error = %e, "draw failed, painting placeholder");
            surface.fill_rect(0, 0, size, size, PLACEHOLDER);
        }

        let output = match surface.export().await {
            Ok(output) => output,
            Err(e) => {
                warn!(cache_key, bucket, error = %e, "raster export failed");
                return DeclarationValue::None;
            }
        };

        let store = Arc::clone(&self.store);
        let bytes = output.bytes.clone();
        tokio::spawn(async move {
            store.put(&blob_key, bytes).await;
        });

        self.remember(memo_key, DeclarationValue::url(output.representation))
    }

    fn memo_get(&self, key: &(String, u32)) -> Option<DeclarationValue> {
        self.memo
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn remember(&self, key: (String, u32), value: DeclarationValue) -> DeclarationValue {
        self.memo
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, value.clone());
        value
    }

    pub fn clear_memo(&self) {
        self.memo.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

fn draw(
    surface: &mut dyn RasterSurface,
    image: &DecodedImage,
    bucket: u32,
) -> Result<(), DecodeError> {
    let at = placement(image.width, image.height, bucket)?;
    surface.draw_image(image, at.dx, at.dy, at.dw, at.dh)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rstest::rstest;

    use super::*;
    use crate::config::StoreConfig;
    use crate::domain::{AssetPayload, MAX_BUCKET};
    use crate::impls::{DrawOp, GeometryRasterHost, MemoryBlobBackend};
    use crate::ports::FixedClock;

    fn svg(width: u32, height: u32) -> Representation {
        let body = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}"/>"#
        );
        AssetPayload::vector(body.into_bytes()).to_representation()
    }

    fn rasterizer() -> (Arc<GeometryRasterHost>, Arc<MemoryBlobBackend>, Rasterizer) {
        let host = Arc::new(GeometryRasterHost::new());
        let backend = Arc::new(MemoryBlobBackend::new());
        let store = Arc::new(TieredStore::new(
            Some(backend.clone()),
            Arc::new(FixedClock::new(Utc::now())),
            StoreConfig::default(),
        ));
        let rasterizer = Rasterizer::new(host.clone(), store);
        (host, backend, rasterizer)
    }

    #[rstest]
    #[case(200.0, 100.0, 64, (0, 16, 64, 32))]
    #[case(100.0, 200.0, 64, (16, 0, 32, 64))]
    #[case(24.0, 24.0, 32, (0, 0, 32, 32))]
    #[case(30.0, 10.0, 128, (0, 42, 128, 43))]
    fn centers_without_distortion(
        #[case] width: f64,
        #[case] height: f64,
        #[case] bucket: u32,
        #[case] expected: (i64, i64, u32, u32),
    ) {
        let at = placement(width, height, bucket).unwrap();
        assert_eq!((at.dx, at.dy, at.dw, at.dh), expected);
        assert_eq!(at.surface, bucket);
    }

    #[test]
    fn small_bucket_gets_minimum_surface() {
        let at = placement(10.0, 10.0, 16).unwrap();
        assert_eq!(at.surface, MIN_BUCKET);
        assert_eq!((at.dw, at.dh), (16, 16));
        assert_eq!((at.dx, at.dy), (8, 8));
    }

    #[test]
    fn zero_size_has_no_placement() {
        assert_eq!(placement(0.0, 10.0, 64), Err(DecodeError::NoIntrinsicSize));
        assert_eq!(placement(f64::NAN, 10.0, 64), Err(DecodeError::NoIntrinsicSize));
    }

    #[tokio::test]
    async fn rasterizes_200_by_100_into_bucket_64() {
        let (host, _, rasterizer) = rasterizer();

        let value = rasterizer.rasterize(&svg(200, 100), 64, "wide:regular").await;

        assert!(matches!(value, DeclarationValue::Url(_)));
        let exported = host.exported();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].size, 64);
        assert_eq!(
            exported[0].ops,
            vec![DrawOp::Image {
                dx: 0,
                dy: 16,
                dw: 64,
                dh: 32
            }]
        );
    }

    #[tokio::test]
    async fn draw_failure_paints_placeholder() {
        let (host, _, rasterizer) = rasterizer();
        host.set_fail_draw(true);

        let value = rasterizer.rasterize(&svg(24, 24), 32, "broken:regular").await;

        assert!(!value.is_none());
        assert_eq!(
            host.exported()[0].ops,
            vec![DrawOp::Rect {
                x: 0,
                y: 0,
                w: 32,
                h: 32,
                color: PLACEHOLDER
            }]
        );
    }

    #[tokio::test]
    async fn undecodable_source_paints_placeholder() {
        let (host, _, rasterizer) = rasterizer();
        let garbage = Representation::new("data:text/plain,hello");

        let value = rasterizer.rasterize(&garbage, 64, "junk:regular").await;

        assert!(!value.is_none());
        assert!(matches!(host.exported()[0].ops[0], DrawOp::Rect { .. }));
    }

    #[tokio::test]
    async fn surface_failure_yields_none() {
        let (host, _, rasterizer) = rasterizer();
        host.set_fail_surface(true);

        let value = rasterizer.rasterize(&svg(24, 24), 32, "a:regular").await;

        assert_eq!(value, DeclarationValue::None);
    }

    #[tokio::test]
    async fn result_is_written_back_and_reused() {
        let (host, backend, rasterizer) = rasterizer();

        let first = rasterizer.rasterize(&svg(24, 24), MAX_BUCKET, "a:regular").await;
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        let path =
            BlobKey::raster("a:regular", MAX_BUCKET).path(StoreConfig::default().max_filename_len);
        assert!(backend.paths().contains(&path));

        rasterizer.clear_memo();
        let second = rasterizer.rasterize(&svg(24, 24), MAX_BUCKET, "a:regular").await;

        assert_eq!(first, second);
        assert_eq!(host.exported().len(), 1);
    }
}
