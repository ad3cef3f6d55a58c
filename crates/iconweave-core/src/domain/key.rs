//! Asset identity: logical name + variant + size bucket.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Smallest raster size class.
pub const MIN_BUCKET: u32 = 32;

/// Largest raster size class.
pub const MAX_BUCKET: u32 = 512;

/// Quantize a requested pixel size into a power-of-two bucket.
///
/// - `(0, MIN_BUCKET]` -> `MIN_BUCKET`
/// - otherwise the next power of two at or above `size`
/// - capped at `MAX_BUCKET`
///
/// Non-finite or non-positive sizes map to `MIN_BUCKET`.
pub fn quantize(size: f64) -> u32 {
    if !size.is_finite() || size <= f64::from(MIN_BUCKET) {
        return MIN_BUCKET;
    }
    if size >= f64::from(MAX_BUCKET) {
        return MAX_BUCKET;
    }
    let whole = size.ceil() as u32;
    whole.next_power_of_two().clamp(MIN_BUCKET, MAX_BUCKET)
}

/// AssetKey は dedup と rule key の単位
///
/// 文字列表現（`Display`）がそのまま identity になる。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetKey {
    logical_name: String,
    variant: String,
    bucket: u32,
}

impl AssetKey {
    /// Build a key from a raw size hint; the hint is quantized.
    pub fn new(logical_name: impl Into<String>, variant: impl Into<String>, size_hint: f64) -> Self {
        Self::with_bucket(logical_name, variant, quantize(size_hint))
    }

    /// Build a key from an already chosen bucket (clamped into range).
    pub fn with_bucket(
        logical_name: impl Into<String>,
        variant: impl Into<String>,
        bucket: u32,
    ) -> Self {
        Self {
            logical_name: logical_name.into(),
            variant: variant.into(),
            bucket: quantize(f64::from(bucket)),
        }
    }

    pub fn logical_name(&self) -> &str {
        &self.logical_name
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }

    pub fn bucket(&self) -> u32 {
        self.bucket
    }

    /// Selector the visual component styles itself with.
    pub fn selector(&self) -> String {
        format!(
            "[data-icon=\"{}\"][data-variant=\"{}\"][data-bucket=\"{}\"]",
            escape_attr(&self.logical_name),
            escape_attr(&self.variant),
            self.bucket
        )
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.logical_name, self.variant, self.bucket)
    }
}

fn escape_attr(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.5, 32)]
    #[case(10.0, 32)]
    #[case(32.0, 32)]
    #[case(33.0, 64)]
    #[case(48.0, 64)]
    #[case(64.0, 64)]
    #[case(200.0, 256)]
    #[case(512.0, 512)]
    #[case(513.0, 512)]
    #[case(4096.0, 512)]
    fn quantize_grid(#[case] size: f64, #[case] expected: u32) {
        assert_eq!(quantize(size), expected);
    }

    #[test]
    fn quantize_is_monotonic_and_power_of_two() {
        let mut previous = 0;
        for tenth in 1..6000 {
            let bucket = quantize(f64::from(tenth) / 10.0);
            assert!(bucket >= previous);
            assert!(bucket.is_power_of_two());
            assert!((MIN_BUCKET..=MAX_BUCKET).contains(&bucket));
            previous = bucket;
        }
    }

    #[test]
    fn quantize_handles_garbage_input() {
        assert_eq!(quantize(-3.0), MIN_BUCKET);
        assert_eq!(quantize(f64::NAN), MIN_BUCKET);
        assert_eq!(quantize(f64::INFINITY), MIN_BUCKET);
    }

    #[test]
    fn key_identity_is_tuple_string() {
        let key = AssetKey::new("folder", "duotone", 48.0);
        assert_eq!(key.bucket(), 64);
        assert_eq!(key.to_string(), "folder:duotone:64");
        assert_eq!(key, AssetKey::with_bucket("folder", "duotone", 64));
    }

    #[test]
    fn selector_escapes_quotes() {
        let key = AssetKey::with_bucket("a\"b", "regular", 32);
        assert_eq!(
            key.selector(),
            "[data-icon=\"a\\\"b\"][data-variant=\"regular\"][data-bucket=\"32\"]"
        );
    }
}
