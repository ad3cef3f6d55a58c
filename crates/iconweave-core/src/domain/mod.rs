//! Domain model (keys, references, declaration values, rules, errors).
//!
//! 副作用を持たない型だけを置く。I/O は ports 経由。

pub mod declaration;
pub mod errors;
pub mod key;
pub mod reference;
pub mod rule;

pub use declaration::{DeclarationValue, IMAGE_PROPERTY, extract_urls};
pub use errors::{ChannelError, DecodeError, ErrorKind, FetchError, StoreError};
pub use key::{AssetKey, MAX_BUCKET, MIN_BUCKET, quantize};
pub use reference::{
    AssetPayload, FALLBACK_SVG, PayloadKind, Producer, Reference, Representation,
    fallback_representation, looks_like_vector,
};
pub use rule::{OutputRule, PersistedRuleSet};
