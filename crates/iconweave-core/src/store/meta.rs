//! Store metadata record (`.cache-meta.json`).

use serde::{Deserialize, Serialize};

pub const META_FILE: &str = ".cache-meta.json";

/// `{ version, created, lastAccess }`, timestamps in epoch ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMetadata {
    pub version: u32,
    pub created: i64,
    pub last_access: i64,
}

impl StoreMetadata {
    pub fn fresh(version: u32, now_ms: i64) -> Self {
        Self {
            version,
            created: now_ms,
            last_access: now_ms,
        }
    }

    /// Same record, touched at `now_ms`.
    pub fn touched(self, now_ms: i64) -> Self {
        Self {
            last_access: now_ms,
            ..self
        }
    }
}

/// Why a whole store gets wiped on open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictReason {
    VersionMismatch { found: u32, expected: u32 },
    Expired { idle_ms: i64 },
    OverSize { bytes: u64 },
    Malformed,
}
