//! Rule-set persistence and the reload-stability check.

use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use crate::config::RegistryConfig;
use crate::domain::{OutputRule, PersistedRuleSet, extract_urls};
use crate::ports::{Clock, KeyValueStore};

/// `true` when every URL in `declaration` will still resolve after a
/// reload: same-origin, relative, or inline `data:`.
pub fn is_stable(origin: &Url, declaration: &str) -> bool {
    extract_urls(declaration).iter().all(|raw| {
        let raw = raw.trim();
        if raw.starts_with("data:") {
            return true;
        }
        if raw.starts_with("blob:") {
            return false;
        }
        match Url::parse(raw) {
            Ok(url) => matches!(url.scheme(), "http" | "https") && url.origin() == origin.origin(),
            Err(url::ParseError::RelativeUrlWithoutBase) => is_clean_relative(origin, raw),
            Err(_) => false,
        }
    })
}

/// A relative reference that joins onto `origin` without leaving it and
/// carries no stray quoting.
fn is_clean_relative(origin: &Url, raw: &str) -> bool {
    if raw.is_empty() || raw.starts_with("//") {
        return false;
    }
    if raw
        .chars()
        .any(|c| matches!(c, '"' | '\'' | '\\') || c.is_whitespace() || c.is_control())
    {
        return false;
    }
    origin
        .join(raw)
        .is_ok_and(|url| url.origin() == origin.origin())
}

/// Reads and writes the single versioned rule-set record.
pub struct RulePersistence {
    kv: Option<Arc<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
    config: RegistryConfig,
}

impl RulePersistence {
    pub fn new(
        kv: Option<Arc<dyn KeyValueStore>>,
        clock: Arc<dyn Clock>,
        config: RegistryConfig,
    ) -> Self {
        Self { kv, clock, config }
    }

    /// Persisted rules, or nothing when absent, unreadable, or past the TTL.
    ///
    /// Superseded keys are purged first.
    pub fn load(&self) -> Vec<OutputRule> {
        let Some(kv) = self.kv.as_deref() else {
            return Vec::new();
        };
        for legacy in &self.config.legacy_keys {
            if kv.get(legacy).is_some() {
                info!(key = %legacy, "purging legacy rule set");
                kv.remove(legacy);
            }
        }

        let Some(raw) = kv.get(&self.config.storage_key) else {
            return Vec::new();
        };
        let set: PersistedRuleSet = match serde_json::from_str(&raw) {
            Ok(set) => set,
            Err(e) => {
                warn!(error = %e, "discarding unreadable rule set");
                kv.remove(&self.config.storage_key);
                return Vec::new();
            }
        };

        let ttl_ms = i64::try_from(self.config.ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        let age = self.clock.now_millis().saturating_sub(set.timestamp);
        if age > ttl_ms {
            info!(age_ms = age, "rule set expired, discarding");
            kv.remove(&self.config.storage_key);
            return Vec::new();
        }
        set.rules
    }

    pub fn save(&self, rules: Vec<OutputRule>) -> bool {
        let Some(kv) = self.kv.as_deref() else {
            return false;
        };
        let count = rules.len();
        let set = PersistedRuleSet {
            rules,
            timestamp: self.clock.now_millis(),
        };
        let json = match serde_json::to_string(&set) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "cannot serialize rule set");
                return false;
            }
        };
        let ok = kv.set(&self.config.storage_key, &json);
        if ok {
            debug!(count, "rule set persisted");
        } else {
            debug!(count, "rule set write refused");
        }
        ok
    }
}
