//! OutputRegistry - 解決済みアセットを出力チャネルへコミットする
//!
//! # 設計原則
//! - 同じキーは 1 度だけコミット（committed / pending の両方で重複排除）
//! - placeholder ルールは本物のルールが来たら置き換えられる。永続化はしない
//! - `register` は pending に積み、flush は spawn したタスクでまとめて行う
//! - flush は挿入順を保持する
//! - 永続化するのはリロード後も有効なルールだけ（same-origin / data:）
//! - チャネルが切断されていたら次の利用時に再取得して restore し、pending を流す

pub mod persist;

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::RegistryConfig;
use crate::domain::{ChannelError, OutputRule};
use crate::ports::{ChannelProvider, Clock, KeyValueStore, OutputChannel};

pub use self::persist::{RulePersistence, is_stable};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub committed: usize,
    pub pending: usize,
    pub placeholders: usize,
    pub connected: bool,
}

#[derive(Default)]
struct RegistryState {
    channel: Option<Arc<dyn OutputChannel>>,
    committed: Vec<OutputRule>,
    committed_keys: HashSet<String>,
    placeholder_keys: HashSet<String>,
    pending: VecDeque<OutputRule>,
    flush_scheduled: bool,
}

impl RegistryState {
    fn is_pending(&self, key: &str) -> bool {
        self.pending.iter().any(|r| r.key == key)
    }

    /// Committed with real content, or waiting for a flush.
    fn is_satisfied(&self, key: &str) -> bool {
        (self.committed_keys.contains(key) && !self.placeholder_keys.contains(key))
            || self.is_pending(key)
    }

    /// Uncommitted keys always land; a placeholder only gives way to a real rule.
    fn can_commit(&self, rule: &OutputRule) -> bool {
        if !self.committed_keys.contains(&rule.key) {
            return true;
        }
        self.placeholder_keys.contains(&rule.key) && !rule.placeholder
    }

    fn commit(&mut self, rule: OutputRule) {
        if !self.committed_keys.insert(rule.key.clone()) {
            self.committed.retain(|r| r.key != rule.key);
        }
        if rule.placeholder {
            self.placeholder_keys.insert(rule.key.clone());
        } else {
            self.placeholder_keys.remove(&rule.key);
        }
        self.committed.push(rule);
    }

    fn reset_committed(&mut self) {
        self.committed.clear();
        self.committed_keys.clear();
        self.placeholder_keys.clear();
    }
}

pub struct OutputRegistry {
    provider: Arc<dyn ChannelProvider>,
    persistence: RulePersistence,
    origin: Url,
    state: Mutex<RegistryState>,
}

impl OutputRegistry {
    pub fn new(
        provider: Arc<dyn ChannelProvider>,
        kv: Option<Arc<dyn KeyValueStore>>,
        clock: Arc<dyn Clock>,
        origin: Url,
        config: RegistryConfig,
    ) -> Self {
        Self {
            provider,
            persistence: RulePersistence::new(kv, clock, config),
            origin,
            state: Mutex::new(RegistryState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a rule. Returns `false` when `key` is already committed or pending.
    ///
    /// The flush runs on a spawned task, so a tokio runtime is required.
    pub fn register(
        self: &Arc<Self>,
        key: impl Into<String>,
        selector: impl Into<String>,
        declaration: impl Into<String>,
    ) -> bool {
        self.enqueue(OutputRule::new(key, selector, declaration))
    }

    /// Like [`register`](Self::register), for a rule standing in for an
    /// unavailable icon. It is shown but never persisted, and a later real
    /// rule for the same key replaces it.
    pub fn register_placeholder(
        self: &Arc<Self>,
        key: impl Into<String>,
        selector: impl Into<String>,
        declaration: impl Into<String>,
    ) -> bool {
        self.enqueue(OutputRule::new(key, selector, declaration).as_placeholder())
    }

    fn enqueue(self: &Arc<Self>, rule: OutputRule) -> bool {
        let schedule = {
            let mut state = self.lock();
            if state.is_pending(&rule.key) || !state.can_commit(&rule) {
                return false;
            }
            state.pending.push_back(rule);
            !std::mem::replace(&mut state.flush_scheduled, true)
        };
        if schedule {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                this.flush();
            });
        }
        true
    }

    /// Commit every pending rule in insertion order; returns how many landed.
    pub fn flush(&self) -> usize {
        let (channel, _) = self.current_channel();
        let mut state = self.lock();
        state.flush_scheduled = false;
        let Some(channel) = channel else {
            debug!(pending = state.pending.len(), "no output channel, flush deferred");
            return 0;
        };
        self.drain_pending(&mut state, &channel)
    }

    fn drain_pending(&self, state: &mut RegistryState, channel: &Arc<dyn OutputChannel>) -> usize {
        let mut landed = 0;
        while let Some(rule) = state.pending.pop_front() {
            if !state.can_commit(&rule) {
                continue;
            }
            match channel.insert_rule(&rule.selector, &rule.declaration) {
                Ok(()) => {
                    debug!(key = %rule.key, placeholder = rule.placeholder, "rule committed");
                    state.commit(rule);
                    landed += 1;
                }
                Err(ChannelError::Disconnected) => {
                    warn!(key = %rule.key, "output channel disconnected during flush");
                    state.pending.push_front(rule);
                    break;
                }
                Err(e) => {
                    warn!(key = %rule.key, error = %e, "rule rejected");
                }
            }
        }
        if landed > 0 {
            self.persist(state);
        }
        landed
    }

    /// Re-insert persisted rules not yet committed this session.
    pub fn restore(&self, channel: &Arc<dyn OutputChannel>) -> usize {
        let mut state = self.lock();
        self.restore_into(&mut state, channel)
    }

    fn restore_into(&self, state: &mut RegistryState, channel: &Arc<dyn OutputChannel>) -> usize {
        let mut restored = 0;
        for rule in self.persistence.load() {
            if !state.can_commit(&rule) {
                continue;
            }
            if !is_stable(&self.origin, &rule.declaration) {
                debug!(key = %rule.key, "skipping unstable persisted rule");
                continue;
            }
            match channel.insert_rule(&rule.selector, &rule.declaration) {
                Ok(()) => {
                    state.commit(rule);
                    restored += 1;
                }
                Err(ChannelError::Disconnected) => {
                    warn!("output channel disconnected during restore");
                    break;
                }
                Err(e) => warn!(key = %rule.key, error = %e, "persisted rule rejected"),
            }
        }
        if restored > 0 {
            info!(restored, "rules restored");
        }
        restored
    }

    /// Current channel if it is still connected; otherwise re-acquire,
    /// restore, and flush whatever was left pending.
    ///
    /// Hosts call this from visibility / focus re-entry signals.
    pub fn ensure_channel(&self) -> Option<Arc<dyn OutputChannel>> {
        let (channel, reacquired) = self.current_channel();
        let channel = channel?;
        if reacquired {
            let mut state = self.lock();
            if !state.pending.is_empty() {
                let landed = self.drain_pending(&mut state, &channel);
                debug!(landed, "pending rules flushed onto new channel");
            }
        }
        Some(channel)
    }

    /// Second element is `true` when a new channel was acquired.
    fn current_channel(&self) -> (Option<Arc<dyn OutputChannel>>, bool) {
        let mut state = self.lock();
        if let Some(channel) = &state.channel
            && channel.is_connected()
        {
            return (Some(Arc::clone(channel)), false);
        }
        if state.channel.is_some() {
            info!("output channel lost, re-acquiring");
        }
        let channel = self.reacquire(&mut state);
        let reacquired = channel.is_some();
        (channel, reacquired)
    }

    fn reacquire(&self, state: &mut RegistryState) -> Option<Arc<dyn OutputChannel>> {
        state.reset_committed();
        state.channel = self.provider.acquire();
        let channel = state.channel.clone()?;
        self.restore_into(state, &channel);
        Some(channel)
    }

    /// `clear` + re-acquire + restore. Returns whether a channel was acquired.
    pub fn reinitialize(&self) -> bool {
        let mut state = self.lock();
        state.pending.clear();
        state.flush_scheduled = false;
        let acquired = self.reacquire(&mut state).is_some();
        info!(acquired, committed = state.committed.len(), "registry reinitialized");
        acquired
    }

    /// Forget committed and pending rules. Persisted state is untouched.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.reset_committed();
        state.pending.clear();
        state.flush_scheduled = false;
    }

    /// Committed with real content, or waiting for a flush. A committed
    /// placeholder does not count.
    pub fn has(&self, key: &str) -> bool {
        self.lock().is_satisfied(key)
    }

    /// Committed in this session, placeholder or not.
    pub fn is_committed(&self, key: &str) -> bool {
        self.lock().committed_keys.contains(key)
    }

    pub fn is_placeholder(&self, key: &str) -> bool {
        self.lock().placeholder_keys.contains(key)
    }

    pub fn committed(&self) -> Vec<OutputRule> {
        self.lock().committed.clone()
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.lock();
        RegistryStats {
            committed: state.committed.len(),
            pending: state.pending.len(),
            placeholders: state.placeholder_keys.len(),
            connected: state.channel.as_ref().is_some_and(|c| c.is_connected()),
        }
    }

    fn persist(&self, state: &RegistryState) {
        let stable: Vec<OutputRule> = state
            .committed
            .iter()
            .filter(|rule| !rule.placeholder && is_stable(&self.origin, &rule.declaration))
            .cloned()
            .collect();
        self.persistence.save(stable);
    }
}
