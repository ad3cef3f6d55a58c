//! MemoryChannel - ルールを順番に記録する出力チャネル

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::domain::ChannelError;
use crate::ports::{ChannelProvider, OutputChannel};

#[derive(Default)]
pub struct MemoryChannel {
    rules: Mutex<Vec<(String, String)>>,
    disconnected: AtomicBool,
    inserts_left: Mutex<Option<usize>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the host surface being torn down.
    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    /// Accept `inserts` more rules, then behave as torn down.
    pub fn disconnect_after(&self, inserts: usize) {
        *self.inserts_left.lock().unwrap_or_else(|e| e.into_inner()) = Some(inserts);
    }

    /// `(selector, declaration)` pairs in insertion order.
    pub fn rules(&self) -> Vec<(String, String)> {
        self.rules.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.rules.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render as a stylesheet.
    pub fn to_css(&self) -> String {
        self.rules()
            .iter()
            .map(|(selector, declaration)| format!("{selector} {{ {declaration}; }}\n"))
            .collect()
    }
}

impl OutputChannel for MemoryChannel {
    fn insert_rule(&self, selector: &str, declaration: &str) -> Result<(), ChannelError> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(ChannelError::Disconnected);
        }
        if let Some(left) = self
            .inserts_left
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_mut()
        {
            if *left == 0 {
                self.disconnected.store(true, Ordering::SeqCst);
                return Err(ChannelError::Disconnected);
            }
            *left -= 1;
        }
        if selector.trim().is_empty() {
            return Err(ChannelError::Rejected("empty selector".to_string()));
        }
        self.rules
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((selector.to_string(), declaration.to_string()));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
    }
}

/// Hands out a fresh `MemoryChannel` on every acquisition.
#[derive(Default)]
pub struct MemoryChannelProvider {
    current: Mutex<Option<Arc<MemoryChannel>>>,
    acquisitions: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryChannelProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// The channel most recently handed out.
    pub fn current(&self) -> Option<Arc<MemoryChannel>> {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl ChannelProvider for MemoryChannelProvider {
    fn acquire(&self) -> Option<Arc<dyn OutputChannel>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return None;
        }
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        let channel = Arc::new(MemoryChannel::new());
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&channel));
        Some(channel)
    }
}
