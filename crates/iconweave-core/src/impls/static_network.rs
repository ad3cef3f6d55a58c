//! StaticNetwork - 手動で切り替える NetworkMonitor

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::ports::{NetworkMonitor, NetworkQuality};

pub struct StaticNetwork {
    online: AtomicBool,
    quality: Mutex<Option<NetworkQuality>>,
}

impl StaticNetwork {
    pub fn online() -> Self {
        Self {
            online: AtomicBool::new(true),
            quality: Mutex::new(None),
        }
    }

    pub fn offline() -> Self {
        let network = Self::online();
        network.set_online(false);
        network
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn set_quality(&self, quality: Option<NetworkQuality>) {
        *self.quality.lock().unwrap_or_else(|e| e.into_inner()) = quality;
    }
}

impl NetworkMonitor for StaticNetwork {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn quality(&self) -> Option<NetworkQuality> {
        *self.quality.lock().unwrap_or_else(|e| e.into_inner())
    }
}
