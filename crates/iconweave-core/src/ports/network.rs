//! NetworkMonitor port - online/offline と回線品質

/// Effective connection class, when the host can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkQuality {
    Slow2g,
    TwoG,
    ThreeG,
    FourG,
}

impl NetworkQuality {
    /// Multiplier applied to the retry scheduler's inter-batch delay.
    pub fn delay_factor(self, slowdown: f64) -> f64 {
        match self {
            NetworkQuality::Slow2g => slowdown * 2.0,
            NetworkQuality::TwoG => slowdown,
            NetworkQuality::ThreeG => 1.0 + (slowdown - 1.0).max(0.0) / 2.0,
            NetworkQuality::FourG => 1.0,
        }
    }
}

pub trait NetworkMonitor: Send + Sync {
    fn is_online(&self) -> bool;

    /// `None` when the host has no quality signal.
    fn quality(&self) -> Option<NetworkQuality> {
        None
    }
}
