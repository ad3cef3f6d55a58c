//! OutputChannel port - 宣言的ルールの出力先（共有 1 本）

use std::sync::Arc;

use crate::domain::ChannelError;

pub trait OutputChannel: Send + Sync {
    /// Append one rule. Rules are applied in insertion order.
    fn insert_rule(&self, selector: &str, declaration: &str) -> Result<(), ChannelError>;

    /// `false` once the host surface has been torn down.
    fn is_connected(&self) -> bool;
}

/// Acquires (or re-acquires) the shared channel.
pub trait ChannelProvider: Send + Sync {
    fn acquire(&self) -> Option<Arc<dyn OutputChannel>>;
}
