//! Retry - 遅延バッチ再試行
//!
//! - **policy**: バックオフ計算と上限
//! - **state**: キュー内アイテムの状態遷移
//! - **scheduler**: ドレインループ本体

pub mod policy;
pub mod scheduler;
pub mod state;

pub use self::policy::RetryPolicy;
pub use self::scheduler::{QueuedRetry, RetryCounts, RetryDescriptor, RetryOp, RetryScheduler};
pub use self::state::RetryState;
