//! In-process task progress fan-out.
//!
//! - [`ProgressBroadcaster`]: per-task publish/subscribe hub for
//!   [`TaskRecord`](sculpt_core::task::TaskRecord) snapshots.

pub mod broadcaster;

pub use broadcaster::{ProgressBroadcaster, Subscription, SubscriptionHandle};
