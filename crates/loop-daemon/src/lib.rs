//! The loop status refresh engine: a single-owner event loop that polls the
//! device-status feed, keeps the current snapshot and tells subscribers when
//! it changes.

pub mod clock;
pub mod core;
pub mod fetch;
pub mod notify;

pub use crate::core::{
    LoopCore, LoopEvent, LoopHandle, LoopStatus, RefreshOutcome, RefreshStats, SchedulerState,
    POLL_INTERVAL,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use fetch::{FeedSource, FetchError, LoopError, NightscoutSource};
pub use notify::{ChangeNotifier, LoopChanged, Subscription};
