//! LoopCore: the single-owner event loop of the loop status refresh engine.
//!
//! Every input (enable toggle, foreground/background, timer ticks, manual
//! refresh, fetch completions) arrives as a `LoopEvent` on one mpsc channel.
//! LoopCore owns the enabled/active flags, the poll timer, the in-flight
//! fetch and the current snapshot exclusively; nothing else mutates them.
//!
//! After each event the core republishes a `LoopStatus` for readers, and on
//! every accepted snapshot replacement it fires the `ChangeNotifier`.
//!
//! Fetches are single-flight. Each one gets a sequence number and runs in its
//! own task; starting a new fetch aborts the previous task, and a completion
//! is only honoured if its sequence number matches the fetch still in flight.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use loop_proto::settings::SettingsStore;
use loop_proto::{parse_feed, StatusSnapshot};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::fetch::{FeedSource, LoopError};
use crate::notify::{ChangeNotifier, Subscription};

/// How often the timer wakes up to check whether the snapshot went stale.
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

// ── LoopEvent ─────────────────────────────────────────────────────────────────

/// All inputs into the LoopCore loop.
#[derive(Debug)]
pub enum LoopEvent {
    /// The user toggled loop integration.
    SetEnabled(bool),
    /// The app moved to the foreground (`true`) or background.
    SetAppActive(bool),
    /// Poll timer fired.
    TimerTick,
    /// Manual refresh, ignores staleness.
    Refresh,
    /// A fetch task finished.
    FetchCompleted {
        seq: u64,
        result: Result<StatusSnapshot, LoopError>,
    },
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SchedulerState {
    #[default]
    Disabled,
    /// Enabled, app in background, no timer.
    Idle,
    /// Enabled, app active, timer armed.
    Scheduled,
    /// A fetch is outstanding.
    Fetching,
}

/// What became of a fetch completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New identity; the snapshot was replaced and subscribers notified.
    Accepted,
    /// Same identity as the current snapshot; dropped.
    Duplicate,
    /// Fetch or parse failed; previous snapshot kept.
    Failed,
    /// Completion of a fetch that was superseded or cancelled.
    Stale,
}

/// Counters over the lifetime of the core. Informational only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshStats {
    pub fetches_started: u64,
    pub updates_new: u64,
    pub updates_same: u64,
    pub failures: u64,
    pub stale_completions: u64,
    pub last_update_at: Option<DateTime<Utc>>,
}

/// Read-only view published after every event.
#[derive(Debug, Clone, Default)]
pub struct LoopStatus {
    /// Incremented on every publish.
    pub rev: u64,
    pub enabled: bool,
    pub app_active: bool,
    pub scheduler: SchedulerState,
    pub snapshot: Option<Arc<StatusSnapshot>>,
    pub stats: RefreshStats,
}

struct InFlight {
    seq: u64,
    task: AbortHandle,
}

// ── LoopCore ──────────────────────────────────────────────────────────────────

pub struct LoopCore {
    source: Arc<dyn FeedSource>,
    clock: Arc<dyn Clock>,
    settings: Arc<dyn SettingsStore>,
    /// Our own event channel, for timer and fetch tasks. Weak, so the channel
    /// closes once the last `LoopHandle` is dropped.
    event_tx: mpsc::WeakSender<LoopEvent>,
    notifier: ChangeNotifier,
    status: Arc<RwLock<LoopStatus>>,
    enabled: bool,
    app_active: bool,
    snapshot: Option<Arc<StatusSnapshot>>,
    timer: Option<AbortHandle>,
    in_flight: Option<InFlight>,
    /// Last sequence number handed out.
    last_seq: u64,
    stats: RefreshStats,
    rev: u64,
}

impl LoopCore {
    /// Build the core and its first handle. The enabled flag comes from
    /// `settings`; the app starts inactive, so nothing is fetched until the
    /// lifecycle source says so.
    ///
    /// `event_tx` moves into the handle. `run` ends once every handle is gone.
    pub fn new(
        source: Arc<dyn FeedSource>,
        clock: Arc<dyn Clock>,
        settings: Arc<dyn SettingsStore>,
        event_tx: mpsc::Sender<LoopEvent>,
    ) -> (Self, LoopHandle) {
        let enabled = settings.load_enabled();
        let status = LoopStatus {
            enabled,
            scheduler: if enabled {
                SchedulerState::Idle
            } else {
                SchedulerState::Disabled
            },
            ..LoopStatus::default()
        };

        let core = Self {
            source,
            clock,
            settings,
            event_tx: event_tx.downgrade(),
            notifier: ChangeNotifier::new(),
            status: Arc::new(RwLock::new(status)),
            enabled,
            app_active: false,
            snapshot: None,
            timer: None,
            in_flight: None,
            last_seq: 0,
            stats: RefreshStats::default(),
            rev: 0,
        };
        let handle = LoopHandle {
            event_tx,
            status: Arc::clone(&core.status),
            notifier: core.notifier.clone(),
        };
        (core, handle)
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        if !self.enabled {
            SchedulerState::Disabled
        } else if self.in_flight.is_some() {
            SchedulerState::Fetching
        } else if self.timer.is_some() {
            SchedulerState::Scheduled
        } else {
            SchedulerState::Idle
        }
    }

    pub fn current_snapshot(&self) -> Option<&Arc<StatusSnapshot>> {
        self.snapshot.as_ref()
    }

    /// Sequence number of the fetch still in flight, if any.
    pub fn in_flight_seq(&self) -> Option<u64> {
        self.in_flight.as_ref().map(|f| f.seq)
    }

    pub fn timer_armed(&self) -> bool {
        self.timer.is_some()
    }

    pub fn stats(&self) -> &RefreshStats {
        &self.stats
    }

    /// Run until a `Shutdown` event arrives or every sender is gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<LoopEvent>) -> anyhow::Result<()> {
        info!(
            "LoopCore: starting event loop (enabled={}, interval={:?})",
            self.enabled, POLL_INTERVAL
        );

        loop {
            match event_rx.recv().await {
                None => {
                    info!("LoopCore: event channel closed, shutting down");
                    break;
                }
                Some(LoopEvent::Shutdown) => {
                    info!("LoopCore: shutdown requested");
                    break;
                }
                Some(evt) => {
                    self.handle_event(evt).await;
                }
            }
        }

        self.stop_timer();
        self.cancel_fetch();
        self.publish().await;
        Ok(())
    }

    /// Apply one event. Returns the outcome for `FetchCompleted`, `None`
    /// for everything else.
    pub async fn handle_event(&mut self, evt: LoopEvent) -> Option<RefreshOutcome> {
        let outcome = match evt {
            LoopEvent::SetEnabled(enabled) => {
                self.set_enabled(enabled);
                None
            }
            LoopEvent::SetAppActive(active) => {
                self.set_app_active(active);
                None
            }
            LoopEvent::TimerTick => {
                self.on_timer_tick();
                None
            }
            LoopEvent::Refresh => {
                debug!("LoopCore: manual refresh");
                self.issue_fetch();
                None
            }
            LoopEvent::FetchCompleted { seq, result } => Some(self.on_fetch_completed(seq, result)),
            LoopEvent::Shutdown => {
                self.stop_timer();
                self.cancel_fetch();
                None
            }
        };

        self.publish().await;
        if outcome == Some(RefreshOutcome::Accepted) {
            self.notifier.notify();
        }
        outcome
    }

    // ── lifecycle ─────────────────────────────────────────────────────────────

    fn set_enabled(&mut self, enabled: bool) {
        if let Err(e) = self.settings.save_enabled(enabled) {
            warn!("LoopCore: failed to persist enabled={}: {}", enabled, e);
        }
        self.enabled = enabled;
        info!("LoopCore: enabled={} app_active={}", enabled, self.app_active);

        if !enabled {
            self.stop_timer();
            self.cancel_fetch();
        } else if self.app_active {
            self.start_timer();
            self.issue_fetch();
        }
    }

    fn set_app_active(&mut self, active: bool) {
        self.app_active = active;
        debug!("LoopCore: app_active={}", active);

        if !self.enabled {
            return;
        }
        if active {
            self.start_timer();
            self.issue_fetch();
        } else {
            self.stop_timer();
            self.cancel_fetch();
        }
    }

    fn on_timer_tick(&mut self) {
        // ticks queued before the timer was disarmed
        if self.timer.is_none() || !self.enabled || !self.app_active {
            debug!("LoopCore: ignoring tick, timer not armed");
            return;
        }

        let now = self.clock.now();
        let due = self
            .snapshot
            .as_ref()
            .map_or(true, |snapshot| snapshot.should_refresh(now));
        if due {
            self.issue_fetch();
        }
    }

    // ── timer ─────────────────────────────────────────────────────────────────

    fn start_timer(&mut self) {
        self.stop_timer();

        let tick_tx = self.event_tx.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(POLL_INTERVAL).await;
                let Some(tx) = tick_tx.upgrade() else {
                    break;
                };
                if tx.send(LoopEvent::TimerTick).await.is_err() {
                    break;
                }
            }
        });
        self.timer = Some(task.abort_handle());
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    // ── fetching ──────────────────────────────────────────────────────────────

    fn issue_fetch(&mut self) {
        self.cancel_fetch();

        self.last_seq += 1;
        let seq = self.last_seq;
        self.stats.fetches_started += 1;
        debug!("LoopCore: fetch #{} started", seq);

        let fetch = self.source.fetch();
        let done_tx = self.event_tx.clone();
        let task = tokio::spawn(async move {
            let result = match fetch.await {
                Ok(payload) => parse_feed(&payload).map_err(LoopError::from),
                Err(e) => Err(LoopError::from(e)),
            };
            if let Some(tx) = done_tx.upgrade() {
                let _ = tx.send(LoopEvent::FetchCompleted { seq, result }).await;
            }
        });
        self.in_flight = Some(InFlight {
            seq,
            task: task.abort_handle(),
        });
    }

    fn cancel_fetch(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            debug!("LoopCore: fetch #{} cancelled", in_flight.seq);
            in_flight.task.abort();
        }
    }

    fn on_fetch_completed(
        &mut self,
        seq: u64,
        result: Result<StatusSnapshot, LoopError>,
    ) -> RefreshOutcome {
        if self.in_flight_seq() != Some(seq) {
            debug!(
                "LoopCore: ignoring completion of fetch #{} (in flight: {:?})",
                seq,
                self.in_flight_seq()
            );
            self.stats.stale_completions += 1;
            return RefreshOutcome::Stale;
        }
        self.in_flight = None;

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("LoopCore: fetch #{} failed: {}", seq, e);
                self.stats.failures += 1;
                return RefreshOutcome::Failed;
            }
        };

        // Identity is the only criterion; an older snapshot with a different
        // id still replaces the current one.
        if self
            .snapshot
            .as_ref()
            .is_some_and(|current| current.id() == snapshot.id())
        {
            debug!("LoopCore: fetch #{} returned known entry {}", seq, snapshot.id());
            self.stats.updates_same += 1;
            return RefreshOutcome::Duplicate;
        }

        info!(
            "LoopCore: new loop status {} from {}",
            snapshot.id(),
            snapshot.timestamp()
        );
        self.snapshot = Some(Arc::new(snapshot));
        self.stats.updates_new += 1;
        self.stats.last_update_at = Some(self.clock.now());
        RefreshOutcome::Accepted
    }

    async fn publish(&mut self) {
        self.rev += 1;
        let scheduler = self.scheduler_state();
        let mut status = self.status.write().await;
        status.rev = self.rev;
        status.enabled = self.enabled;
        status.app_active = self.app_active;
        status.scheduler = scheduler;
        status.snapshot = self.snapshot.clone();
        status.stats = self.stats.clone();
    }
}

// ── LoopHandle ────────────────────────────────────────────────────────────────

/// Cloneable command and query surface for a running [`LoopCore`].
///
/// Commands are queued to the core; reads reflect the last published status,
/// so a read right after a command may not see its effect yet.
#[derive(Clone)]
pub struct LoopHandle {
    event_tx: mpsc::Sender<LoopEvent>,
    status: Arc<RwLock<LoopStatus>>,
    notifier: ChangeNotifier,
}

impl LoopHandle {
    pub async fn set_enabled(&self, enabled: bool) -> anyhow::Result<()> {
        self.send(LoopEvent::SetEnabled(enabled)).await
    }

    pub async fn set_app_active(&self, active: bool) -> anyhow::Result<()> {
        self.send(LoopEvent::SetAppActive(active)).await
    }

    pub async fn refresh(&self) -> anyhow::Result<()> {
        self.send(LoopEvent::Refresh).await
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.send(LoopEvent::Shutdown).await
    }

    async fn send(&self, evt: LoopEvent) -> anyhow::Result<()> {
        self.event_tx
            .send(evt)
            .await
            .map_err(|_| anyhow::anyhow!("loop core has stopped"))
    }

    pub async fn status(&self) -> LoopStatus {
        self.status.read().await.clone()
    }

    pub async fn enabled(&self) -> bool {
        self.status.read().await.enabled
    }

    pub async fn is_app_active(&self) -> bool {
        self.status.read().await.app_active
    }

    pub async fn scheduler_state(&self) -> SchedulerState {
        self.status.read().await.scheduler
    }

    pub async fn current_snapshot(&self) -> Option<Arc<StatusSnapshot>> {
        self.status.read().await.snapshot.clone()
    }

    pub async fn stats(&self) -> RefreshStats {
        self.status.read().await.stats.clone()
    }

    pub fn subscribe(&self) -> Subscription {
        self.notifier.subscribe()
    }
}
