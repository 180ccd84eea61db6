//! Periodic polling of every subscription of every user.

pub mod worker;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::app::{EstuaryError, Result};
use crate::config::SyncConfig;
use crate::puller::SharedPuller;
use crate::store::SharedStore;

pub use worker::{refresh_feed, WorkerPool};

pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Ticking,
    /// Terminal: no tick starts once this is entered.
    Stopping,
}

/// Totals for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub users: usize,
    pub feeds: usize,
    pub new_entries: usize,
    pub errors: usize,
}

pub struct Synchronizer {
    store: SharedStore,
    pool: Arc<WorkerPool>,
    interval: Duration,
    sync_on_start: bool,
    shutdown_timeout: Duration,
    state: Arc<Mutex<SyncState>>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Synchronizer {
    pub fn new(store: SharedStore, puller: SharedPuller, config: &SyncConfig) -> Self {
        Self {
            pool: Arc::new(WorkerPool::new(store.clone(), puller, config.workers)),
            store,
            interval: config.interval,
            sync_on_start: config.on_start,
            shutdown_timeout: SHUTDOWN_TIMEOUT,
            state: Arc::new(Mutex::new(SyncState::Idle)),
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    pub fn state(&self) -> SyncState {
        *lock_state(&self.state)
    }

    /// Spawn the ticker. The first tick runs immediately when `onStart` is set,
    /// otherwise after one full interval.
    pub fn start(&self) -> Result<()> {
        let mut handle = self
            .handle
            .lock()
            .map_err(|_| EstuaryError::Other("synchronizer lock poisoned".into()))?;
        if handle.is_some() {
            return Err(EstuaryError::Other("synchronizer already started".into()));
        }
        if self.state() == SyncState::Stopping {
            return Err(EstuaryError::Other("synchronizer is stopping".into()));
        }

        let store = self.store.clone();
        let pool = self.pool.clone();
        let state = self.state.clone();
        let cancel = self.cancel.clone();
        let period = self.interval;
        let sync_on_start = self.sync_on_start;

        tracing::info!(interval_secs = period.as_secs(), "Synchronizer started");

        *handle = Some(tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            if !sync_on_start {
                timer.tick().await;
            }

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = timer.tick() => {}
                }

                if !begin_tick(&state) {
                    break;
                }
                run_tick(&store, &pool).await;
                end_tick(&state);
            }

            tracing::info!("Synchronizer stopped");
        }));

        Ok(())
    }

    /// Run one tick now, outside the schedule. Fails while another tick is
    /// running or once stopping.
    pub async fn sync_now(&self) -> Result<SyncReport> {
        if !begin_tick(&self.state) {
            return Err(EstuaryError::Other(format!(
                "cannot sync while {:?}",
                self.state()
            )));
        }
        let report = run_tick(&self.store, &self.pool).await;
        end_tick(&self.state);
        Ok(report)
    }

    /// Disallow further ticks and wait for the in-flight one to drain, up to
    /// the shutdown timeout. Calling it twice is harmless.
    pub async fn stop(&self) {
        *lock_state(&self.state) = SyncState::Stopping;
        self.cancel.cancel();

        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        let Some(mut handle) = handle else {
            return;
        };

        if timeout(self.shutdown_timeout, &mut handle).await.is_err() {
            tracing::warn!(
                timeout_secs = self.shutdown_timeout.as_secs(),
                "Synchronizer did not drain in time, aborting tick"
            );
            handle.abort();
        }
    }
}

fn lock_state(state: &Mutex<SyncState>) -> std::sync::MutexGuard<'_, SyncState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn begin_tick(state: &Mutex<SyncState>) -> bool {
    let mut state = lock_state(state);
    if *state != SyncState::Idle {
        return false;
    }
    *state = SyncState::Ticking;
    true
}

fn end_tick(state: &Mutex<SyncState>) {
    let mut state = lock_state(state);
    if *state == SyncState::Ticking {
        *state = SyncState::Idle;
    }
}

async fn run_tick(store: &SharedStore, pool: &WorkerPool) -> SyncReport {
    let started = Instant::now();
    let mut report = SyncReport::default();

    match store.purge_expired_keys(Utc::now()) {
        Ok(0) => {}
        Ok(purged) => tracing::debug!(purged, "Purged expired refresh keys"),
        Err(e) => tracing::warn!(error = %e, "Failed to purge expired refresh keys"),
    }

    let users = match store.all_user_ids() {
        Ok(users) => users,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to list users");
            return report;
        }
    };

    let mut feeds = Vec::new();
    for user in &users {
        match store.all_feeds(user) {
            Ok(mut owned) => feeds.append(&mut owned),
            Err(e) => {
                report.errors += 1;
                tracing::warn!(user = %user, error = %e, "Failed to list feeds");
            }
        }
    }
    report.users = users.len();
    report.feeds = feeds.len();

    for (feed, result) in pool.refresh_all(feeds).await {
        match result {
            Ok(count) => report.new_entries += count,
            Err(e) => {
                report.errors += 1;
                tracing::warn!(feed = %feed.subscription, user = %feed.owner_id, error = %e, "Pull failed");
            }
        }
    }

    tracing::info!(
        users = report.users,
        feeds = report.feeds,
        new_entries = report.new_entries,
        errors = report.errors,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Sync tick complete"
    );

    report
}
