//! Keeps the published snapshot in step with the remote account.
//!
//! The engine owns the [`SnapshotCell`]. A full refresh pages through the
//! whole listing into a fresh store; a poll reads the change feed from the
//! last seen change id and applies it to a copy of the current snapshot.
//! Either way the new snapshot is published only once it is complete.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use drivefs_config::{
    BackoffStrategy, SyncConfig, DEFAULT_FULL_REFRESH_EVERY, DEFAULT_MAX_RETRIES,
    DEFAULT_POLL_INTERVAL, DEFAULT_RETRY_BACKOFF,
};
use drivefs_core::{Change, MetadataStore, RemoteFileRecord, Snapshot, SnapshotCell};

use crate::client::RemoteSyncClient;
use crate::error::SyncError;

/// Settings for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Time between change-feed polls.
    pub poll_interval: Duration,
    /// Maximum retry attempts for a failed poll or refresh.
    pub max_retries: u32,
    /// Base backoff duration between retries.
    pub retry_backoff: Duration,
    /// Backoff strategy for retries.
    pub backoff_strategy: BackoffStrategy,
    /// Every Nth tick does a full refresh instead of a poll; 0 never does.
    pub full_refresh_every: u32,
    /// Keep trashed files in the namespace.
    pub include_trashed: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            backoff_strategy: BackoffStrategy::Exponential,
            full_refresh_every: DEFAULT_FULL_REFRESH_EVERY,
            include_trashed: false,
        }
    }
}

impl From<&SyncConfig> for SyncSettings {
    fn from(config: &SyncConfig) -> Self {
        SyncSettings {
            poll_interval: config.poll_interval(),
            max_retries: config.max_retries(),
            retry_backoff: config.retry_backoff(),
            backoff_strategy: config.backoff,
            full_refresh_every: config.full_refresh_every(),
            include_trashed: config.include_trashed,
        }
    }
}

/// Compute the backoff duration for a given retry attempt.
pub fn compute_backoff(base: Duration, attempt: u32, strategy: BackoffStrategy) -> Duration {
    match strategy {
        BackoffStrategy::Fixed => base,
        BackoffStrategy::Linear => base * (attempt + 1),
        BackoffStrategy::Exponential => base * 2u32.saturating_pow(attempt),
    }
}

/// Sync engine statistics.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Completed full refreshes, the initial load included.
    pub full_refreshes: u64,
    /// Completed change-feed polls.
    pub polls: u64,
    /// Changes applied across all polls.
    pub changes_applied: u64,
    /// Failed attempts.
    pub failures: u64,
    /// Number of retries.
    pub retries: u64,
    /// Last successful refresh or poll.
    pub last_success: Option<DateTime<Utc>>,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// Records in the current snapshot.
    pub records: usize,
    /// Change id the current snapshot is current as of.
    pub change_id: Option<u64>,
    /// Snapshots published since the initial load.
    pub generation: u64,
}

/// Which kind of refresh a tick runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshKind {
    Full,
    Incremental,
}

struct Shared {
    client: Arc<dyn RemoteSyncClient>,
    settings: SyncSettings,
    cell: Arc<SnapshotCell>,
    stats: parking_lot::Mutex<SyncStats>,
    /// Serializes refreshes so a slow poll never publishes over a newer
    /// full refresh.
    gate: Mutex<()>,
}

/// Sync engine for keeping the namespace snapshot current.
pub struct SyncEngine {
    shared: Arc<Shared>,
    /// Poll task handle.
    poll_handle: Mutex<Option<JoinHandle<()>>>,
    /// Flag to signal shutdown.
    shutdown: Arc<RwLock<bool>>,
    wake: Arc<Notify>,
}

impl SyncEngine {
    /// Fetch the whole account and build the first snapshot.
    ///
    /// Fails if the listing cannot be fetched; nothing should be mounted
    /// without a first snapshot.
    pub async fn initial_load(
        client: Arc<dyn RemoteSyncClient>,
        settings: SyncSettings,
    ) -> Result<Self, SyncError> {
        info!(remote = client.name(), "loading remote metadata");
        let snapshot = fetch_full(client.as_ref(), settings.include_trashed).await?;
        info!(
            records = snapshot.len(),
            reachable = snapshot.summary().reachable,
            change_id = ?snapshot.change_id(),
            "initial load complete"
        );

        let stats = SyncStats {
            full_refreshes: 1,
            last_success: Some(Utc::now()),
            records: snapshot.len(),
            change_id: snapshot.change_id(),
            ..Default::default()
        };

        Ok(SyncEngine {
            shared: Arc::new(Shared {
                client,
                settings,
                cell: Arc::new(SnapshotCell::new(snapshot)),
                stats: parking_lot::Mutex::new(stats),
                gate: Mutex::new(()),
            }),
            poll_handle: Mutex::new(None),
            shutdown: Arc::new(RwLock::new(false)),
            wake: Arc::new(Notify::new()),
        })
    }

    /// The cell readers load snapshots from.
    pub fn cell(&self) -> Arc<SnapshotCell> {
        Arc::clone(&self.shared.cell)
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.shared.cell.load()
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.shared.settings
    }

    /// Rebuild from a full listing and publish.
    pub async fn full_refresh(&self) -> Result<Arc<Snapshot>, SyncError> {
        self.shared.full_refresh().await
    }

    /// Apply the change feed since the current snapshot. Returns the number
    /// of changes applied.
    pub async fn poll_changes(&self) -> Result<usize, SyncError> {
        self.shared.poll_changes().await
    }

    /// Start the background poll task.
    pub async fn start(&self) {
        let mut handle_guard = self.poll_handle.lock().await;
        if handle_guard.is_some() {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let shutdown = Arc::clone(&self.shutdown);
        let wake = Arc::clone(&self.wake);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(shared.settings.poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; the initial load covers it
            interval.tick().await;
            let mut ticks: u64 = 0;

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = wake.notified() => {}
                }
                if *shutdown.read().await {
                    break;
                }

                ticks += 1;
                let every = shared.settings.full_refresh_every as u64;
                let kind = if every > 0 && ticks % every == 0 {
                    RefreshKind::Full
                } else {
                    RefreshKind::Incremental
                };
                shared.run_with_retries(kind, &shutdown, &wake).await;
                if *shutdown.read().await {
                    break;
                }
            }
            debug!("poll task stopped");
        });

        *handle_guard = Some(handle);
        info!(
            interval = ?self.shared.settings.poll_interval,
            full_refresh_every = self.shared.settings.full_refresh_every,
            "background sync started"
        );
    }

    /// Whether the background task is running.
    pub async fn is_running(&self) -> bool {
        self.poll_handle
            .lock()
            .await
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop the background task and wait for it to finish.
    pub async fn shutdown(&self) {
        *self.shutdown.write().await = true;
        self.wake.notify_one();

        let handle = self.poll_handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!("poll task panicked: {}", e);
                }
            }
        }
    }

    /// Get current sync statistics.
    pub fn stats(&self) -> SyncStats {
        let mut stats = self.shared.stats.lock().clone();
        let snapshot = self.shared.cell.load();
        stats.records = snapshot.len();
        stats.change_id = snapshot.change_id();
        stats.generation = self.shared.cell.generation();
        stats
    }
}

impl Shared {
    async fn full_refresh(&self) -> Result<Arc<Snapshot>, SyncError> {
        let _gate = self.gate.lock().await;
        match fetch_full(self.client.as_ref(), self.settings.include_trashed).await {
            Ok(snapshot) => {
                let published = self.cell.publish(snapshot);
                let mut stats = self.stats.lock();
                stats.full_refreshes += 1;
                stats.last_success = Some(Utc::now());
                Ok(published)
            }
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    async fn poll_changes(&self) -> Result<usize, SyncError> {
        let gate = self.gate.lock().await;
        let current = self.cell.load();

        let Some(last_change_id) = current.change_id() else {
            // Without a change id there is no feed position to resume from
            drop(gate);
            debug!("no change id on snapshot, falling back to full refresh");
            return self.full_refresh().await.map(|_| 0);
        };

        match self.fetch_changes(&current, last_change_id).await {
            Ok(None) => {
                let mut stats = self.stats.lock();
                stats.polls += 1;
                stats.last_success = Some(Utc::now());
                Ok(0)
            }
            Ok(Some((next, applied))) => {
                self.cell.publish(next);
                let mut stats = self.stats.lock();
                stats.polls += 1;
                stats.changes_applied += applied as u64;
                stats.last_success = Some(Utc::now());
                Ok(applied)
            }
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    /// Read every page of the feed after `last_change_id` and apply it to a
    /// copy of `current`. `None` when nothing changed.
    async fn fetch_changes(
        &self,
        current: &Snapshot,
        last_change_id: u64,
    ) -> Result<Option<(Snapshot, usize)>, SyncError> {
        let start = last_change_id + 1;
        let mut changes: Vec<Change> = Vec::new();
        let mut newest = last_change_id;
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .client
                .list_changes(start, page_token.as_deref())
                .await?;
            if let Some(largest) = page.largest_change_id {
                newest = newest.max(largest);
            }
            for item in page.items {
                newest = newest.max(item.change_id);
                changes.push(item.into_change(self.settings.include_trashed));
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        if changes.is_empty() && newest == last_change_id {
            return Ok(None);
        }

        let applied = changes.len();
        let next = current.apply_changes(changes, Some(newest))?;
        info!(applied, change_id = newest, records = next.len(), "change feed applied");
        Ok(Some((next, applied)))
    }

    async fn run_with_retries(&self, kind: RefreshKind, shutdown: &RwLock<bool>, wake: &Notify) {
        let max_retries = self.settings.max_retries;

        for attempt in 0..=max_retries {
            let result = match kind {
                RefreshKind::Full => self.full_refresh().await.map(|_| ()),
                RefreshKind::Incremental => self.poll_changes().await.map(|_| ()),
            };

            let err = match result {
                Ok(()) => return,
                Err(e) => e,
            };

            if !err.is_transient() {
                error!(?kind, "sync failed (non-transient, not retrying): {}", err);
                return;
            }
            if attempt == max_retries {
                error!(?kind, "sync failed after {} attempts: {}", attempt + 1, err);
                return;
            }

            let backoff =
                compute_backoff(self.settings.retry_backoff, attempt, self.settings.backoff_strategy);
            self.stats.lock().retries += 1;
            warn!(?kind, ?backoff, "sync failed (transient), will retry: {}", err);
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = wake.notified() => {}
            }

            if *shutdown.read().await {
                return;
            }
        }
    }

    fn record_failure(&self, err: &SyncError) {
        warn!("refresh failed, keeping the current snapshot: {}", err);
        let mut stats = self.stats.lock();
        stats.failures += 1;
        stats.last_error = Some(err.to_string());
    }
}

/// Page through the full listing into a fresh snapshot.
async fn fetch_full(
    client: &dyn RemoteSyncClient,
    include_trashed: bool,
) -> Result<Snapshot, SyncError> {
    // Read the change id first so edits made during the listing are replayed
    let about = client.about().await?;
    let mut store = MetadataStore::new();
    let mut page_token: Option<String> = None;
    let mut pages = 0u32;
    let mut skipped = 0usize;

    loop {
        let page = client.list_files(page_token.as_deref()).await?;
        pages += 1;
        for raw in page.items {
            if !include_trashed && raw.is_trashed() {
                skipped += 1;
                continue;
            }
            store.upsert(RemoteFileRecord::from_raw(raw));
        }
        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    if !store.contains(&about.root_folder_id) {
        store.upsert(RemoteFileRecord::root(about.root_folder_id.as_str()));
    }

    debug!(pages, records = store.len(), skipped, "listing fetched");
    let snapshot = Snapshot::build(store, Some(&about.root_folder_id))?
        .with_change_id(about.largest_change_id);
    Ok(snapshot)
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        if let Ok(mut shutdown) = self.shutdown.try_write() {
            *shutdown = true;
        }
        if let Ok(mut handle_guard) = self.poll_handle.try_lock() {
            if let Some(handle) = handle_guard.take() {
                handle.abort();
            }
        }
    }
}
