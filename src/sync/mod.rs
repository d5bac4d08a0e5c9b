//! Remote sync engine.
//!
//! One coordinator task owns the debounce deadline, the poll timer and every
//! network call. Mutations reach it through [`SyncHandle`]; the UI reads the
//! published [`SyncSnapshot`].
//!
//! ```text
//! idle ──edit──▶ pending ──debounce──▶ uploading ──ok──▶ idle
//!                  ▲                      │
//!                  └──────edit────── failed ◀──error──┘
//!                         failed ──poll/retry──▶ uploading
//! ```

mod remote;

pub use remote::*;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::Config;
use crate::db::LocalCache;
use crate::errors::AppError;
use crate::migrate::load_document;
use crate::models::{Document, SyncSnapshot, SyncStatus};

/// In-memory replica of the shared document.
#[derive(Debug)]
pub struct Replica {
    pub document: Document,
    /// Local edits not yet confirmed by the remote
    pub dirty: bool,
    /// Incremented on every local edit; lets an upload tell whether it sent the latest state
    pub generation: u64,
    /// Last document value seen on (or written to) the remote
    pub last_fetched: Option<Value>,
}

impl Replica {
    pub fn new(document: Document, last_fetched: Option<Value>) -> Self {
        Self {
            document,
            dirty: false,
            generation: 0,
            last_fetched,
        }
    }
}

pub type SharedReplica = Arc<Mutex<Replica>>;

/// What to do with a failed poll fetch.
///
/// Polling is best-effort: an unreachable or malformed remote never reaches the
/// caller and is retried on the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollErrorPolicy {
    Ignore,
}

/// Timers and switches for the coordinator.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub poll_interval: Duration,
    pub debounce: Duration,
    pub auto_reload: bool,
    pub auto_upload: bool,
    pub poll_errors: PollErrorPolicy,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval,
            debounce: config.debounce,
            auto_reload: config.auto_reload,
            auto_upload: config.auto_upload,
            poll_errors: PollErrorPolicy::Ignore,
        }
    }
}

#[derive(Debug)]
enum Command {
    Dirty,
    Focus,
    Retry,
    Shutdown,
}

/// Cheap handle used by mutations and the REST layer.
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: Arc<watch::Sender<SyncSnapshot>>,
}

impl SyncHandle {
    pub fn snapshot(&self) -> SyncSnapshot {
        self.status.borrow().clone()
    }

    /// Receiver that changes on every status or document revision change.
    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.status.subscribe()
    }

    /// Record a local edit: status goes to pending and the debounce is reset.
    pub fn mark_dirty(&self, message: &str) {
        self.status.send_modify(|s| {
            s.status = SyncStatus::Pending;
            s.message = message.to_string();
            s.revision += 1;
        });
        self.send(Command::Dirty);
    }

    /// The window regained focus; check the remote now.
    pub fn focus(&self) {
        self.send(Command::Focus);
    }

    /// Manual sync request from the UI.
    pub fn retry(&self) {
        self.send(Command::Retry);
    }

    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Sync coordinator is not running");
        }
    }

    fn set_status(&self, status: SyncStatus, message: &str) {
        tracing::debug!("Sync status {}: {}", status, message);
        self.status.send_modify(|s| {
            s.status = status;
            s.message = message.to_string();
        });
    }

    fn mark_synced(&self, message: &str, document_changed: bool) {
        let now = Utc::now().to_rfc3339();
        self.status.send_modify(|s| {
            s.status = SyncStatus::Idle;
            s.message = message.to_string();
            s.last_synced_at = Some(now);
            if document_changed {
                s.revision += 1;
            }
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadOutcome {
    Clean,
    StillDirty,
    Failed,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshOutcome {
    Replaced,
    Unchanged,
    Discarded,
    Malformed,
}

/// The coordinator task state.
pub struct SyncEngine {
    replica: SharedReplica,
    cache: LocalCache,
    remote: RemoteClient,
    settings: SyncSettings,
    handle: SyncHandle,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Last remote value that failed to load; not re-parsed until it changes
    rejected: Option<Value>,
}

impl SyncEngine {
    pub fn new(
        replica: SharedReplica,
        cache: LocalCache,
        remote: RemoteClient,
        settings: SyncSettings,
        initial: SyncSnapshot,
    ) -> (Self, SyncHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(initial);
        let handle = SyncHandle {
            commands: tx,
            status: Arc::new(status),
        };

        let engine = Self {
            replica,
            cache,
            remote,
            settings,
            handle: handle.clone(),
            commands: rx,
            rejected: None,
        };
        (engine, handle)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let period = self.settings.poll_interval;
        let mut poll = tokio::time::interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut deadline: Option<Instant> = None;

        tracing::info!(
            "Sync coordinator started (poll every {:?}, debounce {:?})",
            self.settings.poll_interval,
            self.settings.debounce
        );

        loop {
            let debounce = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Dirty) => {
                        deadline = Some(Instant::now() + self.settings.debounce);
                    }
                    Some(Command::Focus) => {
                        self.poll_once(deadline.is_some()).await;
                    }
                    Some(Command::Retry) => {
                        deadline = None;
                        if self.manual_sync().await == UploadOutcome::StillDirty {
                            deadline = Some(Instant::now() + self.settings.debounce);
                        }
                    }
                    Some(Command::Shutdown) | None => break,
                },
                _ = poll.tick(), if self.settings.auto_reload => {
                    self.poll_once(deadline.is_some()).await;
                }
                _ = debounce => {
                    deadline = None;
                    if self.upload().await == UploadOutcome::StillDirty {
                        deadline = Some(Instant::now() + self.settings.debounce);
                    }
                }
            }
        }

        tracing::info!("Sync coordinator stopped");
    }

    /// Fetch the remote and apply it if nothing local is pending.
    ///
    /// A replica whose last upload failed retries it afterwards, unless a
    /// debounced upload is already scheduled.
    async fn poll_once(&mut self, upload_scheduled: bool) {
        match self.remote.fetch().await {
            Ok(value) => {
                match self.apply_remote(value).await {
                    RefreshOutcome::Discarded => {
                        tracing::debug!("Remote change ignored: local edits pending");
                    }
                    RefreshOutcome::Malformed => {
                        tracing::debug!("Remote document still unreadable");
                    }
                    RefreshOutcome::Replaced | RefreshOutcome::Unchanged => {}
                }
            }
            Err(e) => match self.settings.poll_errors {
                PollErrorPolicy::Ignore => {
                    tracing::debug!("Poll failed, will retry next tick: {}", e);
                }
            },
        }

        let dirty = self.replica.lock().await.dirty;
        if dirty && !upload_scheduled && self.handle.snapshot().status == SyncStatus::Failed {
            self.upload().await;
        }
    }

    async fn apply_remote(&mut self, value: Value) -> RefreshOutcome {
        let mut replica = self.replica.lock().await;

        if replica.last_fetched.as_ref() == Some(&value) {
            if !replica.dirty && self.handle.snapshot().status == SyncStatus::Failed {
                self.handle.mark_synced("Synchronized", false);
            }
            return RefreshOutcome::Unchanged;
        }
        if replica.dirty {
            return RefreshOutcome::Discarded;
        }
        if self.rejected.as_ref() == Some(&value) {
            return RefreshOutcome::Malformed;
        }

        match load_document(value.clone()) {
            Ok(document) => {
                replica.document = document;
                replica.last_fetched = Some(value);
                self.rejected = None;
                if let Err(e) = self.cache.write(&replica.document).await {
                    tracing::warn!("Failed to cache refreshed document: {}", e);
                }
                self.handle.mark_synced("Updated from server", true);
                tracing::info!("Remote document changed, replaced local copy");
                RefreshOutcome::Replaced
            }
            Err(e) => {
                tracing::warn!("Ignoring malformed remote document: {}", e);
                self.rejected = Some(value);
                RefreshOutcome::Malformed
            }
        }
    }

    async fn upload(&mut self) -> UploadOutcome {
        let (payload, generation) = {
            let replica = self.replica.lock().await;
            if !replica.dirty {
                return UploadOutcome::Clean;
            }
            match replica.document.to_pretty_json() {
                Ok(payload) => (payload, replica.generation),
                Err(e) => {
                    tracing::error!("Failed to serialize document: {}", e);
                    self.handle.set_status(SyncStatus::Failed, &e.to_string());
                    return UploadOutcome::Failed;
                }
            }
        };

        if !self.settings.auto_upload {
            tracing::debug!("Automatic upload disabled; edits stay pending");
            return UploadOutcome::Disabled;
        }

        self.handle.set_status(SyncStatus::Uploading, "Uploading...");
        let result = self.remote.upload(&payload).await;

        let mut replica = self.replica.lock().await;
        match result {
            Ok(target) => {
                replica.last_fetched = serde_json::from_str(&payload).ok();
                if replica.generation == generation {
                    replica.dirty = false;
                    self.handle.mark_synced("Synchronized", false);
                    tracing::info!("Upload accepted by {:?} endpoint", target);
                    UploadOutcome::Clean
                } else {
                    self.handle
                        .set_status(SyncStatus::Pending, "Newer local changes not yet uploaded");
                    UploadOutcome::StillDirty
                }
            }
            Err(e) => {
                tracing::warn!("Upload failed: {}", e);
                self.handle.set_status(SyncStatus::Failed, &e.message());
                UploadOutcome::Failed
            }
        }
    }

    /// Upload pending edits now, or look for a newer remote document when clean.
    async fn manual_sync(&mut self) -> UploadOutcome {
        let dirty = self.replica.lock().await.dirty;
        if dirty {
            return self.upload().await;
        }
        self.check_server().await
    }

    async fn check_server(&mut self) -> UploadOutcome {
        self.handle
            .set_status(SyncStatus::Uploading, "Checking server...");
        match self.remote.fetch().await {
            Ok(value) => {
                match self.apply_remote(value).await {
                    RefreshOutcome::Replaced => {}
                    RefreshOutcome::Unchanged => {
                        self.handle.mark_synced("Already synchronized", false);
                    }
                    RefreshOutcome::Discarded => {
                        // An edit landed while fetching; its own debounce will upload it.
                        self.handle
                            .set_status(SyncStatus::Pending, "Local changes not yet uploaded");
                        return UploadOutcome::StillDirty;
                    }
                    RefreshOutcome::Malformed => {
                        self.handle
                            .set_status(SyncStatus::Failed, "Server copy is unreadable");
                        return UploadOutcome::Failed;
                    }
                }
                UploadOutcome::Clean
            }
            Err(e) => {
                tracing::warn!("Manual sync could not reach server: {}", e);
                self.handle
                    .set_status(SyncStatus::Failed, "Could not reach server");
                UploadOutcome::Failed
            }
        }
    }
}

/// Where the startup document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Remote,
    Cache,
    Seed,
}

/// Result of the startup fallback chain.
#[derive(Debug)]
pub struct Bootstrap {
    pub document: Document,
    pub last_fetched: Option<Value>,
    pub source: LoadSource,
}

impl Bootstrap {
    pub fn into_parts(self) -> (Replica, SyncSnapshot) {
        let message = match self.source {
            LoadSource::Remote => "Synchronized",
            LoadSource::Cache => "Local data",
            LoadSource::Seed => "Loaded default",
        };
        let snapshot = SyncSnapshot {
            message: message.to_string(),
            last_synced_at: (self.source == LoadSource::Remote).then(|| Utc::now().to_rfc3339()),
            ..SyncSnapshot::default()
        };
        (Replica::new(self.document, self.last_fetched), snapshot)
    }
}

/// Load the startup document: remote, then local cache, then the built-in seed.
pub async fn bootstrap(remote: &RemoteClient, cache: &LocalCache, seed_name: &str) -> Bootstrap {
    match remote.fetch().await {
        Ok(value) => match load_document(value.clone()) {
            Ok(document) => {
                if let Err(e) = cache.write(&document).await {
                    tracing::warn!("Failed to cache remote document: {}", e);
                }
                tracing::info!("Loaded document from {}", remote.document_url());
                return Bootstrap {
                    document,
                    last_fetched: Some(value),
                    source: LoadSource::Remote,
                };
            }
            Err(e) => tracing::warn!("Remote document unusable: {}", e),
        },
        Err(e) => tracing::info!("Remote fetch failed, trying local cache: {}", e),
    }

    match cache.read().await {
        Ok(Some(payload)) => {
            let loaded = serde_json::from_str::<Value>(&payload)
                .map_err(AppError::from)
                .and_then(load_document);
            match loaded {
                Ok(document) => {
                    let saved_at = cache.updated_at().await.ok().flatten();
                    tracing::info!(
                        "Loaded document from local cache slot {} (saved {})",
                        cache.slot(),
                        saved_at.as_deref().unwrap_or("unknown")
                    );
                    let last_fetched = serde_json::to_value(&document).ok();
                    return Bootstrap {
                        document,
                        last_fetched,
                        source: LoadSource::Cache,
                    };
                }
                Err(e) => tracing::warn!("Local cache is corrupt, loading default: {}", e),
            }
        }
        Ok(None) => tracing::info!("No local cache, loading default"),
        Err(e) => tracing::warn!("Local cache unreadable, loading default: {}", e),
    }

    let document = Document::seed(seed_name);
    if let Err(e) = cache.write(&document).await {
        tracing::warn!("Failed to cache default document: {}", e);
    }
    Bootstrap {
        document,
        last_fetched: None,
        source: LoadSource::Seed,
    }
}
