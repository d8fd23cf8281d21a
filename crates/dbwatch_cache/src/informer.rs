//! The list-watch synchronizer.
//!
//! One cycle lists the collection, reconciles the store against the list,
//! then watches from the list's resource version until something ends the
//! watch. Whatever ends it, the next cycle starts with a fresh list; the
//! informer never tries to resume a watch from a remembered version.
//!
//! ```text
//! Idle -> Listing -> ApplyingSnapshot -> Watching
//!            ^                              |
//!            +--- error / close / resync ---+
//!
//! any state --cancel--> Stopped
//! ```

use crate::config::InformerConfig;
use crate::error::{CacheError, CacheResult};
use crate::handler::EventHandler;
use crate::store::{Store, StoreReader};
use async_trait::async_trait;
use dbwatch_api::{Database, DatabaseList, ListOptions, ResourceVersion, WatchEvent};
use dbwatch_client::{ClientError, ClientResult, DatabaseClient, Transport, WatchStream};
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Source of list snapshots and watch streams.
#[async_trait]
pub trait ListWatch: Send + Sync {
    /// Lists the collection.
    async fn list(&self, options: &ListOptions) -> ClientResult<DatabaseList>;

    /// Opens a watch.
    async fn watch(&self, options: &ListOptions) -> ClientResult<WatchStream>;
}

#[async_trait]
impl<T: Transport> ListWatch for DatabaseClient<T> {
    async fn list(&self, options: &ListOptions) -> ClientResult<DatabaseList> {
        DatabaseClient::list(self, options).await
    }

    async fn watch(&self, options: &ListOptions) -> ClientResult<WatchStream> {
        DatabaseClient::watch(self, options).await
    }
}

/// Where the informer is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InformerState {
    /// Not started.
    Idle,
    /// Waiting for a list response.
    Listing,
    /// Reconciling the store against a list.
    ApplyingSnapshot,
    /// Consuming watch events.
    Watching,
    /// Cancelled; will not run again.
    Stopped,
}

impl InformerState {
    /// Returns true while the informer task is running.
    pub fn is_running(&self) -> bool {
        !matches!(self, InformerState::Idle | InformerState::Stopped)
    }
}

/// Counters describing informer activity.
#[derive(Debug, Clone, Default)]
pub struct InformerStats {
    /// Snapshots applied.
    pub relists: u64,
    /// Relists forced by the resync timer.
    pub resyncs: u64,
    /// Watch events applied to the store.
    pub events_applied: u64,
    /// Watches that ended cleanly and were replaced by a relist.
    pub watch_restarts: u64,
    /// Cycles that ended in an error.
    pub failures: u64,
    /// Failures since a watch was last opened; drives the backoff.
    pub consecutive_failures: u32,
    /// Time of the last applied snapshot.
    pub last_sync_time: Option<Instant>,
    /// Last resource version seen from a list or event.
    pub last_resource_version: Option<ResourceVersion>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// How a watch phase ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleEnd {
    Cancelled,
    Resync,
    StreamClosed,
}

struct Shared {
    state: RwLock<InformerState>,
    stats: RwLock<InformerStats>,
}

/// Keeps a [`Store`] in sync with the server.
pub struct Informer<L: ListWatch, H: EventHandler = ()> {
    source: L,
    config: InformerConfig,
    store: Store,
    handler: H,
    shared: Arc<Shared>,
    ready: watch::Sender<bool>,
}

impl<L: ListWatch> Informer<L> {
    /// Creates an informer over `source` with an empty store.
    pub fn new(source: L, config: InformerConfig) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            source,
            config,
            store: Store::new(),
            handler: (),
            shared: Arc::new(Shared {
                state: RwLock::new(InformerState::Idle),
                stats: RwLock::new(InformerStats::default()),
            }),
            ready,
        }
    }
}

impl<L: ListWatch, H: EventHandler> Informer<L, H> {
    /// Replaces the event handler.
    pub fn with_handler<H2: EventHandler>(self, handler: H2) -> Informer<L, H2> {
        Informer {
            source: self.source,
            config: self.config,
            store: self.store,
            handler,
            shared: self.shared,
            ready: self.ready,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &InformerConfig {
        &self.config
    }

    /// Returns a reader for the store.
    pub fn store(&self) -> StoreReader {
        self.store.reader()
    }

    /// Returns the current state.
    pub fn state(&self) -> InformerState {
        *self.shared.state.read()
    }

    /// Returns a copy of the counters.
    pub fn stats(&self) -> InformerStats {
        self.shared.stats.read().clone()
    }

    /// Returns true once the first snapshot has been applied.
    pub fn has_synced(&self) -> bool {
        *self.ready.borrow()
    }

    /// Runs list-watch cycles until `token` is cancelled.
    ///
    /// Failures never end the loop. After a failure the next cycle waits for
    /// the configured backoff; a clean watch close, a resync or an expired
    /// resource version relist immediately.
    pub async fn run(&self, token: CancellationToken) {
        let mut failures = 0u32;
        info!(resync = ?self.config.resync_period, "informer started");

        loop {
            match self.cycle(&token, &mut failures).await {
                Ok(CycleEnd::Cancelled) => break,
                Ok(CycleEnd::Resync) => {
                    self.shared.stats.write().resyncs += 1;
                    debug!("resync period elapsed, relisting");
                }
                Ok(CycleEnd::StreamClosed) => {
                    self.shared.stats.write().watch_restarts += 1;
                    debug!("watch closed, relisting");
                }
                Err(err) => {
                    {
                        let mut stats = self.shared.stats.write();
                        stats.failures += 1;
                        stats.last_error = Some(err.to_string());
                    }
                    if is_expired(&err) {
                        info!(error = %err, "resource version expired, relisting");
                        continue;
                    }

                    failures = failures.saturating_add(1);
                    self.shared.stats.write().consecutive_failures = failures;
                    let delay = self.config.backoff.delay_for(failures);
                    warn!(error = %err, failures, ?delay, "list-watch cycle failed");
                    if !delay.is_zero() {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }

        self.set_state(InformerState::Stopped);
        info!("informer stopped");
    }

    async fn cycle(&self, token: &CancellationToken, failures: &mut u32) -> CacheResult<CycleEnd> {
        if token.is_cancelled() {
            return Ok(CycleEnd::Cancelled);
        }

        self.set_state(InformerState::Listing);
        let list = tokio::select! {
            _ = token.cancelled() => return Ok(CycleEnd::Cancelled),
            result = self.list_all() => result?,
        };

        self.set_state(InformerState::ApplyingSnapshot);
        let version = list.metadata.resource_version.clone();
        self.apply_snapshot(list);
        let resync = tokio::time::sleep(self.config.resync_period);
        tokio::pin!(resync);

        let options = self.config.watch_request(version);
        let mut stream = tokio::select! {
            _ = token.cancelled() => return Ok(CycleEnd::Cancelled),
            _ = &mut resync => return Ok(CycleEnd::Resync),
            result = self.source.watch(&options) => result?,
        };
        if *failures > 0 {
            *failures = 0;
            self.shared.stats.write().consecutive_failures = 0;
        }

        self.set_state(InformerState::Watching);
        loop {
            tokio::select! {
                _ = token.cancelled() => return Ok(CycleEnd::Cancelled),
                _ = &mut resync => return Ok(CycleEnd::Resync),
                item = stream.next() => match item {
                    None => return Ok(CycleEnd::StreamClosed),
                    Some(Err(err)) => return Err(err.into()),
                    Some(Ok(event)) => self.apply_event(event)?,
                },
            }
        }
    }

    /// Lists every page of the collection.
    ///
    /// The snapshot carries the first page's resource version; later pages
    /// are served from the same point in history.
    async fn list_all(&self) -> ClientResult<DatabaseList> {
        let mut options = self.config.list_request();
        let mut list = self.source.list(&options).await?;

        while let Some(token) = list.metadata.continue_token.take().filter(|t| !t.is_empty()) {
            debug!(items = list.items.len(), "list continues");
            options.continue_token = Some(token);
            let page = self.source.list(&options).await?;
            list.items.extend(page.items);
            list.metadata.continue_token = page.metadata.continue_token;
        }
        Ok(list)
    }

    fn apply_snapshot(&self, list: DatabaseList) {
        let count = list.items.len();
        let reconciled = self.store.replace(list.items);

        for object in &reconciled.added {
            self.handler.on_add(object);
        }
        for (old, new) in &reconciled.updated {
            self.handler.on_update(old, new);
        }
        for object in &reconciled.removed {
            self.handler.on_delete(object);
        }

        {
            let mut stats = self.shared.stats.write();
            stats.relists += 1;
            stats.last_sync_time = Some(Instant::now());
            stats.last_resource_version = list.metadata.resource_version.clone();
        }
        self.ready.send_replace(true);

        info!(
            items = count,
            added = reconciled.added.len(),
            removed = reconciled.removed.len(),
            resource_version = ?list.metadata.resource_version,
            "snapshot applied"
        );
    }

    fn apply_event(&self, event: WatchEvent<Database>) -> CacheResult<()> {
        let version = match &event {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) | WatchEvent::Deleted(obj) => {
                obj.metadata.resource_version.clone()
            }
            WatchEvent::Bookmark(version) => Some(version.clone()),
            WatchEvent::Error(_) => None,
        };

        match event {
            WatchEvent::Added(object) | WatchEvent::Modified(object) => {
                debug!(key = %object.key(), "upsert");
                let new = object.clone();
                match self.store.upsert(object) {
                    Some(old) => self.handler.on_update(&old, &new),
                    None => self.handler.on_add(&new),
                }
            }
            WatchEvent::Deleted(object) => {
                let key = object.key();
                debug!(%key, "delete");
                if self.store.delete(&key).is_some() {
                    self.handler.on_delete(&object);
                }
            }
            WatchEvent::Bookmark(_) => {}
            WatchEvent::Error(status) => {
                return Err(CacheError::WatchEvent {
                    code: status.code,
                    message: status.message,
                });
            }
        }

        let mut stats = self.shared.stats.write();
        stats.events_applied += 1;
        if version.is_some() {
            stats.last_resource_version = version;
        }
        Ok(())
    }

    fn set_state(&self, state: InformerState) {
        *self.shared.state.write() = state;
    }
}

impl<L, H> Informer<L, H>
where
    L: ListWatch + 'static,
    H: EventHandler + 'static,
{
    /// Starts the informer on the tokio runtime.
    pub fn spawn(self) -> InformerHandle {
        let token = CancellationToken::new();
        let ready = self.ready.subscribe();
        let store = self.store.reader();
        let shared = Arc::clone(&self.shared);

        let task_token = token.clone();
        let task = tokio::spawn(async move { self.run(task_token).await });

        InformerHandle {
            store,
            shared,
            ready,
            token,
            task: Mutex::new(Some(task)),
        }
    }
}

fn is_expired(err: &CacheError) -> bool {
    match err {
        CacheError::Client(ClientError::Expired(_)) => true,
        CacheError::WatchEvent { code, .. } => *code == 410,
        _ => false,
    }
}

/// Handle to a spawned informer.
///
/// Dropping the handle cancels the informer.
pub struct InformerHandle {
    store: StoreReader,
    shared: Arc<Shared>,
    ready: watch::Receiver<bool>,
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl InformerHandle {
    /// Waits until the first snapshot has been applied.
    ///
    /// Fails with [`CacheError::Stopped`] if the informer stops first.
    pub async fn wait_until_ready(&self) -> CacheResult<()> {
        let mut ready = self.ready.clone();
        loop {
            if *ready.borrow_and_update() {
                return Ok(());
            }
            if ready.changed().await.is_err() {
                return if *ready.borrow() {
                    Ok(())
                } else {
                    Err(CacheError::Stopped)
                };
            }
        }
    }

    /// Returns true once the first snapshot has been applied.
    pub fn has_synced(&self) -> bool {
        *self.ready.borrow()
    }

    /// Returns a reader for the store.
    pub fn store(&self) -> StoreReader {
        self.store.clone()
    }

    /// Returns the current state.
    pub fn state(&self) -> InformerState {
        *self.shared.state.read()
    }

    /// Returns a copy of the counters.
    pub fn stats(&self) -> InformerStats {
        self.shared.stats.read().clone()
    }

    /// Signals the informer to stop without waiting for it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Stops the informer and waits for its task to finish.
    pub async fn shutdown(&self) -> CacheResult<()> {
        self.token.cancel();
        let task = self.task.lock().take();
        match task {
            Some(task) => task.await.map_err(|e| CacheError::Task(e.to_string())),
            None => Ok(()),
        }
    }
}

impl Drop for InformerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
