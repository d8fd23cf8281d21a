//! The in-memory API server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::event_log::{EventLog, StoredEvent};
use crate::handler;
use bytes::Bytes;
use chrono::{SubsecRound, Utc};
use dbwatch_api::{
    api_version, encode_event, Database, DatabaseList, DeleteOptions, LabelSelector, ListMeta,
    ListOptions, ObjectKey, ResourceVersion, Status, TypeMeta, WatchEvent, KIND,
};
use dbwatch_client::{ByteStream, LoopbackServer, RestRequest, RestResponse};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct State {
    objects: BTreeMap<ObjectKey, Database>,
    revision: u64,
    log: EventLog,
}

impl State {
    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }
}

/// In-memory API server for the `databases` resource.
///
/// All mutations go through one lock, which also orders them against watch
/// subscription: a watch sees either the state before a mutation plus its
/// event, or the state after it, never both.
///
/// # Example
///
/// ```
/// use dbwatch_api::{Database, DatabaseSpec, ListOptions};
/// use dbwatch_server::{ApiServer, ServerConfig};
///
/// let server = ApiServer::new(ServerConfig::default());
/// server.create(None, Database::new("mysql", DatabaseSpec::default())).unwrap();
///
/// let list = server.list(None, &ListOptions::default()).unwrap();
/// assert_eq!(list.items.len(), 1);
/// ```
pub struct ApiServer {
    config: ServerConfig,
    state: Mutex<State>,
    shutdown: Mutex<CancellationToken>,
    fail_next: AtomicUsize,
    drop_events: AtomicBool,
}

impl ApiServer {
    /// Creates an empty server.
    pub fn new(config: ServerConfig) -> Self {
        let log = EventLog::new(config.max_history, config.watch_buffer);
        Self {
            config,
            state: Mutex::new(State {
                objects: BTreeMap::new(),
                revision: 1,
                log,
            }),
            shutdown: Mutex::new(CancellationToken::new()),
            fail_next: AtomicUsize::new(0),
            drop_events: AtomicBool::new(false),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the current revision.
    pub fn revision(&self) -> u64 {
        self.state.lock().revision
    }

    /// Returns the number of stored objects.
    pub fn len(&self) -> usize {
        self.state.lock().objects.len()
    }

    /// Returns true if no objects are stored.
    pub fn is_empty(&self) -> bool {
        self.state.lock().objects.is_empty()
    }

    /// Lists objects in `namespace` (all namespaces if `None`).
    ///
    /// `limit` and `continue` are ignored; the whole collection is returned.
    pub fn list(&self, namespace: Option<&str>, options: &ListOptions) -> ServerResult<DatabaseList> {
        let selector = parse_selector(options)?;
        let state = self.state.lock();
        let items: Vec<Database> = state
            .objects
            .values()
            .filter(|obj| in_scope(obj, namespace, &selector))
            .cloned()
            .collect();

        debug!(items = items.len(), revision = state.revision, "list");
        Ok(DatabaseList::new(
            items,
            ListMeta {
                resource_version: Some(revision_token(state.revision)),
                continue_token: None,
            },
        ))
    }

    /// Returns one object.
    pub fn get(&self, key: &ObjectKey) -> ServerResult<Database> {
        self.state
            .lock()
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| ServerError::NotFound(key.clone()))
    }

    /// Creates an object, assigning uid, creation time, generation and
    /// resource version.
    pub fn create(&self, namespace: Option<&str>, mut object: Database) -> ServerResult<Database> {
        bind_namespace(&mut object, namespace)?;
        validate(&object)?;
        if object.metadata.resource_version.is_some() {
            return Err(ServerError::Invalid {
                name: object.metadata.name.clone(),
                message: "resourceVersion must not be set on create".into(),
            });
        }

        let mut state = self.state.lock();
        let key = object.key();
        if state.objects.contains_key(&key) {
            return Err(ServerError::AlreadyExists(key));
        }

        let revision = state.next_revision();
        object.type_meta = TypeMeta::new(api_version(), KIND);
        object.metadata.uid = Some(Uuid::new_v4().to_string());
        object.metadata.creation_timestamp = Some(Utc::now().trunc_subsecs(0));
        object.metadata.generation = Some(1);
        object.metadata.resource_version = Some(revision_token(revision));

        state.objects.insert(key.clone(), object.clone());
        self.record(
            &mut state,
            StoredEvent::new(revision, WatchEvent::Added(object.clone()), None),
        );
        debug!(%key, revision, "created");
        Ok(object)
    }

    /// Replaces an object.
    ///
    /// A request carrying a resource version must match the stored one.
    pub fn replace(&self, key: &ObjectKey, mut object: Database) -> ServerResult<Database> {
        bind_namespace(&mut object, key.namespace.as_deref())?;
        validate(&object)?;

        let mut state = self.state.lock();
        let current = state
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| ServerError::NotFound(key.clone()))?;

        if let Some(requested) = &object.metadata.resource_version {
            let stored = current
                .metadata
                .resource_version
                .as_ref()
                .map(ResourceVersion::as_str)
                .unwrap_or_default();
            if requested.as_str() != stored {
                return Err(ServerError::Conflict {
                    key: key.clone(),
                    current: stored.to_string(),
                    requested: requested.to_string(),
                });
            }
        }

        let revision = state.next_revision();
        let generation = current.metadata.generation.unwrap_or(1);
        object.type_meta = TypeMeta::new(api_version(), KIND);
        object.metadata.uid = current.metadata.uid.clone();
        object.metadata.creation_timestamp = current.metadata.creation_timestamp;
        object.metadata.generation = Some(if object.spec != current.spec {
            generation + 1
        } else {
            generation
        });
        object.metadata.resource_version = Some(revision_token(revision));

        state.objects.insert(key.clone(), object.clone());
        self.record(
            &mut state,
            StoredEvent::new(revision, WatchEvent::Modified(object.clone()), Some(current)),
        );
        debug!(%key, revision, "replaced");
        Ok(object)
    }

    /// Deletes an object and returns its final state.
    ///
    /// There are no owners or finalizers, so grace period and propagation
    /// policy do not change the outcome.
    pub fn delete(&self, key: &ObjectKey, options: &DeleteOptions) -> ServerResult<Database> {
        let mut state = self.state.lock();
        let mut object = state
            .objects
            .remove(key)
            .ok_or_else(|| ServerError::NotFound(key.clone()))?;

        let revision = state.next_revision();
        object.metadata.resource_version = Some(revision_token(revision));
        self.record(
            &mut state,
            StoredEvent::new(revision, WatchEvent::Deleted(object.clone()), None),
        );
        debug!(%key, revision, propagation = ?options.propagation_policy, "deleted");
        Ok(object)
    }

    /// Opens a watch stream of newline-delimited JSON frames.
    ///
    /// Starting points: no resource version follows live events only, `0`
    /// first sends every current object as `ADDED`, and `N` replays retained
    /// events after `N`. A version older than the retained history yields a
    /// single `410 Expired` error frame.
    pub fn open_watch(
        &self,
        namespace: Option<&str>,
        options: &ListOptions,
    ) -> ServerResult<ByteStream> {
        let selector = parse_selector(options)?;
        let start = parse_revision(options.resource_version.as_ref())?;

        let (mut receiver, backlog) = {
            let state = self.state.lock();
            let receiver = state.log.subscribe();
            let backlog = match start {
                None => Ok(Vec::new()),
                Some(0) => Ok(state
                    .objects
                    .values()
                    .map(|obj| {
                        Arc::new(StoredEvent::new(
                            state.revision,
                            WatchEvent::Added(obj.clone()),
                            None,
                        ))
                    })
                    .collect()),
                Some(revision) => state.log.since(revision),
            };
            (receiver, backlog)
        };

        let token = self.shutdown.lock().clone();
        let deadline = options
            .timeout_seconds
            .map(Duration::from_secs)
            .or(self.config.default_watch_timeout)
            .map(|timeout| Instant::now() + timeout);
        let namespace = namespace.map(str::to_string);
        debug!(?start, namespace = ?namespace, "watch opened");

        let stream = async_stream::stream! {
            match backlog {
                Err(err) => {
                    warn!(error = %err, "watch start rejected");
                    if let Some(frame) = encode_frame(&WatchEvent::Error(err.to_status())) {
                        yield Ok(frame);
                    }
                }
                Ok(backlog) => {
                    for event in backlog {
                        if let Some(frame) = project(&event, namespace.as_deref(), &selector)
                            .and_then(|e| encode_frame(&e))
                        {
                            yield Ok(frame);
                        }
                    }

                    loop {
                        let next = tokio::select! {
                            _ = token.cancelled() => None,
                            _ = expiry(deadline) => None,
                            received = receiver.recv() => match received {
                                Ok(event) => Some(event),
                                Err(RecvError::Lagged(skipped)) => {
                                    warn!(skipped, "watcher fell behind, closing");
                                    None
                                }
                                Err(RecvError::Closed) => None,
                            },
                        };
                        let event = match next {
                            Some(event) => event,
                            None => break,
                        };
                        if let Some(frame) = project(&event, namespace.as_deref(), &selector)
                            .and_then(|e| encode_frame(&e))
                        {
                            yield Ok(frame);
                        }
                    }
                }
            }
            debug!("watch closed");
        };
        Ok(Box::pin(stream))
    }

    /// Makes the next `count` requests (unary or watch) fail with 503.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// While set, mutations are recorded in history but not delivered to
    /// open watches.
    pub fn set_drop_events(&self, drop: bool) {
        self.drop_events.store(drop, Ordering::SeqCst);
    }

    /// Sends an `ERROR` frame to every open watch.
    pub fn inject_error_event(&self, status: Status) {
        let state = self.state.lock();
        state
            .log
            .broadcast(StoredEvent::new(state.revision, WatchEvent::Error(status), None));
    }

    /// Closes every open watch stream.
    pub fn close_watches(&self) {
        let previous = std::mem::replace(&mut *self.shutdown.lock(), CancellationToken::new());
        previous.cancel();
        info!("closed all watches");
    }

    /// Discards the event history up to the current revision.
    pub fn compact(&self) {
        let mut state = self.state.lock();
        let revision = state.revision;
        state.log.compact(revision);
        info!(revision, "compacted history");
    }

    /// Returns the number of open watch streams.
    pub fn watcher_count(&self) -> usize {
        self.state.lock().log.receiver_count()
    }

    /// Consumes one injected failure, if any.
    fn take_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn record(&self, state: &mut State, event: StoredEvent) {
        let deliver = !self.drop_events.load(Ordering::SeqCst);
        if !deliver {
            debug!(revision = event.revision, "event not delivered");
        }
        state.log.append(event, deliver);
    }
}

impl LoopbackServer for ApiServer {
    fn handle(&self, request: &RestRequest) -> RestResponse {
        if self.take_failure() {
            return handler::error_response(&ServerError::Unavailable("injected failure".into()));
        }
        handler::handle(self, request)
    }

    fn watch(&self, request: &RestRequest) -> Result<ByteStream, RestResponse> {
        if self.take_failure() {
            return Err(handler::error_response(&ServerError::Unavailable(
                "injected failure".into(),
            )));
        }
        handler::handle_watch(self, request)
    }
}

fn revision_token(revision: u64) -> ResourceVersion {
    ResourceVersion::new(revision.to_string())
}

fn parse_revision(version: Option<&ResourceVersion>) -> ServerResult<Option<u64>> {
    match version {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => v
            .as_str()
            .parse()
            .map(Some)
            .map_err(|_| ServerError::BadRequest(format!("invalid resourceVersion {:?}", v.as_str()))),
    }
}

fn parse_selector(options: &ListOptions) -> ServerResult<LabelSelector> {
    match options.label_selector.as_deref() {
        Some(text) => Ok(LabelSelector::parse(text)?),
        None => Ok(LabelSelector::everything()),
    }
}

fn in_scope(object: &Database, namespace: Option<&str>, selector: &LabelSelector) -> bool {
    let namespace_matches = match namespace {
        Some(ns) => object.metadata.namespace.as_deref() == Some(ns),
        None => true,
    };
    namespace_matches && selector.matches(&object.metadata.labels)
}

/// Maps a stored event onto what one watcher should see.
///
/// A modification that moves an object into or out of the watcher's
/// selection is delivered as `ADDED` or `DELETED`.
fn project(
    event: &StoredEvent,
    namespace: Option<&str>,
    selector: &LabelSelector,
) -> Option<WatchEvent<Database>> {
    match &event.event {
        WatchEvent::Added(obj) => in_scope(obj, namespace, selector).then(|| event.event.clone()),
        WatchEvent::Deleted(obj) => in_scope(obj, namespace, selector).then(|| event.event.clone()),
        WatchEvent::Modified(obj) => {
            let now = in_scope(obj, namespace, selector);
            let before = event
                .previous
                .as_ref()
                .is_some_and(|prev| in_scope(prev, namespace, selector));
            match (before, now) {
                (true, true) => Some(WatchEvent::Modified(obj.clone())),
                (false, true) => Some(WatchEvent::Added(obj.clone())),
                (true, false) => Some(WatchEvent::Deleted(obj.clone())),
                (false, false) => None,
            }
        }
        WatchEvent::Bookmark(_) | WatchEvent::Error(_) => Some(event.event.clone()),
    }
}

fn encode_frame(event: &WatchEvent<Database>) -> Option<Bytes> {
    match encode_event(event) {
        Ok(mut frame) => {
            frame.push(b'\n');
            Some(Bytes::from(frame))
        }
        Err(err) => {
            warn!(error = %err, "failed to encode watch event");
            None
        }
    }
}

async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn bind_namespace(object: &mut Database, namespace: Option<&str>) -> ServerResult<()> {
    if let Some(ns) = namespace {
        match object.metadata.namespace.as_deref() {
            Some(existing) if existing != ns => {
                return Err(ServerError::BadRequest(format!(
                    "namespace in body ({}) does not match path ({})",
                    existing, ns
                )));
            }
            _ => object.metadata.namespace = Some(ns.to_string()),
        }
    }
    Ok(())
}

fn validate(object: &Database) -> ServerResult<()> {
    let name = &object.metadata.name;
    let invalid = |message: String| ServerError::Invalid {
        name: name.clone(),
        message,
    };

    if !is_dns_subdomain(name) {
        return Err(invalid(format!(
            "metadata.name {:?} must consist of lower case alphanumerics, '-' or '.'",
            name
        )));
    }
    if object.spec.total < 0 {
        return Err(invalid("spec.total must not be negative".into()));
    }
    if object.spec.available < 0 {
        return Err(invalid("spec.available must not be negative".into()));
    }
    Ok(())
}

fn is_dns_subdomain(name: &str) -> bool {
    let bytes = name.as_bytes();
    let alnum = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            bytes.len() <= 253
                && alnum(first)
                && alnum(last)
                && bytes.iter().all(|b| alnum(b) || *b == b'-' || *b == b'.')
        }
        _ => false,
    }
}
