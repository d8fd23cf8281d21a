//! Informer tests against the in-memory API server over the loopback transport.

use async_trait::async_trait;
use dbwatch_api::{
    Database, DatabaseList, DatabaseSpec, DeleteOptions, GetOptions, ListOptions, ObjectKey,
    Status,
};
use dbwatch_cache::{
    BackoffConfig, CacheError, Informer, InformerConfig, InformerHandle, InformerState, ListWatch,
};
use dbwatch_client::{ClientConfig, ClientResult, DatabaseClient, LoopbackTransport, WatchStream};
use dbwatch_server::{ApiServer, ServerConfig};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Client = DatabaseClient<LoopbackTransport<ApiServer>>;

fn setup(config: ServerConfig) -> (Arc<ApiServer>, Client) {
    let server = Arc::new(ApiServer::new(config));
    let client = DatabaseClient::new(
        ClientConfig::default(),
        LoopbackTransport::new(Arc::clone(&server)),
    );
    (server, client)
}

fn database(name: &str, db_type: &str, total: i64, available: i64) -> Database {
    Database::new(
        name,
        DatabaseSpec {
            db_name: name.into(),
            description: format!("{} instance", db_type),
            total,
            available,
            db_type: db_type.into(),
            tags: String::new(),
        },
    )
}

fn fast_config() -> InformerConfig {
    InformerConfig::default().with_backoff(
        BackoffConfig::new(Duration::from_millis(1), Duration::from_millis(10)).with_jitter(false),
    )
}

async fn start(client: &Client, config: InformerConfig) -> InformerHandle {
    let handle = Informer::new(client.clone(), config).spawn();
    tokio::time::timeout(Duration::from_secs(5), handle.wait_until_ready())
        .await
        .expect("informer did not sync")
        .expect("informer stopped");
    handle
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}

fn store_keys(handle: &InformerHandle) -> BTreeSet<ObjectKey> {
    handle.store().keys().into_iter().collect()
}

async fn server_keys(client: &Client) -> BTreeSet<ObjectKey> {
    client
        .list(&ListOptions::default())
        .await
        .unwrap()
        .items
        .iter()
        .map(Database::key)
        .collect()
}

#[tokio::test]
async fn end_to_end_scenario() {
    let (_server, client) = setup(ServerConfig::default());
    client
        .create(&database("mysql", "SQL", 100, 50))
        .await
        .unwrap();
    client
        .create(&database("mongodb", "noSQL", 100, 70))
        .await
        .unwrap();

    let handle = start(&client, fast_config()).await;
    let store = handle.store();
    assert_eq!(store.len(), 2);
    assert_eq!(store.get_by_name("mongodb").unwrap().spec.available, 70);

    let mut mysql = client.get("mysql", &GetOptions::default()).await.unwrap();
    mysql.spec.available = 40;
    client.replace(&mysql).await.unwrap();

    eventually("mysql update", || {
        store.get_by_name("mysql").map(|d| d.spec.available).ok() == Some(40)
    })
    .await;
    assert_eq!(store.list().len(), 2);

    handle.shutdown().await.unwrap();
    assert_eq!(handle.state(), InformerState::Stopped);
}

#[tokio::test]
async fn store_converges_to_server_state() {
    let (_server, client) = setup(ServerConfig::default());
    for i in 0..5 {
        client
            .create(&database(&format!("db-{}", i), "SQL", 10, i))
            .await
            .unwrap();
    }
    let handle = start(&client, fast_config()).await;

    client
        .delete("db-1", &DeleteOptions::default())
        .await
        .unwrap();
    client
        .create(&database("db-9", "SQL", 10, 9))
        .await
        .unwrap();
    let mut db3 = client.get("db-3", &GetOptions::default()).await.unwrap();
    db3.spec.available = 0;
    client.replace(&db3).await.unwrap();

    let expected = server_keys(&client).await;
    eventually("store convergence", || store_keys(&handle) == expected).await;
    eventually("db-3 update", || {
        handle.store().get_by_name("db-3").map(|d| d.spec.available).ok() == Some(0)
    })
    .await;

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn delete_is_not_idempotent_on_server() {
    let (_server, client) = setup(ServerConfig::default());
    client
        .create(&database("mysql", "SQL", 100, 50))
        .await
        .unwrap();
    let handle = start(&client, fast_config()).await;

    client
        .delete("mysql", &DeleteOptions::default())
        .await
        .unwrap();
    let second = client.delete("mysql", &DeleteOptions::default()).await;
    assert!(matches!(
        second,
        Err(dbwatch_client::ClientError::NotFound { .. })
    ));

    eventually("delete applied", || handle.store().is_empty()).await;
    assert!(matches!(
        handle.store().get_by_name("mysql"),
        Err(CacheError::NotFound(_))
    ));
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn reconnect_after_watch_close() {
    let (server, client) = setup(ServerConfig::default());
    let handle = start(&client, fast_config()).await;

    client.create(&database("x", "SQL", 1, 1)).await.unwrap();
    eventually("x added", || handle.store().len() == 1).await;

    server.close_watches();
    eventually("relist", || handle.stats().relists >= 2).await;
    eventually("watch reopened", || server.watcher_count() == 1).await;

    assert_eq!(handle.store().len(), 1);
    assert!(handle.stats().watch_restarts >= 1);
    assert_eq!(handle.stats().failures, 0);

    client.create(&database("y", "SQL", 1, 1)).await.unwrap();
    eventually("y added", || handle.store().len() == 2).await;
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn resync_heals_dropped_events() {
    let (server, client) = setup(ServerConfig::default());
    client.create(&database("stale", "SQL", 1, 1)).await.unwrap();

    let config = fast_config().with_resync_period(Duration::from_millis(100));
    let handle = start(&client, config).await;

    server.set_drop_events(true);
    client
        .create(&database("hidden", "SQL", 1, 1))
        .await
        .unwrap();
    client
        .delete("stale", &DeleteOptions::default())
        .await
        .unwrap();

    let expected = server_keys(&client).await;
    eventually("resync", || store_keys(&handle) == expected).await;
    assert!(handle.stats().resyncs >= 1);
    handle.shutdown().await.unwrap();
}

/// Compacts the server's history right after the first list, so the
/// following watch starts from a version the server no longer has.
struct CompactAfterList {
    client: Client,
    server: Arc<ApiServer>,
    armed: AtomicBool,
}

#[async_trait]
impl ListWatch for CompactAfterList {
    async fn list(&self, options: &ListOptions) -> ClientResult<DatabaseList> {
        let list = self.client.list(options).await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.server
                .create(None, database("late", "SQL", 1, 1))
                .unwrap();
            self.server.compact();
        }
        Ok(list)
    }

    async fn watch(&self, options: &ListOptions) -> ClientResult<WatchStream> {
        self.client.watch(options).await
    }
}

#[tokio::test]
async fn expired_watch_relists() {
    let (server, client) = setup(ServerConfig::default());
    client.create(&database("early", "SQL", 1, 1)).await.unwrap();

    let source = CompactAfterList {
        client: client.clone(),
        server: Arc::clone(&server),
        armed: AtomicBool::new(true),
    };
    let handle = Informer::new(source, fast_config()).spawn();
    handle.wait_until_ready().await.unwrap();

    eventually("late object", || handle.store().len() == 2).await;
    let stats = handle.stats();
    assert!(stats.failures >= 1);
    assert!(stats.last_error.unwrap().contains("410"));
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn unavailable_server_is_retried() {
    let (server, client) = setup(ServerConfig::default());
    client.create(&database("mysql", "SQL", 1, 1)).await.unwrap();
    server.fail_next(3);

    let handle = start(&client, fast_config()).await;
    assert_eq!(handle.store().len(), 1);
    assert!(handle.stats().failures >= 3);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn error_event_triggers_relist() {
    let (server, client) = setup(ServerConfig::default());
    let handle = start(&client, fast_config()).await;
    eventually("watch open", || server.watcher_count() == 1).await;

    server.inject_error_event(Status::internal("etcd unavailable"));
    eventually("relist", || handle.stats().relists >= 2).await;
    assert!(handle
        .stats()
        .last_error
        .unwrap()
        .contains("etcd unavailable"));
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn label_selector_scopes_the_store() {
    let (_server, client) = setup(ServerConfig::default());
    client
        .create(&database("gold", "SQL", 1, 1).with_label("tier", "gold"))
        .await
        .unwrap();
    client.create(&database("plain", "SQL", 1, 1)).await.unwrap();

    let handle = start(&client, fast_config().with_label_selector("tier=gold")).await;
    assert_eq!(handle.store().len(), 1);

    let mut plain = client.get("plain", &GetOptions::default()).await.unwrap();
    plain.metadata.labels.insert("tier".into(), "gold".into());
    client.replace(&plain).await.unwrap();
    eventually("plain joins", || handle.store().len() == 2).await;

    let mut gold = client.get("gold", &GetOptions::default()).await.unwrap();
    gold.metadata.labels.clear();
    client.replace(&gold).await.unwrap();
    eventually("gold leaves", || {
        handle.store().keys() == vec![ObjectKey::cluster("plain")]
    })
    .await;
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn namespaced_informer() {
    let (_server, client) = setup(ServerConfig::default());
    let prod = client.namespaced("prod");
    let dev = client.namespaced("dev");
    prod.create(&database("pg", "SQL", 1, 1)).await.unwrap();
    dev.create(&database("pg", "SQL", 1, 1)).await.unwrap();

    let handle = start(&prod, fast_config()).await;
    assert_eq!(
        handle.store().keys(),
        vec![ObjectKey::namespaced("prod", "pg")]
    );

    dev.create(&database("redis", "noSQL", 1, 1)).await.unwrap();
    prod.create(&database("redis", "noSQL", 1, 1)).await.unwrap();
    eventually("prod redis", || handle.store().len() == 2).await;
    assert!(handle
        .store()
        .keys()
        .iter()
        .all(|k| k.namespace.as_deref() == Some("prod")));
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_releases_the_watch() {
    let (server, client) = setup(ServerConfig::default());
    let handle = start(&client, fast_config()).await;
    eventually("watch open", || server.watcher_count() == 1).await;

    handle.shutdown().await.unwrap();
    assert_eq!(handle.state(), InformerState::Stopped);
    eventually("watch released", || server.watcher_count() == 0).await;
}
