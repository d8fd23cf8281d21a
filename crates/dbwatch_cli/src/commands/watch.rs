//! Watch command implementation.
//!
//! Starts an informer, prints the store once it has synced and then one
//! line per change until interrupted.

use super::{write_table, CommandResult};
use dbwatch_api::Database;
use dbwatch_cache::{EventHandler, Informer, InformerConfig};
use dbwatch_client::{DatabaseClient, Transport};
use parking_lot::Mutex;
use std::future::Future;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Runs the watch command until Ctrl-C.
pub async fn run<T: Transport + 'static>(
    client: DatabaseClient<T>,
    resync_secs: u64,
    selector: Option<String>,
) -> CommandResult {
    let mut config =
        InformerConfig::default().with_resync_period(Duration::from_secs(resync_secs.max(1)));
    if let Some(selector) = selector {
        config = config.with_label_selector(selector);
    }

    let stop = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
        }
    };
    watch_until(client, config, std::io::stdout(), stop).await
}

/// Runs an informer, printing to `out` until `stop` completes.
pub async fn watch_until<T, W>(
    client: DatabaseClient<T>,
    config: InformerConfig,
    out: W,
    stop: impl Future<Output = ()>,
) -> CommandResult
where
    T: Transport + 'static,
    W: Write + Send + 'static,
{
    let printer = Arc::new(Printer {
        out: Mutex::new(out),
        synced: AtomicBool::new(false),
    });
    let handle = Informer::new(client, config)
        .with_handler(Arc::clone(&printer))
        .spawn();

    handle.wait_until_ready().await?;
    {
        let mut out = printer.out.lock();
        let objects = handle.store().list();
        write_table(&mut *out, objects.iter().map(|d| &**d))?;
        out.flush()?;
        printer.synced.store(true, Ordering::SeqCst);
    }
    info!("Store synced, watching for changes");

    stop.await;
    info!("Stopping informer");
    handle.shutdown().await?;
    Ok(())
}

/// Prints one line per change once the initial table has been written.
struct Printer<W> {
    out: Mutex<W>,
    synced: AtomicBool,
}

impl<W: Write> Printer<W> {
    fn line(&self, event: &str, object: &Database) {
        let mut out = self.out.lock();
        if !self.synced.load(Ordering::SeqCst) {
            return;
        }
        let result = writeln!(
            out,
            "{:<9} {} available={}/{}",
            event,
            object.key(),
            object.spec.available,
            object.spec.total
        )
        .and_then(|_| out.flush());
        if let Err(e) = result {
            warn!("Failed to write event: {}", e);
        }
    }
}

impl<W: Write + Send> EventHandler for Printer<W> {
    fn on_add(&self, object: &Database) {
        self.line("ADDED", object);
    }

    fn on_update(&self, _old: &Database, new: &Database) {
        self.line("MODIFIED", new);
    }

    fn on_delete(&self, object: &Database) {
        self.line("DELETED", object);
    }
}
