//! Routing-table file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::schema::SelectionPolicy;
use crate::config::snapshot::{ConfigSnapshot, SnapshotStore};
use crate::matcher::table::TableOptions;

/// Watches the routing-table file and rebuilds a snapshot on change.
///
/// A rebuild that fails to read the file sends nothing: the store
/// keeps serving the previous snapshot. Lines rejected during the
/// rebuild are logged but do not block the swap.
pub struct TableWatcher {
    path: PathBuf,
    policy: SelectionPolicy,
    options: TableOptions,
    update_tx: mpsc::UnboundedSender<Arc<ConfigSnapshot>>,
}

impl TableWatcher {
    /// Returns the watcher and a receiver for rebuilt snapshots.
    pub fn new(
        path: &Path,
        policy: SelectionPolicy,
        options: TableOptions,
    ) -> (Self, mpsc::UnboundedReceiver<Arc<ConfigSnapshot>>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                policy,
                options,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching in a background thread. The returned watcher
    /// must be kept alive for events to keep flowing.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();
        let policy = self.policy.clone();
        let options = self.options;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        info!("routing table change detected, rebuilding");
                        match std::fs::read_to_string(&path) {
                            Ok(text) => {
                                let (snapshot, errors) =
                                    ConfigSnapshot::build_with(&text, policy.clone(), options);
                                if !errors.is_empty() {
                                    error!(
                                        rejected = errors.len(),
                                        "rebuilt routing table with rejected lines"
                                    );
                                }
                                let _ = tx.send(Arc::new(snapshot));
                            }
                            Err(e) => {
                                error!(
                                    "failed to reread routing table: {}. Keeping current table.",
                                    e
                                );
                            }
                        }
                    }
                }
                Err(e) => error!("watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        info!(path = ?self.path, "routing table watcher started");
        Ok(watcher)
    }
}

/// Drain rebuilt snapshots into the store.
pub fn apply_updates(
    store: Arc<SnapshotStore>,
    mut updates: mpsc::UnboundedReceiver<Arc<ConfigSnapshot>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(snapshot) = updates.recv().await {
            info!(records = snapshot.table.len(), "routing table swapped in");
            store.replace(snapshot);
        }
    })
}
