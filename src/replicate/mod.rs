//! Dirty-flag replication of the credential store.
//!
//! Mutating handlers call [`DirtyFlag::mark`]; a single background task
//! ([`replicate`]) consumes the signal, snapshots the store file, and uploads
//! it to blob storage. Mutations that land while an upload is in flight are
//! coalesced: the task re-uploads once per drained signal and returns to idle
//! only after an upload pass during which nothing changed. An upload failure
//! is logged and not retried until the next mutation (or the shutdown flush).

use crate::store::CredentialStore;
use std::{path::Path, sync::Arc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

mod blob;
pub use self::blob::{BlobError, BlobStorage, HttpBlobStore};

/// Mutation signal shared by all request handlers.
///
/// Backed by a watch channel carrying a generation counter, so any number of
/// marks between two replicator wake-ups collapse into one.
#[derive(Clone, Debug)]
pub struct DirtyFlag {
    tx: watch::Sender<u64>,
}

impl DirtyFlag {
    #[must_use]
    pub fn new() -> (Self, watch::Receiver<u64>) {
        let (tx, rx) = watch::channel(0);
        (Self { tx }, rx)
    }

    /// Record that the store has mutations not yet mirrored remotely.
    pub fn mark(&self) {
        self.tx.send_modify(|generation| *generation += 1);
    }
}

/// Run the replication task until every [`DirtyFlag`] clone is dropped.
pub async fn replicate(
    store: Arc<CredentialStore>,
    blob: Arc<dyn BlobStorage>,
    mut dirty: watch::Receiver<u64>,
) {
    loop {
        if dirty.changed().await.is_err() {
            debug!("Dirty-flag channel closed, replicator exiting");
            return;
        }
        dirty.borrow_and_update();

        info!("Store marked dirty, starting upload");

        loop {
            upload_snapshot(&store, blob.as_ref()).await;

            // Re-upload only if a mutation landed while the upload ran.
            match dirty.has_changed() {
                Ok(true) => {
                    dirty.borrow_and_update();
                    info!("Mutations arrived during upload, uploading again");
                }
                Ok(false) => break,
                Err(_) => {
                    debug!("Dirty-flag channel closed, replicator exiting");
                    return;
                }
            }
        }
    }
}

/// One synchronous best-effort upload, used for the final flush at shutdown.
pub async fn flush(store: &CredentialStore, blob: &dyn BlobStorage) {
    upload_snapshot(store, blob).await;
}

/// Seed the local store file from the last remote snapshot on a fresh host.
/// All failure modes are non-fatal: the store opens empty and stays
/// authoritative.
pub async fn restore_if_missing(path: &Path, blob: &dyn BlobStorage) {
    if path.exists() {
        return;
    }

    info!("Local store missing, downloading snapshot from blob storage");

    match blob.download().await {
        Ok(Some(bytes)) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    if let Err(err) = tokio::fs::create_dir_all(parent).await {
                        warn!("Failed to create store directory: {err}");
                        return;
                    }
                }
            }

            match tokio::fs::write(path, &bytes).await {
                Ok(()) => info!(bytes = bytes.len(), "Restored store snapshot"),
                Err(err) => warn!("Failed to write restored snapshot: {err}"),
            }
        }
        Ok(None) => warn!("No remote snapshot found, starting with an empty store"),
        Err(err) => warn!("Failed to download store snapshot: {err}"),
    }
}

async fn upload_snapshot(store: &CredentialStore, blob: &dyn BlobStorage) {
    match store.snapshot().await {
        Ok(bytes) => match blob.upload(&bytes).await {
            Ok(()) => info!(bytes = bytes.len(), "Store upload complete"),
            Err(err) => warn!("Store upload failed: {err}"),
        },
        Err(err) => warn!("Failed to read store snapshot: {err}"),
    }
}
