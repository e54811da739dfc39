//! Background snapshot writer.
//!
//! Every room with persistence owns one writer task. The driver hands it the
//! newest encoded snapshot through a watch channel and never waits for the
//! store itself. Snapshots queued while a store is running collapse into the
//! newest one, and a store that never returns stalls only that room's
//! persistence.

use std::sync::Arc;

use parlor_proto::RoomId;
use tokio::sync::watch;

use crate::collaborators::Persistence;

#[derive(Clone, Default)]
struct Queued {
    generation: u64,
    bytes: Option<Arc<[u8]>>,
}

/// Handle to one room's writer task.
///
/// The task exits once the handle is dropped and the last queued snapshot
/// has been stored.
pub struct SnapshotWriter {
    queued: watch::Sender<Queued>,
    stored: watch::Receiver<u64>,
}

impl SnapshotWriter {
    /// Start the writer for `room_id`. Must be called inside a tokio runtime.
    pub fn spawn(persistence: Arc<dyn Persistence>, room_id: RoomId) -> Self {
        let (queued, requests) = watch::channel(Queued::default());
        let (done, stored) = watch::channel(0);
        tokio::spawn(run(persistence, room_id, requests, done));
        Self { queued, stored }
    }

    /// Queue `bytes`, replacing any snapshot the task has not picked up.
    pub fn submit(&self, bytes: Vec<u8>) {
        self.queued.send_modify(|queued| {
            queued.generation += 1;
            queued.bytes = Some(bytes.into());
        });
    }

    /// Wait until everything submitted so far has been handed to storage.
    pub async fn flush(&self) {
        let target = self.queued.borrow().generation;
        let mut stored = self.stored.clone();
        // Err: the task is gone and nothing more will be stored.
        let _ = stored.wait_for(|generation| *generation >= target).await;
    }
}

async fn run(
    persistence: Arc<dyn Persistence>,
    room_id: RoomId,
    mut requests: watch::Receiver<Queued>,
    done: watch::Sender<u64>,
) {
    while requests.changed().await.is_ok() {
        let Queued { generation, bytes } = requests.borrow_and_update().clone();
        if let Some(bytes) = bytes
            && let Err(e) = persistence.store(&room_id, &bytes).await
        {
            tracing::warn!(%room_id, "snapshot store failed: {e}");
        }
        done.send_modify(|stored| *stored = generation);
    }
    tracing::debug!(%room_id, "snapshot writer stopped");
}
