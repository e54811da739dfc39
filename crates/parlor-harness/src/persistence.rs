//! In-memory snapshot storage with switchable failures.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use parlor_client::{Persistence, PersistenceError};
use parlor_proto::RoomId;

/// [`Persistence`] backed by a map.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    snapshots: Mutex<HashMap<RoomId, Vec<u8>>>,
    hung: Mutex<HashSet<RoomId>>,
    fail_stores: AtomicBool,
    fail_loads: AtomicBool,
    stores: AtomicUsize,
}

impl MemoryPersistence {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RoomId, Vec<u8>>> {
        self.snapshots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every `store` fail until switched back.
    pub fn fail_stores(&self, fail: bool) {
        self.fail_stores.store(fail, Ordering::SeqCst);
    }

    /// Make every `store` for `room_id` wait forever.
    pub fn hang_stores_for(&self, room_id: &RoomId) {
        self.hung.lock().unwrap_or_else(PoisonError::into_inner).insert(room_id.clone());
    }

    /// Make every `load` fail until switched back.
    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Successful `store` calls so far.
    pub fn store_count(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }

    /// Stored bytes for a room.
    pub fn get(&self, room_id: &RoomId) -> Option<Vec<u8>> {
        self.lock().get(room_id).cloned()
    }

    /// Overwrite stored bytes directly, e.g. with garbage.
    pub fn put_raw(&self, room_id: &RoomId, bytes: Vec<u8>) {
        self.lock().insert(room_id.clone(), bytes);
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn load(&self, room_id: &RoomId) -> Result<Option<Vec<u8>>, PersistenceError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(PersistenceError::Backend { reason: "injected load failure".to_owned() });
        }
        Ok(self.get(room_id))
    }

    async fn store(&self, room_id: &RoomId, snapshot: &[u8]) -> Result<(), PersistenceError> {
        let hung = self.hung.lock().unwrap_or_else(PoisonError::into_inner).contains(room_id);
        if hung {
            std::future::pending::<()>().await;
        }
        if self.fail_stores.load(Ordering::SeqCst) {
            return Err(PersistenceError::Backend { reason: "injected store failure".to_owned() });
        }
        self.put_raw(room_id, snapshot.to_vec());
        self.stores.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
