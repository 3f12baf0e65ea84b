//! Retained final snapshots for export
//!
//! Completed and stopped sessions leave their final records here so they
//! can be exported after the session itself is gone. Entries expire after a
//! TTL and the oldest entry is evicted once capacity is reached.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use follownet_common::{Platform, Record};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Final records of one finished session
#[derive(Debug, Clone)]
pub struct FinalSnapshot {
    pub session_id: Uuid,
    pub platform: Platform,
    pub records: Arc<Vec<Record>>,
}

#[derive(Debug)]
struct Entry {
    snapshot: FinalSnapshot,
    stored_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<Uuid, Entry>,
    order: VecDeque<Uuid>,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    inner: Arc<RwLock<Inner>>,
    ttl: Duration,
    capacity: usize,
}

impl SnapshotStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub async fn insert(&self, session_id: Uuid, platform: Platform, records: Vec<Record>) {
        let mut inner = self.inner.write().await;
        self.evict_expired(&mut inner);

        if inner.entries.contains_key(&session_id) {
            inner.order.retain(|id| *id != session_id);
        }
        while inner.order.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
                debug!("Evicted snapshot {} (capacity {})", oldest, self.capacity);
            }
        }

        inner.order.push_back(session_id);
        inner.entries.insert(
            session_id,
            Entry {
                snapshot: FinalSnapshot {
                    session_id,
                    platform,
                    records: Arc::new(records),
                },
                stored_at: Instant::now(),
            },
        );
    }

    pub async fn get(&self, session_id: Uuid) -> Option<FinalSnapshot> {
        let inner = self.inner.read().await;
        let entry = inner.entries.get(&session_id)?;
        if entry.stored_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.snapshot.clone())
    }

    pub async fn len(&self) -> usize {
        let mut inner = self.inner.write().await;
        self.evict_expired(&mut inner);
        inner.entries.len()
    }

    fn evict_expired(&self, inner: &mut Inner) {
        let ttl = self.ttl;
        let expired: Vec<Uuid> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.stored_at.elapsed() > ttl)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            inner.entries.remove(&id);
            inner.order.retain(|other| *other != id);
        }
    }
}
