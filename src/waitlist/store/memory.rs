/// In-process waitlist store
///
/// Same guarantees as the SQLite store (unique email and access code,
/// atomic referral increments), held under one lock. Used for local
/// development and tests.
use super::{CountFilter, EntryUpdate, Lookup, StampClock, WaitlistStore};
use crate::{
    error::{WaitlistError, WaitlistResult},
    waitlist::models::{NewEntry, NewEvent, WaitlistEntry, WaitlistEvent},
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    entries: Vec<WaitlistEntry>,
    events: Vec<WaitlistEvent>,
    clock: StampClock,
}

impl MemoryState {
    fn position_of(&self, lookup: Lookup<'_>) -> Option<usize> {
        self.entries.iter().position(|e| match lookup {
            Lookup::Email(email) => e.email == email,
            Lookup::AccessCode(code) => e.access_code == code,
            Lookup::Id(id) => e.id == id,
        })
    }
}

/// Waitlist store kept in memory
#[derive(Clone, Default)]
pub struct MemoryWaitlistStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryWaitlistStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored enrollments
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl WaitlistStore for MemoryWaitlistStore {
    async fn find(&self, lookup: Lookup<'_>) -> WaitlistResult<Option<WaitlistEntry>> {
        let state = self.state.read().await;
        Ok(state.position_of(lookup).map(|idx| state.entries[idx].clone()))
    }

    async fn count(&self, filters: &[CountFilter]) -> WaitlistResult<i64> {
        let state = self.state.read().await;
        let count = state
            .entries
            .iter()
            .filter(|e| filters.iter().all(|f| f.matches(e.created_at)))
            .count();
        Ok(count as i64)
    }

    async fn insert(&self, entry: NewEntry) -> WaitlistResult<WaitlistEntry> {
        let mut state = self.state.write().await;

        if state.position_of(Lookup::Email(&entry.email)).is_some() {
            return Err(WaitlistError::Duplicate { field: "email" });
        }
        if state.position_of(Lookup::AccessCode(&entry.access_code)).is_some() {
            return Err(WaitlistError::Duplicate { field: "access_code" });
        }

        let stamp = state.clock.next();
        let stored = WaitlistEntry {
            id: Uuid::new_v4().to_string(),
            email: entry.email,
            name: entry.name,
            access_code: entry.access_code,
            discovered_archive: false,
            referral_count: 0,
            created_at: stamp,
            updated_at: stamp,
        };
        state.entries.push(stored.clone());

        Ok(stored)
    }

    async fn update(&self, lookup: Lookup<'_>, change: EntryUpdate) -> WaitlistResult<u64> {
        let mut state = self.state.write().await;

        let Some(idx) = state.position_of(lookup) else {
            return Ok(0);
        };
        let stamp = state.clock.next();
        let entry = &mut state.entries[idx];
        match change {
            EntryUpdate::IncrementReferralCount => entry.referral_count += 1,
            EntryUpdate::MarkDiscovered => entry.discovered_archive = true,
        }
        entry.updated_at = stamp;

        Ok(1)
    }

    async fn record_event(&self, event: NewEvent) -> WaitlistResult<()> {
        let mut state = self.state.write().await;
        let stamp = state.clock.next();
        state.events.push(WaitlistEvent {
            id: Uuid::new_v4().to_string(),
            waitlist_id: event.waitlist_id,
            event_type: event.event_type,
            event_data: event.event_data,
            created_at: stamp,
        });
        Ok(())
    }

    async fn events_for(&self, waitlist_id: &str) -> WaitlistResult<Vec<WaitlistEvent>> {
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.waitlist_id == waitlist_id)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> WaitlistResult<()> {
        Ok(())
    }
}
