/// Waitlist store
///
/// The enrollment workflow only ever talks to persistence through the
/// four query shapes below plus the analytics append. Uniqueness of
/// `email` and `access_code` and the referral increment are enforced by
/// the store itself, not by read-then-write in the caller.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryWaitlistStore;
pub use sqlite::SqliteWaitlistStore;

use super::models::{NewEntry, NewEvent, WaitlistEntry, WaitlistEvent};
use crate::error::WaitlistResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration, SubsecRound, Utc};

/// Hands out strictly increasing timestamps at the stored precision
///
/// Positions are "records created strictly before mine, plus one", so two
/// enrollments must never share a `created_at`.
#[derive(Debug, Default, Clone)]
pub struct StampClock {
    last: Option<DateTime<Utc>>,
}

impl StampClock {
    /// Resume after an already-stored timestamp
    pub fn starting_after(last: DateTime<Utc>) -> Self {
        Self { last: Some(last) }
    }

    pub fn is_seeded(&self) -> bool {
        self.last.is_some()
    }

    pub fn next(&mut self) -> DateTime<Utc> {
        self.next_from(Utc::now())
    }

    /// Stamp for a wall-clock reading; a reading at or before the last
    /// stamp moves one microsecond past it
    pub fn next_from(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        // Microseconds is what the SQLite column keeps
        let now = now.trunc_subsecs(6);
        let stamp = match self.last {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last = Some(stamp);
        stamp
    }
}

/// Exact-match point lookup
#[derive(Debug, Clone, Copy)]
pub enum Lookup<'a> {
    Email(&'a str),
    AccessCode(&'a str),
    Id(&'a str),
}

/// Filters for count queries; several filters are ANDed
#[derive(Debug, Clone, Copy)]
pub enum CountFilter {
    /// `created_at < ts`
    CreatedBefore(DateTime<Utc>),
    /// `start <= created_at <= end`
    CreatedBetween {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl CountFilter {
    pub fn matches(&self, created_at: DateTime<Utc>) -> bool {
        match *self {
            CountFilter::CreatedBefore(ts) => created_at < ts,
            CountFilter::CreatedBetween { start, end } => start <= created_at && created_at <= end,
        }
    }
}

/// Field changes applied by an update; every update also refreshes `updated_at`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryUpdate {
    /// Atomic `referral_count + 1`
    IncrementReferralCount,
    /// Set `discovered_archive`, the verified marker
    MarkDiscovered,
}

/// Persistence backend for enrollments
#[async_trait]
pub trait WaitlistStore: Send + Sync {
    /// Fetch zero or one record
    async fn find(&self, lookup: Lookup<'_>) -> WaitlistResult<Option<WaitlistEntry>>;

    /// Count records matching every filter
    async fn count(&self, filters: &[CountFilter]) -> WaitlistResult<i64>;

    /// Insert a record, assigning id and timestamps.
    ///
    /// Fails with `WaitlistError::Duplicate` when the email or access code
    /// is already taken.
    async fn insert(&self, entry: NewEntry) -> WaitlistResult<WaitlistEntry>;

    /// Apply an update to the matching record, returning rows affected
    async fn update(&self, lookup: Lookup<'_>, change: EntryUpdate) -> WaitlistResult<u64>;

    /// Append an analytics event
    async fn record_event(&self, event: NewEvent) -> WaitlistResult<()>;

    /// Events recorded for one enrollment, oldest first
    async fn events_for(&self, waitlist_id: &str) -> WaitlistResult<Vec<WaitlistEvent>>;

    /// Cheap liveness check
    async fn ping(&self) -> WaitlistResult<()>;
}
