/// SQLite-backed waitlist store
use super::{CountFilter, EntryUpdate, Lookup, StampClock, WaitlistStore};
use crate::{
    db::{from_db_timestamp, to_db_timestamp},
    error::{WaitlistError, WaitlistResult},
    waitlist::models::{EventType, NewEntry, NewEvent, WaitlistEntry, WaitlistEvent},
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const ENTRY_COLUMNS: &str =
    "id, email, name, access_code, discovered_archive, referral_count, created_at, updated_at";

/// Waitlist store on a SQLite pool
///
/// Creation stamps are strictly increasing for every clone of one store.
/// Separate processes writing the same file are not coordinated.
#[derive(Clone)]
pub struct SqliteWaitlistStore {
    db: SqlitePool,
    clock: Arc<Mutex<StampClock>>,
}

impl SqliteWaitlistStore {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            clock: Arc::new(Mutex::new(StampClock::default())),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Next creation stamp, resuming after the newest stored row on first use
    async fn next_stamp(&self) -> WaitlistResult<String> {
        let seeded = self.lock_clock()?.is_seeded();
        if !seeded {
            let newest: Option<String> = sqlx::query_scalar("SELECT MAX(created_at) FROM waitlist")
                .fetch_one(&self.db)
                .await?;
            if let Some(newest) = newest {
                let newest = from_db_timestamp(&newest)?;
                let mut clock = self.lock_clock()?;
                if !clock.is_seeded() {
                    *clock = StampClock::starting_after(newest);
                }
            }
        }

        let stamp = self.lock_clock()?.next();
        Ok(to_db_timestamp(stamp))
    }

    fn lock_clock(&self) -> WaitlistResult<std::sync::MutexGuard<'_, StampClock>> {
        self.clock
            .lock()
            .map_err(|_| WaitlistError::Internal("Stamp clock lock poisoned".to_string()))
    }
}

fn lookup_clause(lookup: Lookup<'_>) -> (&'static str, &str) {
    match lookup {
        Lookup::Email(email) => ("email", email),
        Lookup::AccessCode(code) => ("access_code", code),
        Lookup::Id(id) => ("id", id),
    }
}

fn entry_from_row(row: &SqliteRow) -> WaitlistResult<WaitlistEntry> {
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(WaitlistEntry {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        access_code: row.try_get("access_code")?,
        discovered_archive: row.try_get("discovered_archive")?,
        referral_count: row.try_get("referral_count")?,
        created_at: from_db_timestamp(&created_at)?,
        updated_at: from_db_timestamp(&updated_at)?,
    })
}

/// Turn unique index violations into `Duplicate` so callers can branch on them
fn map_write_error(err: sqlx::Error) -> WaitlistError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            let message = db_err.message();
            if message.contains("waitlist.email") {
                return WaitlistError::Duplicate { field: "email" };
            }
            if message.contains("waitlist.access_code") {
                return WaitlistError::Duplicate { field: "access_code" };
            }
        }
    }
    WaitlistError::Database(err)
}

#[async_trait]
impl WaitlistStore for SqliteWaitlistStore {
    async fn find(&self, lookup: Lookup<'_>) -> WaitlistResult<Option<WaitlistEntry>> {
        let (column, value) = lookup_clause(lookup);
        let sql = format!("SELECT {} FROM waitlist WHERE {} = ?", ENTRY_COLUMNS, column);

        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn count(&self, filters: &[CountFilter]) -> WaitlistResult<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM waitlist");

        for (i, filter) in filters.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            match *filter {
                CountFilter::CreatedBefore(ts) => {
                    qb.push("created_at < ").push_bind(to_db_timestamp(ts));
                }
                CountFilter::CreatedBetween { start, end } => {
                    qb.push("created_at >= ")
                        .push_bind(to_db_timestamp(start))
                        .push(" AND created_at <= ")
                        .push_bind(to_db_timestamp(end));
                }
            }
        }

        let count: i64 = qb.build_query_scalar::<i64>().fetch_one(&self.db).await?;
        Ok(count)
    }

    async fn insert(&self, entry: NewEntry) -> WaitlistResult<WaitlistEntry> {
        let id = Uuid::new_v4().to_string();
        let ts = self.next_stamp().await?;

        sqlx::query(
            r#"
            INSERT INTO waitlist (id, email, name, access_code, discovered_archive, referral_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, 0, 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&entry.email)
        .bind(&entry.name)
        .bind(&entry.access_code)
        .bind(&ts)
        .bind(&ts)
        .execute(&self.db)
        .await
        .map_err(map_write_error)?;

        // Round-trip through the stored text so the returned value matches later reads
        let stamped = from_db_timestamp(&ts)?;

        Ok(WaitlistEntry {
            id,
            email: entry.email,
            name: entry.name,
            access_code: entry.access_code,
            discovered_archive: false,
            referral_count: 0,
            created_at: stamped,
            updated_at: stamped,
        })
    }

    async fn update(&self, lookup: Lookup<'_>, change: EntryUpdate) -> WaitlistResult<u64> {
        let (column, value) = lookup_clause(lookup);
        let set_clause = match change {
            EntryUpdate::IncrementReferralCount => "referral_count = referral_count + 1",
            EntryUpdate::MarkDiscovered => "discovered_archive = 1",
        };
        let sql = format!(
            "UPDATE waitlist SET {}, updated_at = ? WHERE {} = ?",
            set_clause, column
        );

        let result = sqlx::query(&sql)
            .bind(to_db_timestamp(Utc::now()))
            .bind(value)
            .execute(&self.db)
            .await
            .map_err(map_write_error)?;

        Ok(result.rows_affected())
    }

    async fn record_event(&self, event: NewEvent) -> WaitlistResult<()> {
        let data = serde_json::to_string(&event.event_data)
            .map_err(|e| WaitlistError::Internal(format!("Unserializable event data: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO waitlist_analytics (id, waitlist_id, event_type, event_data, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&event.waitlist_id)
        .bind(event.event_type.as_str())
        .bind(data)
        .bind(to_db_timestamp(Utc::now()))
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn events_for(&self, waitlist_id: &str) -> WaitlistResult<Vec<WaitlistEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, waitlist_id, event_type, event_data, created_at
            FROM waitlist_analytics
            WHERE waitlist_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(waitlist_id)
        .fetch_all(&self.db)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let event_type: String = row.try_get("event_type")?;
            let event_data: String = row.try_get("event_data")?;
            let created_at: String = row.try_get("created_at")?;

            events.push(WaitlistEvent {
                id: row.try_get("id")?,
                waitlist_id: row.try_get("waitlist_id")?,
                event_type: EventType::parse(&event_type).ok_or_else(|| {
                    WaitlistError::Internal(format!("Unknown event type: {}", event_type))
                })?,
                event_data: serde_json::from_str(&event_data)
                    .map_err(|e| WaitlistError::Internal(format!("Invalid event data: {}", e)))?,
                created_at: from_db_timestamp(&created_at)?,
            });
        }

        Ok(events)
    }

    async fn ping(&self) -> WaitlistResult<()> {
        crate::db::test_connection(&self.db).await
    }
}
