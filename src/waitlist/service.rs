/// Enrollment workflow
///
/// Every public operation here returns a value, never an `Err`: store
/// faults are logged and folded into the non-success variant so the HTTP
/// layer can branch on the outcome alone.
use super::{
    code::{is_valid_access_code, normalize_access_code, CodeSource, RandomCodes},
    models::{
        EventType, JoinOutcome, JoinRequest, NewEntry, NewEvent, StatsSnapshot, WaitlistEntry,
        WaitlistStats,
    },
    store::{CountFilter, EntryUpdate, Lookup, WaitlistStore},
};
use crate::{
    config::WaitlistConfig,
    error::{WaitlistError, WaitlistResult},
    metrics,
};
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use validator::ValidateEmail;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred. Please try again.";
pub const INSERT_FAILED_MESSAGE: &str = "Failed to join waitlist. Please try again.";
const MAX_NAME_LEN: usize = 100;
const MAX_CHANNEL_LEN: usize = 32;

/// Validated and normalized signup input
#[derive(Debug)]
struct Signup {
    name: String,
    email: String,
    referral_code: Option<String>,
    utm_source: Option<String>,
    utm_campaign: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Signup {
    fn parse(request: JoinRequest) -> Result<Self, String> {
        let name = request.name.trim().to_string();
        let email = request.email.trim().to_lowercase();

        if name.is_empty() || email.is_empty() {
            return Err("Name and email are required".to_string());
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(format!("Name must be at most {} characters", MAX_NAME_LEN));
        }
        if !email.validate_email() {
            return Err("Please enter a valid email address".to_string());
        }

        Ok(Self {
            name,
            email,
            referral_code: non_empty(request.referral_code).map(|c| normalize_access_code(&c)),
            utm_source: non_empty(request.utm_source),
            utm_campaign: non_empty(request.utm_campaign),
        })
    }
}

/// First and last millisecond of the UTC day containing `now`
pub fn utc_day_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::default()));
    let end = start + Duration::days(1) - Duration::milliseconds(1);
    (start, end)
}

/// Waitlist enrollment service
pub struct WaitlistService {
    store: Arc<dyn WaitlistStore>,
    config: WaitlistConfig,
    codes: Arc<dyn CodeSource>,
}

impl WaitlistService {
    pub fn new(store: Arc<dyn WaitlistStore>, config: WaitlistConfig) -> Self {
        Self {
            store,
            config,
            codes: Arc::new(RandomCodes),
        }
    }

    /// Replace the access code source
    pub fn with_code_source(mut self, codes: Arc<dyn CodeSource>) -> Self {
        self.codes = codes;
        self
    }

    pub fn store(&self) -> &Arc<dyn WaitlistStore> {
        &self.store
    }

    pub fn config(&self) -> &WaitlistConfig {
        &self.config
    }

    /// Enroll a new signup
    ///
    /// `request_origin` is used for the referral link when no base URL is
    /// configured.
    pub async fn join_waitlist(
        &self,
        request: JoinRequest,
        request_origin: Option<&str>,
    ) -> JoinOutcome {
        let signup = match Signup::parse(request) {
            Ok(signup) => signup,
            Err(message) => {
                debug!(reason = %message, "waitlist_join_rejected");
                metrics::record_signup("rejected");
                return JoinOutcome::Rejected { message };
            }
        };

        let outcome = match self.try_join(&signup, request_origin).await {
            Ok(outcome) => outcome,
            Err(WaitlistError::CodeSpaceExhausted { attempts }) => {
                error!(attempts, "waitlist_join_failed: no free access code");
                JoinOutcome::Failed {
                    message: UNEXPECTED_ERROR_MESSAGE.to_string(),
                }
            }
            Err(e) => {
                error!(error = %e, "waitlist_join_failed");
                JoinOutcome::Failed {
                    message: UNEXPECTED_ERROR_MESSAGE.to_string(),
                }
            }
        };

        metrics::record_signup(match outcome {
            JoinOutcome::Joined { .. } => "joined",
            JoinOutcome::AlreadyRegistered { .. } => "duplicate",
            JoinOutcome::Rejected { .. } => "rejected",
            JoinOutcome::Failed { .. } => "failed",
        });

        outcome
    }

    async fn try_join(
        &self,
        signup: &Signup,
        request_origin: Option<&str>,
    ) -> WaitlistResult<JoinOutcome> {
        if let Some(existing) = self.store.find(Lookup::Email(&signup.email)).await? {
            debug!(access_code = %existing.access_code, "waitlist_join_duplicate");
            return self.already_registered(&existing).await;
        }

        let access_code = self.assign_access_code().await?;
        let position = self.store.count(&[]).await? + 1;

        let referrer_id = match signup.referral_code {
            Some(ref code) => self.credit_referrer(code).await,
            None => None,
        };

        let entry = match self
            .store
            .insert(NewEntry {
                name: signup.name.clone(),
                email: signup.email.clone(),
                access_code,
            })
            .await
        {
            Ok(entry) => entry,
            Err(WaitlistError::Duplicate { field: "email" }) => {
                // Another request for this email got in between the check and the insert
                if let Some(ref referrer_id) = referrer_id {
                    warn!(
                        referrer_id = %referrer_id,
                        referral_code = signup.referral_code.as_deref().unwrap_or_default(),
                        "referral_credited_for_duplicate_signup"
                    );
                }
                let existing = self
                    .store
                    .find(Lookup::Email(&signup.email))
                    .await?
                    .ok_or_else(|| {
                        WaitlistError::Internal("Duplicate email vanished after insert".to_string())
                    })?;
                return self.already_registered(&existing).await;
            }
            Err(e) => {
                warn!(error = %e, "waitlist_insert_failed");
                return Ok(JoinOutcome::Failed {
                    message: insert_failure_message(&e),
                });
            }
        };

        self.log_event(
            &entry.id,
            EventType::Signup,
            json!({
                "utm_source": signup.utm_source,
                "utm_campaign": signup.utm_campaign,
                "referral_code": signup.referral_code,
            }),
        )
        .await;

        if let Some(ref referrer_id) = referrer_id {
            self.log_event(referrer_id, EventType::Referral, json!({ "referred_id": entry.id }))
                .await;
        }

        info!(
            access_code = %entry.access_code,
            position,
            referred = referrer_id.is_some(),
            "waitlist_joined"
        );

        Ok(JoinOutcome::Joined {
            referral_link: self.referral_link(&entry.access_code, request_origin),
            access_code: entry.access_code,
            position,
        })
    }

    async fn already_registered(&self, existing: &WaitlistEntry) -> WaitlistResult<JoinOutcome> {
        Ok(JoinOutcome::AlreadyRegistered {
            access_code: existing.access_code.clone(),
            position: self.position_of(existing).await?,
        })
    }

    /// 1-based rank of an enrollment by creation time
    pub async fn position_of(&self, entry: &WaitlistEntry) -> WaitlistResult<i64> {
        let earlier = self
            .store
            .count(&[CountFilter::CreatedBefore(entry.created_at)])
            .await?;
        Ok(earlier + 1)
    }

    async fn assign_access_code(&self) -> WaitlistResult<String> {
        let attempts = self.config.max_code_attempts.max(1);

        for attempt in 1..=attempts {
            let candidate = self.codes.next_code();
            if self
                .store
                .find(Lookup::AccessCode(&candidate))
                .await?
                .is_none()
            {
                return Ok(candidate);
            }
            metrics::record_code_collision();
            debug!(attempt, candidate = %candidate, "access_code_collision");
        }

        Err(WaitlistError::CodeSpaceExhausted { attempts })
    }

    /// Credit the owner of `code`, returning their id. Misses and store
    /// faults never block the enrollment.
    async fn credit_referrer(&self, code: &str) -> Option<String> {
        if !is_valid_access_code(code) {
            debug!(referral_code = %code, "referral_code_malformed");
            return None;
        }

        let referrer = match self.store.find(Lookup::AccessCode(code)).await {
            Ok(Some(referrer)) => referrer,
            Ok(None) => {
                debug!(referral_code = %code, "referral_code_unknown");
                return None;
            }
            Err(e) => {
                warn!(error = %e, referral_code = %code, "referral_lookup_failed");
                return None;
            }
        };

        match self
            .store
            .update(Lookup::Id(&referrer.id), EntryUpdate::IncrementReferralCount)
            .await
        {
            Ok(n) if n > 0 => {
                metrics::record_referral_credit();
                Some(referrer.id)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, referral_code = %code, "referral_credit_failed");
                None
            }
        }
    }

    /// Shareable link for an access code
    pub fn referral_link(&self, access_code: &str, request_origin: Option<&str>) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .or(request_origin)
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or(DEFAULT_BASE_URL);

        format!(
            "{}/waitlist?ref={}",
            base.trim_end_matches('/'),
            urlencoding::encode(access_code)
        )
    }

    /// Total and same-day counts, with store faults kept visible
    pub async fn stats_snapshot(&self) -> StatsSnapshot {
        let (start, end) = utc_day_bounds(Utc::now());
        let today_filter = [CountFilter::CreatedBetween { start, end }];

        let (total, today) = tokio::join!(self.store.count(&[]), self.store.count(&today_filter));

        match (total, today) {
            (Ok(total), Ok(today_count)) => StatsSnapshot::Available(WaitlistStats {
                total,
                today_count,
            }),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "waitlist_stats_unavailable");
                StatsSnapshot::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Stats for display; zeros when the store is unavailable
    pub async fn get_waitlist_stats(&self) -> WaitlistStats {
        self.stats_snapshot().await.or_zero()
    }

    /// Mark the enrollment owning `access_code` as email-verified
    pub async fn verify_email(&self, access_code: &str) -> bool {
        let code = normalize_access_code(access_code);
        if !is_valid_access_code(&code) {
            metrics::record_verification(false);
            return false;
        }

        let verified = match self
            .store
            .update(Lookup::AccessCode(&code), EntryUpdate::MarkDiscovered)
            .await
        {
            Ok(0) => {
                debug!(access_code = %code, "verification_code_unknown");
                false
            }
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, access_code = %code, "verification_failed");
                false
            }
        };

        if verified {
            match self.store.find(Lookup::AccessCode(&code)).await {
                Ok(Some(entry)) => {
                    self.log_event(&entry.id, EventType::Verification, json!({}))
                        .await
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "verification_event_lookup_failed"),
            }
        }

        metrics::record_verification(verified);
        verified
    }

    /// Record that the owner of `access_code` shared their link
    pub async fn record_share(&self, access_code: &str, channel: &str) -> bool {
        let code = normalize_access_code(access_code);
        if !is_valid_access_code(&code) {
            return false;
        }

        let channel: String = match channel.trim() {
            "" => "unknown".to_string(),
            c => c.chars().take(MAX_CHANNEL_LEN).collect::<String>().to_lowercase(),
        };

        let entry = match self.store.find(Lookup::AccessCode(&code)).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return false,
            Err(e) => {
                warn!(error = %e, "share_lookup_failed");
                return false;
            }
        };

        match self
            .store
            .record_event(NewEvent {
                waitlist_id: entry.id,
                event_type: EventType::Share,
                event_data: json!({ "channel": channel }),
            })
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "share_event_failed");
                false
            }
        }
    }

    async fn log_event(&self, waitlist_id: &str, event_type: EventType, data: serde_json::Value) {
        let event = NewEvent {
            waitlist_id: waitlist_id.to_string(),
            event_type,
            event_data: data,
        };
        if let Err(e) = self.store.record_event(event).await {
            warn!(error = %e, event_type = event_type.as_str(), "analytics_event_failed");
        }
    }
}

fn insert_failure_message(err: &WaitlistError) -> String {
    match err {
        WaitlistError::Database(sqlx::Error::Database(_)) | WaitlistError::Store(_) => {
            err.display_message()
        }
        _ => INSERT_FAILED_MESSAGE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waitlist::{
        models::WaitlistEvent,
        store::{MemoryWaitlistStore, SqliteWaitlistStore},
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    const BASE: &str = "https://avenir.example";

    /// Plays back fixed codes, repeating the last one
    struct ScriptedCodes {
        codes: Mutex<Vec<String>>,
    }

    impl ScriptedCodes {
        fn new(codes: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                codes: Mutex::new(codes.iter().rev().map(|c| c.to_string()).collect()),
            })
        }
    }

    impl CodeSource for ScriptedCodes {
        fn next_code(&self) -> String {
            let mut codes = self.codes.lock().unwrap();
            if codes.len() > 1 {
                codes.pop().unwrap()
            } else {
                codes[0].clone()
            }
        }
    }

    /// Memory store with switchable faults
    #[derive(Default)]
    struct FaultyStore {
        inner: MemoryWaitlistStore,
        fail_inserts: AtomicBool,
        fail_counts: AtomicBool,
        fail_updates: AtomicBool,
        fail_events: AtomicBool,
        /// Email lookups miss, as if a concurrent insert had not landed yet
        stale_email_reads: AtomicBool,
        /// Inserts lose an access code race
        taken_code_inserts: AtomicBool,
    }

    fn fault(flag: &AtomicBool, what: &str) -> WaitlistResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(WaitlistError::Store(format!("{} rejected by store", what)))
        } else {
            Ok(())
        }
    }

    #[async_trait]
    impl WaitlistStore for FaultyStore {
        async fn find(&self, lookup: Lookup<'_>) -> WaitlistResult<Option<WaitlistEntry>> {
            if let Lookup::Email(_) = lookup {
                if self.stale_email_reads.swap(false, Ordering::SeqCst) {
                    return Ok(None);
                }
            }
            self.inner.find(lookup).await
        }

        async fn count(&self, filters: &[CountFilter]) -> WaitlistResult<i64> {
            fault(&self.fail_counts, "count")?;
            self.inner.count(filters).await
        }

        async fn insert(&self, entry: NewEntry) -> WaitlistResult<WaitlistEntry> {
            fault(&self.fail_inserts, "insert")?;
            if self.taken_code_inserts.load(Ordering::SeqCst) {
                return Err(WaitlistError::Duplicate {
                    field: "access_code",
                });
            }
            self.inner.insert(entry).await
        }

        async fn update(&self, lookup: Lookup<'_>, change: EntryUpdate) -> WaitlistResult<u64> {
            fault(&self.fail_updates, "update")?;
            self.inner.update(lookup, change).await
        }

        async fn record_event(&self, event: NewEvent) -> WaitlistResult<()> {
            fault(&self.fail_events, "event")?;
            self.inner.record_event(event).await
        }

        async fn events_for(&self, waitlist_id: &str) -> WaitlistResult<Vec<WaitlistEvent>> {
            self.inner.events_for(waitlist_id).await
        }

        async fn ping(&self) -> WaitlistResult<()> {
            Ok(())
        }
    }

    fn config() -> WaitlistConfig {
        WaitlistConfig {
            base_url: Some(BASE.to_string()),
            max_code_attempts: 10,
        }
    }

    fn memory_service() -> WaitlistService {
        WaitlistService::new(Arc::new(MemoryWaitlistStore::new()), config())
    }

    fn faulty_service() -> (Arc<FaultyStore>, WaitlistService) {
        let store = Arc::new(FaultyStore::default());
        let service = WaitlistService::new(store.clone(), config());
        (store, service)
    }

    async fn entry_by_code(service: &WaitlistService, code: &str) -> WaitlistEntry {
        service
            .store()
            .find(Lookup::AccessCode(code))
            .await
            .unwrap()
            .expect("entry should exist")
    }

    fn joined_code(outcome: &JoinOutcome) -> String {
        assert!(outcome.is_success(), "expected success, got {:?}", outcome);
        outcome.access_code().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let service = memory_service();

        let ada = service
            .join_waitlist(JoinRequest::new("Ada", "ada@example.com"), None)
            .await;
        let ada_code = joined_code(&ada);
        assert!(is_valid_access_code(&ada_code));
        assert_eq!(ada.position(), Some(1));
        assert_eq!(
            ada,
            JoinOutcome::Joined {
                access_code: ada_code.clone(),
                position: 1,
                referral_link: format!("{}/waitlist?ref={}", BASE, ada_code),
            }
        );

        let bob = service
            .join_waitlist(
                JoinRequest::new("Bob", "bob@example.com").referred_by(ada_code.clone()),
                None,
            )
            .await;
        assert!(bob.is_success());
        assert_eq!(bob.position(), Some(2));
        assert_eq!(entry_by_code(&service, &ada_code).await.referral_count, 1);

        let again = service
            .join_waitlist(JoinRequest::new("Ada2", "ada@example.com"), None)
            .await;
        assert!(!again.is_success());
        assert_eq!(
            again,
            JoinOutcome::AlreadyRegistered {
                access_code: ada_code.clone(),
                position: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_end_to_end_on_sqlite() {
        let pool = crate::db::create_memory_pool().await.unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        let service = WaitlistService::new(Arc::new(SqliteWaitlistStore::new(pool)), config());

        let ada = service
            .join_waitlist(JoinRequest::new("Ada", "ada@example.com"), None)
            .await;
        let ada_code = joined_code(&ada);

        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let bob = service
            .join_waitlist(
                JoinRequest::new("Bob", "bob@example.com").referred_by(ada_code.clone()),
                None,
            )
            .await;
        assert_eq!(bob.position(), Some(2));
        assert_eq!(entry_by_code(&service, &ada_code).await.referral_count, 1);

        let again = service
            .join_waitlist(JoinRequest::new("Ada2", "ADA@example.com"), None)
            .await;
        assert_eq!(again.access_code(), Some(ada_code.as_str()));
        assert_eq!(again.position(), Some(1));
    }

    #[tokio::test]
    async fn test_email_identity_is_case_insensitive() {
        let service = memory_service();

        let first = service
            .join_waitlist(JoinRequest::new("Foo", "Foo@Bar.COM"), None)
            .await;
        let code = joined_code(&first);

        let entry = entry_by_code(&service, &code).await;
        assert_eq!(entry.email, "foo@bar.com");

        let second = service
            .join_waitlist(JoinRequest::new("Foo", "  foo@bar.com "), None)
            .await;
        assert!(matches!(second, JoinOutcome::AlreadyRegistered { .. }));
        assert_eq!(second.access_code(), Some(code.as_str()));
    }

    #[tokio::test]
    async fn test_unknown_referral_code_is_ignored() {
        let service = memory_service();
        let ada = service
            .join_waitlist(JoinRequest::new("Ada", "ada@example.com"), None)
            .await;
        let ada_code = joined_code(&ada);

        for bogus in ["AV-ZZZZZZ", "not-a-code", ""] {
            let email = format!("{}@example.com", bogus.len());
            let outcome = service
                .join_waitlist(JoinRequest::new("Guest", email).referred_by(bogus), None)
                .await;
            assert!(outcome.is_success(), "referral {:?} blocked signup", bogus);
        }

        assert_eq!(entry_by_code(&service, &ada_code).await.referral_count, 0);
    }

    #[tokio::test]
    async fn test_referral_code_is_normalized() {
        let service = memory_service();
        let ada = service
            .join_waitlist(JoinRequest::new("Ada", "ada@example.com"), None)
            .await;
        let ada_code = joined_code(&ada);

        let typed = format!(" {} ", ada_code.to_lowercase());
        service
            .join_waitlist(JoinRequest::new("Bob", "bob@example.com").referred_by(typed), None)
            .await;

        assert_eq!(entry_by_code(&service, &ada_code).await.referral_count, 1);
    }

    #[tokio::test]
    async fn test_rejects_invalid_input_without_touching_store() {
        let (store, service) = faulty_service();

        let cases = [
            JoinRequest::new("", "ada@example.com"),
            JoinRequest::new("Ada", "   "),
            JoinRequest::new("Ada", "not-an-email"),
            JoinRequest::new("x".repeat(101), "ada@example.com"),
        ];
        for request in cases {
            let outcome = service.join_waitlist(request, None).await;
            assert!(
                matches!(outcome, JoinOutcome::Rejected { .. }),
                "expected rejection, got {:?}",
                outcome
            );
        }

        assert!(store.inner.is_empty().await);
    }

    #[tokio::test]
    async fn test_retries_colliding_codes() {
        let store = Arc::new(MemoryWaitlistStore::new());
        store
            .insert(NewEntry {
                name: "Early".to_string(),
                email: "early@example.com".to_string(),
                access_code: "AV-222222".to_string(),
            })
            .await
            .unwrap();

        let service = WaitlistService::new(store.clone(), config())
            .with_code_source(ScriptedCodes::new(&["AV-222222", "AV-222222", "AV-333333"]));

        let outcome = service
            .join_waitlist(JoinRequest::new("Ada", "ada@example.com"), None)
            .await;
        assert_eq!(outcome.access_code(), Some("AV-333333"));
        assert_eq!(outcome.position(), Some(2));
    }

    #[tokio::test]
    async fn test_fails_when_every_code_collides() {
        let store = Arc::new(MemoryWaitlistStore::new());
        store
            .insert(NewEntry {
                name: "Early".to_string(),
                email: "early@example.com".to_string(),
                access_code: "AV-222222".to_string(),
            })
            .await
            .unwrap();

        let service = WaitlistService::new(store.clone(), config())
            .with_code_source(ScriptedCodes::new(&["AV-222222"]));

        let outcome = service
            .join_waitlist(JoinRequest::new("Ada", "ada@example.com"), None)
            .await;
        assert_eq!(
            outcome,
            JoinOutcome::Failed {
                message: UNEXPECTED_ERROR_MESSAGE.to_string()
            }
        );
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_insert_failure_is_reported() {
        let (store, service) = faulty_service();
        store.fail_inserts.store(true, Ordering::SeqCst);

        let outcome = service
            .join_waitlist(JoinRequest::new("Ada", "ada@example.com"), None)
            .await;
        assert_eq!(
            outcome,
            JoinOutcome::Failed {
                message: "insert rejected by store".to_string()
            }
        );
        assert!(store.inner.is_empty().await);
    }

    #[tokio::test]
    async fn test_lookup_fault_maps_to_unexpected_error() {
        let (store, service) = faulty_service();
        store.fail_counts.store(true, Ordering::SeqCst);

        let outcome = service
            .join_waitlist(JoinRequest::new("Ada", "ada@example.com"), None)
            .await;
        assert_eq!(
            outcome,
            JoinOutcome::Failed {
                message: UNEXPECTED_ERROR_MESSAGE.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_resolves_to_existing_entry() {
        let (store, service) = faulty_service();

        let first = service
            .join_waitlist(JoinRequest::new("Ada", "ada@example.com"), None)
            .await;
        let code = joined_code(&first);

        store.stale_email_reads.store(true, Ordering::SeqCst);
        let second = service
            .join_waitlist(JoinRequest::new("Ada", "ada@example.com"), None)
            .await;

        assert_eq!(
            second,
            JoinOutcome::AlreadyRegistered {
                access_code: code,
                position: 1,
            }
        );
        assert_eq!(store.inner.len().await, 1);
    }

    #[tokio::test]
    async fn test_lost_access_code_race_fails_without_retry() {
        let (store, service) = faulty_service();
        store.taken_code_inserts.store(true, Ordering::SeqCst);

        let outcome = service
            .join_waitlist(JoinRequest::new("Ada", "ada@example.com"), None)
            .await;
        assert_eq!(
            outcome,
            JoinOutcome::Failed {
                message: INSERT_FAILED_MESSAGE.to_string()
            }
        );
        assert!(store.inner.is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_race_keeps_earlier_referral_credit() {
        let (store, service) = faulty_service();
        let ada = service
            .join_waitlist(JoinRequest::new("Ada", "ada@example.com"), None)
            .await;
        let ada_code = joined_code(&ada);
        let bob = service
            .join_waitlist(JoinRequest::new("Bob", "bob@example.com"), None)
            .await;
        let bob_code = joined_code(&bob);

        // Bob signs up again through Ada's link and the email check misses
        store.stale_email_reads.store(true, Ordering::SeqCst);
        let again = service
            .join_waitlist(
                JoinRequest::new("Bob", "bob@example.com").referred_by(ada_code.clone()),
                None,
            )
            .await;

        assert_eq!(
            again,
            JoinOutcome::AlreadyRegistered {
                access_code: bob_code,
                position: 2,
            }
        );
        assert_eq!(store.inner.len().await, 2);
        // Crediting precedes the insert, so the race leaves Ada's credit in place
        assert_eq!(entry_by_code(&service, &ada_code).await.referral_count, 1);
    }

    #[tokio::test]
    async fn test_side_effect_faults_do_not_block_signup() {
        let (store, service) = faulty_service();
        let ada = service
            .join_waitlist(JoinRequest::new("Ada", "ada@example.com"), None)
            .await;
        let ada_code = joined_code(&ada);

        store.fail_updates.store(true, Ordering::SeqCst);
        store.fail_events.store(true, Ordering::SeqCst);

        let bob = service
            .join_waitlist(
                JoinRequest::new("Bob", "bob@example.com").referred_by(ada_code.clone()),
                None,
            )
            .await;
        assert!(bob.is_success());
        assert_eq!(entry_by_code(&service, &ada_code).await.referral_count, 0);
    }

    #[tokio::test]
    async fn test_stats_count_today() {
        let service = memory_service();
        assert_eq!(
            service.stats_snapshot().await,
            StatsSnapshot::Available(WaitlistStats::default())
        );

        for i in 0..5 {
            let outcome = service
                .join_waitlist(JoinRequest::new("User", format!("user{}@example.com", i)), None)
                .await;
            assert!(outcome.is_success());
        }

        assert_eq!(
            service.get_waitlist_stats().await,
            WaitlistStats {
                total: 5,
                today_count: 5
            }
        );
    }

    #[tokio::test]
    async fn test_stats_unavailable_reads_as_zero() {
        let (store, service) = faulty_service();
        service
            .join_waitlist(JoinRequest::new("Ada", "ada@example.com"), None)
            .await;
        store.fail_counts.store(true, Ordering::SeqCst);

        assert!(matches!(
            service.stats_snapshot().await,
            StatsSnapshot::Unavailable { .. }
        ));
        assert_eq!(service.get_waitlist_stats().await, WaitlistStats::default());
    }

    #[tokio::test]
    async fn test_verify_email() {
        let (store, service) = faulty_service();
        let ada = service
            .join_waitlist(JoinRequest::new("Ada", "ada@example.com"), None)
            .await;
        let ada_code = joined_code(&ada);

        assert!(!service.verify_email("AV-ZZZZZZ").await);
        assert!(!service.verify_email("garbage").await);

        assert!(service.verify_email(&ada_code.to_lowercase()).await);
        let entry = entry_by_code(&service, &ada_code).await;
        assert!(entry.discovered_archive);

        let events = store.events_for(&entry.id).await.unwrap();
        assert!(events.iter().any(|e| e.event_type == EventType::Verification));

        store.fail_updates.store(true, Ordering::SeqCst);
        assert!(!service.verify_email(&ada_code).await);
    }

    #[tokio::test]
    async fn test_analytics_events() {
        let service = memory_service();
        let ada = service
            .join_waitlist(
                JoinRequest {
                    name: "Ada".to_string(),
                    email: "ada@example.com".to_string(),
                    referral_code: None,
                    utm_source: Some("newsletter".to_string()),
                    utm_campaign: Some(" ".to_string()),
                },
                None,
            )
            .await;
        let ada_code = joined_code(&ada);
        let ada_entry = entry_by_code(&service, &ada_code).await;

        let bob = service
            .join_waitlist(
                JoinRequest::new("Bob", "bob@example.com").referred_by(ada_code.clone()),
                None,
            )
            .await;
        let bob_entry = entry_by_code(&service, &joined_code(&bob)).await;

        assert!(service.record_share(&ada_code, "Twitter").await);
        assert!(!service.record_share("AV-ZZZZZZ", "twitter").await);

        let events = service.store().events_for(&ada_entry.id).await.unwrap();
        let kinds: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            kinds,
            vec![EventType::Signup, EventType::Referral, EventType::Share]
        );
        assert_eq!(events[0].event_data["utm_source"], "newsletter");
        assert!(events[0].event_data["utm_campaign"].is_null());
        assert_eq!(events[1].event_data["referred_id"], bob_entry.id.as_str());
        assert_eq!(events[2].event_data["channel"], "twitter");

        let bob_events = service.store().events_for(&bob_entry.id).await.unwrap();
        assert_eq!(bob_events[0].event_data["referral_code"], ada_code.as_str());
    }

    #[test]
    fn test_referral_link_fallbacks() {
        let store: Arc<dyn WaitlistStore> = Arc::new(MemoryWaitlistStore::new());

        let configured = WaitlistService::new(
            store.clone(),
            WaitlistConfig {
                base_url: Some("https://avenir.example/".to_string()),
                max_code_attempts: 10,
            },
        );
        assert_eq!(
            configured.referral_link("AV-ABCDEF", Some("http://origin.test")),
            "https://avenir.example/waitlist?ref=AV-ABCDEF"
        );

        let unconfigured = WaitlistService::new(store, WaitlistConfig::default());
        assert_eq!(
            unconfigured.referral_link("AV-ABCDEF", Some("http://origin.test")),
            "http://origin.test/waitlist?ref=AV-ABCDEF"
        );
        assert_eq!(
            unconfigured.referral_link("AV-ABCDEF", None),
            "http://localhost:3000/waitlist?ref=AV-ABCDEF"
        );
    }

    #[test]
    fn test_utc_day_bounds() {
        let now = Utc.with_ymd_and_hms(2026, 5, 17, 13, 45, 10).unwrap();
        let (start, end) = utc_day_bounds(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 5, 17, 0, 0, 0).unwrap());
        assert_eq!(
            end,
            Utc.with_ymd_and_hms(2026, 5, 17, 23, 59, 59).unwrap() + Duration::milliseconds(999)
        );
    }
}
