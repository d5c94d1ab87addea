/// Waitlist enrollment and referral attribution
///
/// Handles signup deduplication, access code assignment, referral credits,
/// queue positions and the verification marker.

pub mod code;
pub mod models;
pub mod service;
pub mod store;

pub use code::{generate_access_code, is_valid_access_code, CodeSource, RandomCodes};
pub use models::*;
pub use service::WaitlistService;
pub use store::{
    CountFilter, EntryUpdate, Lookup, MemoryWaitlistStore, SqliteWaitlistStore, WaitlistStore,
};
