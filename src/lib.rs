/// Avenir waitlist service
///
/// Enrollment, access codes and referral attribution behind a small HTTP API.
pub mod api;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod mailer;
pub mod metrics;
pub mod rate_limit;
pub mod server;
pub mod waitlist;
