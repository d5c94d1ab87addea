/// Configuration management for the Avenir waitlist service
use crate::error::{WaitlistError, WaitlistResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub waitlist: WaitlistConfig,
    pub storage: StorageConfig,
    pub email: Option<EmailConfig>,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Enrollment workflow configuration
///
/// Passed into [`crate::waitlist::WaitlistService`] explicitly so the
/// workflow never reads process state on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitlistConfig {
    /// Public site URL used for referral links. When unset the request
    /// origin is used instead.
    pub base_url: Option<String>,
    /// Candidate codes drawn before giving up on a collision-free code
    pub max_code_attempts: u32,
}

impl Default for WaitlistConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            max_code_attempts: 10,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub backend: StoreBackendConfig,
}

/// Waitlist store backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StoreBackendConfig {
    Sqlite {
        path: PathBuf,
        max_connections: u32,
    },
    /// Process-local store, nothing survives a restart
    Memory,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Signups, verifications and share events per second
    pub write_rps: u32,
    /// Stats and health reads per second
    pub read_rps: u32,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            write_rps: 5,
            read_rps: 50,
            burst_size: 20,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> WaitlistResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("AVENIR_HOSTNAME").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("AVENIR_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| WaitlistError::Config("Invalid port number".to_string()))?;
        let version = env::var("AVENIR_VERSION")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        let base_url = env::var("AVENIR_BASE_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let max_code_attempts = env::var("AVENIR_MAX_CODE_ATTEMPTS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let data_directory: PathBuf = env::var("AVENIR_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let backend = match env::var("AVENIR_STORE").as_deref() {
            Ok("memory") => StoreBackendConfig::Memory,
            Ok("sqlite") | Err(_) => StoreBackendConfig::Sqlite {
                path: env::var("AVENIR_DB_LOCATION")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| data_directory.join("waitlist.sqlite")),
                max_connections: env::var("AVENIR_DB_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
            Ok(other) => {
                return Err(WaitlistError::Config(format!(
                    "Unknown store backend '{}', expected 'sqlite' or 'memory'",
                    other
                )))
            }
        };

        let email = if let Ok(smtp_url) = env::var("AVENIR_EMAIL_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("AVENIR_EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| format!("waitlist@{}", hostname)),
            })
        } else {
            None
        };

        let rate_limit_enabled = env::var("AVENIR_RATE_LIMITS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let write_rps = env::var("AVENIR_RATE_LIMIT_WRITE_RPS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);
        let read_rps = env::var("AVENIR_RATE_LIMIT_READ_RPS")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .unwrap_or(50);
        let burst_size = env::var("AVENIR_RATE_LIMIT_BURST")
            .unwrap_or_else(|_| "20".to_string())
            .parse()
            .unwrap_or(20);

        let log_level = env::var("RUST_LOG")
            .unwrap_or_else(|_| "avenir_waitlist=debug,tower_http=debug".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            waitlist: WaitlistConfig {
                base_url,
                max_code_attempts,
            },
            storage: StorageConfig {
                data_directory,
                backend,
            },
            email,
            rate_limit: RateLimitConfig {
                enabled: rate_limit_enabled,
                write_rps,
                read_rps,
                burst_size,
            },
            logging: LoggingConfig {
                level: log_level,
                json: env::var("AVENIR_LOG_FORMAT")
                    .map(|f| f.eq_ignore_ascii_case("json"))
                    .unwrap_or(false),
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> WaitlistResult<()> {
        if self.service.hostname.is_empty() {
            return Err(WaitlistError::Config("Hostname cannot be empty".to_string()));
        }

        if let Some(ref base_url) = self.waitlist.base_url {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(WaitlistError::Config(
                    "Base URL must start with http:// or https://".to_string(),
                ));
            }
        }

        if self.waitlist.max_code_attempts == 0 {
            return Err(WaitlistError::Config(
                "At least one access code attempt is required".to_string(),
            ));
        }

        Ok(())
    }
}
