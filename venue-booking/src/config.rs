//! Configuration management for the venue booking server.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::aggregates::AccountPolicy;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite configuration
    pub database: DatabaseConfig,
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Session cookie configuration
    pub session: SessionConfig,
    /// Outbound email configuration
    pub mail: MailConfig,
    /// Account lifecycle timings
    pub accounts: AccountsConfig,
}

/// SQLite configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `sqlx` connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Frontend origin allowed to send credentialed requests
    pub cors_origin: String,
    /// Request body limit, sized for payment screenshots
    pub max_upload_bytes: usize,
    /// Seconds to wait for background jobs on shutdown
    pub shutdown_timeout: u64,
}

/// Session cookie configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// HS256 signing secret
    pub jwt_secret: String,
    /// Session lifetime in seconds
    pub ttl_secs: i64,
    /// Set the `Secure` attribute on the cookie
    pub cookie_secure: bool,
}

/// Which mailer delivers email
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailTransport {
    /// Log messages instead of sending them
    Console,
    /// Deliver through an SMTP relay
    Smtp,
}

impl FromStr for MailTransport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "smtp" => Ok(Self::Smtp),
            other => Err(format!("unknown mail transport: {other}")),
        }
    }
}

/// Outbound email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Mailer selection
    pub transport: MailTransport,
    /// SMTP relay host
    pub smtp_host: String,
    /// SMTP relay port
    pub smtp_port: u16,
    /// SMTP username
    pub smtp_username: String,
    /// SMTP password
    #[serde(skip_serializing)]
    pub smtp_password: String,
    /// Sender address
    pub from_email: String,
    /// Sender display name
    pub from_name: String,
}

/// Account lifecycle timings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountsConfig {
    /// Registration code validity in seconds
    pub registration_otp_ttl_secs: i64,
    /// Password-reset code validity in seconds
    pub reset_otp_ttl_secs: i64,
    /// Seconds between sweeps of expired registrations
    pub otp_sweep_interval_secs: u64,
}

const DEFAULT_SESSION_TTL_SECS: i64 = 172_800; // 2 days
const DEFAULT_REGISTRATION_OTP_TTL_SECS: i64 = 600;
const DEFAULT_RESET_OTP_TTL_SECS: i64 = 300;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 120;

/// Longest accepted lifetime; keeps `now + ttl` far from chrono's range limit
const MAX_TTL_SECS: i64 = 366 * 24 * 60 * 60;

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    lookup(name).and_then(|s| s.parse().ok())
}

// Lifetimes and intervals must be positive; anything else falls back
fn ttl_secs(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: i64) -> i64 {
    parsed(lookup, name)
        .filter(|secs: &i64| (1..=MAX_TTL_SECS).contains(secs))
        .unwrap_or(default)
}

fn interval_secs(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: u64) -> u64 {
    parsed(lookup, name).filter(|secs: &u64| *secs > 0).unwrap_or(default)
}

fn seconds(secs: i64, default: i64) -> chrono::Duration {
    let secs = if (1..=MAX_TTL_SECS).contains(&secs) { secs } else { default };
    chrono::Duration::try_seconds(secs).unwrap_or_else(chrono::Duration::zero)
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults, as do
    /// lifetimes and intervals that are zero, negative or longer than a year.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        Self {
            database: DatabaseConfig {
                url: text("DATABASE_URL", "sqlite://venue_booking.db?mode=rwc"),
                max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS").unwrap_or(5),
            },
            server: ServerConfig {
                host: text("HOST", "0.0.0.0"),
                port: parsed(&lookup, "PORT").unwrap_or(8080),
                cors_origin: text("CORS_ORIGIN", "http://localhost:3000"),
                max_upload_bytes: parsed(&lookup, "MAX_UPLOAD_BYTES")
                    .unwrap_or(100 * 1024 * 1024),
                shutdown_timeout: parsed(&lookup, "SHUTDOWN_TIMEOUT_SECS")
                    .unwrap_or(10),
            },
            session: SessionConfig {
                jwt_secret: text("JWT_SECRET", "dev-secret-change-in-production"),
                ttl_secs: ttl_secs(&lookup, "SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS),
                cookie_secure: parsed(&lookup, "COOKIE_SECURE")
                    .unwrap_or(false),
            },
            mail: MailConfig {
                transport: parsed(&lookup, "MAIL_TRANSPORT")
                    .unwrap_or(MailTransport::Console),
                smtp_host: text("SMTP_HOST", "localhost"),
                smtp_port: parsed(&lookup, "SMTP_PORT").unwrap_or(587),
                smtp_username: text("SMTP_USERNAME", ""),
                smtp_password: text("SMTP_PASSWORD", ""),
                from_email: text("MAIL_FROM", "no-reply@localhost"),
                from_name: text("MAIL_FROM_NAME", "Venue Booking"),
            },
            accounts: AccountsConfig {
                registration_otp_ttl_secs: ttl_secs(
                    &lookup,
                    "REGISTRATION_OTP_TTL_SECS",
                    DEFAULT_REGISTRATION_OTP_TTL_SECS,
                ),
                reset_otp_ttl_secs: ttl_secs(&lookup, "RESET_OTP_TTL_SECS", DEFAULT_RESET_OTP_TTL_SECS),
                otp_sweep_interval_secs: interval_secs(
                    &lookup,
                    "OTP_SWEEP_INTERVAL_SECS",
                    DEFAULT_SWEEP_INTERVAL_SECS,
                ),
            },
        }
    }

    /// `host:port` to bind
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Session lifetime
    #[must_use]
    pub fn session_ttl(&self) -> chrono::Duration {
        seconds(self.session.ttl_secs, DEFAULT_SESSION_TTL_SECS)
    }

    /// Account policy with the configured code lifetimes
    #[must_use]
    pub fn account_policy(&self) -> AccountPolicy {
        AccountPolicy {
            registration_otp_ttl: seconds(
                self.accounts.registration_otp_ttl_secs,
                DEFAULT_REGISTRATION_OTP_TTL_SECS,
            ),
            reset_otp_ttl: seconds(self.accounts.reset_otp_ttl_secs, DEFAULT_RESET_OTP_TTL_SECS),
            ..AccountPolicy::default()
        }
    }

    /// Interval between sweeps of expired registrations
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        let secs = if self.accounts.otp_sweep_interval_secs == 0 {
            DEFAULT_SWEEP_INTERVAL_SECS
        } else {
            self.accounts.otp_sweep_interval_secs
        };
        Duration::from_secs(secs)
    }

    /// Time allowed for jobs to stop on shutdown
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout)
    }
}
