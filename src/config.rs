use std::env;

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MAX_MESSAGE_LENGTH: usize = 140;
pub const MAX_BIO_LENGTH: usize = 500;
pub const TIMELINE_LIMIT: u64 = 100;
pub const USERS_PER_PAGE: u64 = 60;

pub const SESSION_COOKIE: &str = "warbler_session";
pub const FLASH_COOKIE: &str = "warbler_flash";

pub const DEFAULT_IMAGE_URL: &str = "/static/images/default-pic.svg";
pub const DEFAULT_HEADER_IMAGE_URL: &str = "/static/images/warbler-hero.svg";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub session_expiration_hours: i64,
    pub seed_demo_data: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env::var("WARBLER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("WARBLER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://warbler.db?mode=rwc".to_string()),
            session_expiration_hours: session_expiration_hours(),
            seed_demo_data: env::var("WARBLER_SEED_DEMO")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        }
    }

    /// Config for an in-memory SQLite database, used by the test suites.
    pub fn in_memory() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_url: "sqlite::memory:".to_string(),
            session_expiration_hours: 24,
            seed_demo_data: false,
        }
    }
}

pub fn session_expiration_hours() -> i64 {
    env::var("WARBLER_SESSION_HOURS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(24)
}
