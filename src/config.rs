use anyhow::{Context, Result};

/// Server configuration, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub max_connections: u32,
    pub session_expiry_minutes: i64,
    pub broadcast_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            database_url: lookup("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            bind_addr: lookup("BIND_ADDR")
                .unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            max_connections: lookup("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|| "16".to_string())
                .parse()
                .context("DB_MAX_CONNECTIONS must be a valid number")?,
            session_expiry_minutes: lookup("SESSION_EXPIRY_MINUTES")
                .unwrap_or_else(|| "60".to_string())
                .parse()
                .context("SESSION_EXPIRY_MINUTES must be a valid number")?,
            broadcast_capacity: lookup("BROADCAST_CAPACITY")
                .unwrap_or_else(|| "256".to_string())
                .parse()
                .context("BROADCAST_CAPACITY must be a valid number")?,
        })
    }

    pub fn session_expiry(&self) -> time::Duration {
        time::Duration::minutes(self.session_expiry_minutes)
    }
}
