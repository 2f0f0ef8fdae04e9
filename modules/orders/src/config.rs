use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum BusType {
    Nats,
    InMemory,
}

impl BusType {
    pub fn from_env() -> Self {
        match env::var("BUS_TYPE")
            .unwrap_or_else(|_| "inmemory".to_string())
            .to_lowercase()
            .as_str()
        {
            "nats" => BusType::Nats,
            "inmemory" => BusType::InMemory,
            _ => {
                tracing::warn!("Unknown BUS_TYPE, defaulting to inmemory");
                BusType::InMemory
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bus_type: BusType,
    pub database_url: String,
    pub nats_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub dispatch: DispatchConfig,
}

/// Tuning for the outbox dispatcher.
///
/// Backoff doubles with each failed attempt and is capped at `max_backoff`.
/// `max_publish_attempts` bounds retries for *permanently* rejected payloads
/// only; transient broker failures are retried indefinitely.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub lease_duration: chrono::Duration,
    pub publish_timeout: Duration,
    pub initial_backoff: chrono::Duration,
    pub max_backoff: chrono::Duration,
    pub max_publish_attempts: i64,
    /// Delivered entries older than this horizon are purged by the
    /// retention sweep. `None` keeps them forever.
    pub retention: Option<chrono::Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 100,
            lease_duration: chrono::Duration::seconds(30),
            publish_timeout: Duration::from_secs(5),
            initial_backoff: chrono::Duration::milliseconds(500),
            max_backoff: chrono::Duration::seconds(60),
            max_publish_attempts: 10,
            retention: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let bus_type = BusType::from_env();
        let database_url =
            env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let nats_url = match bus_type {
            BusType::Nats => Some(
                env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            ),
            BusType::InMemory => None,
        };

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "3333".to_string())
            .parse()
            .map_err(|_| "PORT must be a valid u16".to_string())?;

        Ok(Self {
            bus_type,
            database_url,
            nats_url,
            host,
            port,
            dispatch: DispatchConfig::from_env(),
        })
    }
}

impl DispatchConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: env_ms("DISPATCH_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            batch_size: env_i64("DISPATCH_BATCH_SIZE").unwrap_or(defaults.batch_size),
            lease_duration: env_i64("LEASE_SECONDS")
                .map(chrono::Duration::seconds)
                .unwrap_or(defaults.lease_duration),
            publish_timeout: env_ms("PUBLISH_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.publish_timeout),
            initial_backoff: env_i64("INITIAL_BACKOFF_MS")
                .map(chrono::Duration::milliseconds)
                .unwrap_or(defaults.initial_backoff),
            max_backoff: env_i64("MAX_BACKOFF_SECONDS")
                .map(chrono::Duration::seconds)
                .unwrap_or(defaults.max_backoff),
            max_publish_attempts: env_i64("MAX_PUBLISH_ATTEMPTS")
                .unwrap_or(defaults.max_publish_attempts),
            retention: env_i64("RETENTION_DAYS").map(chrono::Duration::days),
        }
    }
}

fn env_i64(name: &str) -> Option<i64> {
    env::var(name).ok().and_then(|s| {
        s.parse::<i64>()
            .map_err(|e| tracing::warn!("Ignoring invalid value for {}: {}", name, e))
            .ok()
    })
}

fn env_ms(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|s| {
        s.parse::<u64>()
            .map_err(|e| tracing::warn!("Ignoring invalid value for {}: {}", name, e))
            .ok()
    })
}
