use std::env;
use std::str::FromStr;
use tracing::warn;

/// Upper bound for the cancellation notice window (one year).
pub const MAX_CANCELLATION_NOTICE_HOURS: i64 = 24 * 365;

/// Where scheduling data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Supabase,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "in_memory" => Ok(StorageBackend::Memory),
            "supabase" | "postgrest" => Ok(StorageBackend::Supabase),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub storage_backend: StorageBackend,
    pub server_port: u16,
    /// Minimum notice a patient must give to cancel.
    pub cancellation_notice_hours: i64,
    /// Extra attempts after a uniqueness race at insert time.
    pub booking_race_retries: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            storage_backend: StorageBackend::Memory,
            server_port: 3000,
            cancellation_notice_hours: 24,
            booking_race_retries: 1,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let supabase_url = env::var("SUPABASE_URL").unwrap_or_else(|_| {
            warn!("SUPABASE_URL not set, using empty value");
            String::new()
        });
        let supabase_anon_key = env::var("SUPABASE_ANON_PUBLIC_KEY").unwrap_or_else(|_| {
            warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
            String::new()
        });
        let supabase_jwt_secret = env::var("SUPABASE_JWT_SECRET").unwrap_or_else(|_| {
            warn!("SUPABASE_JWT_SECRET not set, using empty value");
            String::new()
        });

        let storage_backend = match env::var("SCHEDULING_STORAGE") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                warn!("{}, falling back to in-memory storage", e);
                StorageBackend::Memory
            }),
            Err(_) if !supabase_url.is_empty() && !supabase_anon_key.is_empty() => {
                StorageBackend::Supabase
            }
            Err(_) => {
                warn!("SCHEDULING_STORAGE not set and Supabase not configured, using in-memory storage");
                StorageBackend::Memory
            }
        };

        let config = Self {
            supabase_url,
            supabase_anon_key,
            supabase_jwt_secret,
            storage_backend,
            server_port: parse_or("SERVER_PORT", defaults.server_port),
            cancellation_notice_hours: bounded_notice_hours(parse_or(
                "CANCELLATION_NOTICE_HOURS",
                defaults.cancellation_notice_hours,
            )),
            booking_race_retries: parse_or("BOOKING_RACE_RETRIES", defaults.booking_race_retries),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_jwt_secret.is_empty()
            && (self.storage_backend == StorageBackend::Memory || self.is_supabase_configured())
    }

    pub fn is_supabase_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }
}

fn bounded_notice_hours(hours: i64) -> i64 {
    let bounded = hours.clamp(0, MAX_CANCELLATION_NOTICE_HOURS);
    if bounded != hours {
        warn!("CANCELLATION_NOTICE_HOURS {} out of range, using {}", hours, bounded);
    }
    bounded
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
