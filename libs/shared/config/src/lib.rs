use std::env;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::warn;

const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub dashboard_cache_ttl_secs: u64,
    pub dashboard_epoch: NaiveDate,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            dashboard_cache_ttl_secs: env::var("DASHBOARD_CACHE_TTL_SECS")
                .ok()
                .and_then(|raw| {
                    raw.parse().map_err(|_| {
                        warn!("DASHBOARD_CACHE_TTL_SECS is not a number: {}", raw);
                    }).ok()
                })
                .unwrap_or(DEFAULT_CACHE_TTL_SECS),
            dashboard_epoch: env::var("DASHBOARD_EPOCH")
                .ok()
                .and_then(|raw| {
                    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
                        warn!("DASHBOARD_EPOCH is not a YYYY-MM-DD date: {}", raw);
                    }).ok()
                })
                .unwrap_or_else(default_dashboard_epoch),
            port: env::var("PORT")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(DEFAULT_PORT),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    /// Config pointing at an arbitrary Supabase base URL with defaults for
    /// everything else. Used by tests that stand up a mock server.
    pub fn for_supabase(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            supabase_url: url.into(),
            supabase_anon_key: anon_key.into(),
            dashboard_cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            dashboard_epoch: default_dashboard_epoch(),
            port: DEFAULT_PORT,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }

    pub fn dashboard_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.dashboard_cache_ttl_secs)
    }
}

fn default_dashboard_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default()
}
