use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
#[cfg(test)]
use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::screen::PanelLimits;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Sao_Paulo;

#[derive(Debug, Clone)]
pub struct Config {
    // Queue backend
    pub api_base_url: String,
    pub http_timeout: Duration,
    /// Bearer token for attendant commands
    pub api_token: Option<String>,

    // Display timing
    pub poll_interval: Duration,
    /// How long each call stays in the "now calling" slot
    pub dwell: Duration,

    // Board layout
    pub panels: PanelLimits,
    pub display_timezone: String,

    // Health check HTTP server port (optional, disabled if not set)
    pub health_port: Option<u16>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env if present, ignore if missing
        Self::from_getter(|key| env::var(key).ok())
    }

    /// Parse config from a custom getter function (for testing)
    pub fn from_getter<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |key: &str, default: u64| -> Result<u64> {
            match get(key).filter(|s| !s.trim().is_empty()) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{} must be a non-negative integer, got '{}'", key, raw)),
                None => Ok(default),
            }
        };

        let positive = |key: &str, default: u64| -> Result<u64> {
            let value = number(key, default)?;
            if value == 0 {
                bail!("{} must be greater than 0", key);
            }
            Ok(value)
        };

        let defaults = PanelLimits::default();

        Ok(Config {
            api_base_url: get("API_BASE_URL")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
                .trim()
                .trim_end_matches('/')
                .to_string(),
            http_timeout: Duration::from_secs(number("HTTP_TIMEOUT_SECS", 10)?),
            api_token: get("QUEUE_API_TOKEN").filter(|s| !s.trim().is_empty()),

            poll_interval: Duration::from_millis(positive("POLL_INTERVAL_MS", 3000)?),
            dwell: Duration::from_secs(positive("DWELL_SECS", 5)?),

            panels: PanelLimits {
                waiting: number("WAITING_LIMIT", defaults.waiting as u64)? as usize,
                recent: number("RECENT_LIMIT", defaults.recent as u64)? as usize,
                finished: number("FINISHED_LIMIT", defaults.finished as u64)? as usize,
            },
            display_timezone: get("DISPLAY_TIMEZONE")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TIMEZONE.name().to_string()),

            health_port: get("HEALTH_PORT").and_then(|s| s.parse().ok()),
        })
    }

    /// Create config from a HashMap (convenience for testing)
    #[cfg(test)]
    pub fn from_map(map: &HashMap<&str, &str>) -> Result<Self> {
        Self::from_getter(|key| map.get(key).map(|v| v.to_string()))
    }

    /// Validate configuration values at startup.
    /// Returns Ok(()) if all validations pass, or Err with details of what failed.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://")) {
            errors.push(format!(
                "API_BASE_URL '{}' must start with http:// or https://.",
                self.api_base_url
            ));
        }

        if self.poll_interval.is_zero() {
            errors.push("POLL_INTERVAL_MS must be greater than 0.".to_string());
        }

        if self.dwell.is_zero() {
            errors.push("DWELL_SECS must be greater than 0.".to_string());
        } else if self.dwell > Duration::from_secs(60) {
            errors.push(format!(
                "DWELL_SECS={} seems too long (max recommended: 60).",
                self.dwell.as_secs()
            ));
        }

        if self.http_timeout.is_zero() {
            errors.push("HTTP_TIMEOUT_SECS must be greater than 0.".to_string());
        }

        if self.display_timezone.parse::<Tz>().is_err() {
            errors.push(format!(
                "DISPLAY_TIMEZONE '{}' is not a known IANA time zone.",
                self.display_timezone
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )
        }
    }

    /// Board clock zone, falling back to the default for unknown names
    pub fn timezone(&self) -> Tz {
        self.display_timezone.parse().unwrap_or(DEFAULT_TIMEZONE)
    }
}
