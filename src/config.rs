//! Startup configuration
//!
//! Everything is environment-derived; there is no CLI surface. The API
//! credential is mandatory and checked before any channel is opened.

use std::env;
use std::time::Duration;

use crate::error::TeleopError;

/// Default teleops endpoint base (without trailing slash)
const DEFAULT_API_BASE: &str = "wss://api.openmind.org/api/core/teleops";

/// Runtime configuration for one teleop session
#[derive(Debug, Clone)]
pub struct Config {
    /// Opaque API credential, passed as a query parameter on both channels
    pub api_key: String,
    /// Endpoint base, e.g. `wss://api.openmind.org/api/core/teleops`
    pub api_base: String,
    /// Command republish period (10 Hz)
    pub command_period: Duration,
    /// Bounded wait per telemetry receive attempt
    pub recv_timeout: Duration,
    /// Bounded wait for the websocket handshake
    pub connect_timeout: Duration,
}

impl Config {
    /// Build a configuration from the process environment.
    ///
    /// `OPENMIND_API_KEY` is required; `TELEOP_API_BASE` optionally
    /// overrides the endpoint (useful against a local test server).
    pub fn from_env() -> Result<Self, TeleopError> {
        let api_key = env::var("OPENMIND_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                TeleopError::Config("OPENMIND_API_KEY environment variable is required".into())
            })?;

        let api_base = env::var("TELEOP_API_BASE")
            .ok()
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        Ok(Self {
            api_key,
            api_base,
            command_period: Duration::from_millis(100),
            recv_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
        })
    }

    /// URL of the outbound command channel
    pub fn command_url(&self) -> String {
        format!("{}/command?api_key={}", self.api_base, self.api_key)
    }

    /// URL of the inbound video/telemetry channel
    pub fn video_url(&self) -> String {
        format!("{}/video?api_key={}", self.api_base, self.api_key)
    }

    /// Credential prefix safe to echo in the startup banner
    pub fn api_key_preview(&self) -> String {
        let end = self.api_key.len().min(20);
        format!("{}...", &self.api_key[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(key: &str) -> Config {
        Config {
            api_key: key.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            command_period: Duration::from_millis(100),
            recv_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_channel_urls_carry_credential() {
        let config = test_config("om_secret");
        assert_eq!(
            config.command_url(),
            "wss://api.openmind.org/api/core/teleops/command?api_key=om_secret"
        );
        assert_eq!(
            config.video_url(),
            "wss://api.openmind.org/api/core/teleops/video?api_key=om_secret"
        );
    }

    #[test]
    fn test_api_key_preview_truncates() {
        let config = test_config("0123456789abcdef0123456789");
        assert_eq!(config.api_key_preview(), "0123456789abcdef0123...");

        let short = test_config("abc");
        assert_eq!(short.api_key_preview(), "abc...");
    }
}
