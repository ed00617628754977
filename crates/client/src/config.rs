//! Configuration types for the client core

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for a Watchroom client session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Relay endpoint URL (ws:// or wss://)
    pub endpoint: String,

    /// Display name announced on join
    pub display_name: String,

    /// Reconnect policy for the relay channel
    pub reconnect: ReconnectPolicy,

    /// Per-attempt connection timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// ICE servers used for peer connections (STUN/TURN)
    pub ice_servers: Vec<IceServerConfig>,

    /// Position difference above which a remote broadcast forces a hard seek
    pub drift_threshold_secs: f64,

    /// Minimum interval between relayed continuous position updates
    #[serde(with = "duration_secs")]
    pub position_relay_interval: Duration,
}

/// Reconnect policy: bounded exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Maximum number of reconnect attempts before giving up
    pub max_attempts: u32,

    /// Delay before the first retry; doubles per attempt
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,

    /// Upper bound on the per-attempt delay
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
}

/// One ICE server (STUN or TURN)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServerConfig {
    /// Server URL; a missing scheme is normalized to `stun:`
    pub url: String,

    /// Username for TURN authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Credential for TURN authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServerConfig {
    /// Plain STUN server entry
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            credential: None,
        }
    }

    /// URL with the protocol scheme added when absent
    pub fn normalized_url(&self) -> String {
        if self.url.starts_with("stun:")
            || self.url.starts_with("turn:")
            || self.url.starts_with("turns:")
        {
            self.url.clone()
        } else if self.username.is_some() {
            format!("turn:{}", self.url)
        } else {
            format!("stun:{}", self.url)
        }
    }

    /// Whether this entry is a TURN server (carries credentials)
    pub fn is_turn(&self) -> bool {
        self.normalized_url().starts_with("turn")
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:4000".to_string(),
            display_name: "viewer".to_string(),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
            ice_servers: vec![
                IceServerConfig::stun("stun:stun.l.google.com:19302"),
                IceServerConfig::stun("stun:stun1.l.google.com:19302"),
            ],
            drift_threshold_secs: 0.5,
            position_relay_interval: Duration::from_secs(2),
        }
    }
}

impl ClientConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `endpoint` is not a valid ws:// or wss:// URL
    /// - `display_name` is empty
    /// - `reconnect.max_attempts` is zero
    /// - `reconnect.initial_delay` exceeds `reconnect.max_delay`
    /// - `connect_timeout` is zero
    /// - a TURN server is missing username or credential
    /// - `drift_threshold_secs` is not a positive finite number
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        let parsed = url::Url::parse(&self.endpoint)
            .map_err(|e| Error::InvalidConfig(format!("endpoint is not a URL: {}", e)))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(Error::InvalidConfig(format!(
                "endpoint must start with ws:// or wss://, got {}",
                self.endpoint
            )));
        }

        if self.display_name.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "display_name cannot be empty".to_string(),
            ));
        }

        if self.reconnect.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "reconnect.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.reconnect.initial_delay > self.reconnect.max_delay {
            return Err(Error::InvalidConfig(format!(
                "reconnect.initial_delay ({:?}) exceeds reconnect.max_delay ({:?})",
                self.reconnect.initial_delay, self.reconnect.max_delay
            )));
        }

        if self.connect_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "connect_timeout must be non-zero".to_string(),
            ));
        }

        for server in &self.ice_servers {
            if server.url.is_empty() {
                return Err(Error::InvalidConfig(
                    "ICE server URL cannot be empty".to_string(),
                ));
            }
            if server.is_turn() && (server.username.is_none() || server.credential.is_none()) {
                return Err(Error::InvalidConfig(format!(
                    "TURN server {} requires username and credential",
                    server.url
                )));
            }
        }

        if !self.drift_threshold_secs.is_finite() || self.drift_threshold_secs <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "drift_threshold_secs must be positive, got {}",
                self.drift_threshold_secs
            )));
        }

        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}
