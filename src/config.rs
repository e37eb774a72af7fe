// Application configuration, supplied by the host.
// Logging is on by default only in debug builds.

use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::peer::types::ServerConfig;
use crate::utils::MIN_ROOM_ID_LEN;

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true;

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false;

/// Public STUN pair used when the host configures nothing else.
pub static DEFAULT_ICE_SERVERS: Lazy<Vec<ServerConfig>> = Lazy::new(|| {
    vec![
        ServerConfig {
            id: "default-stun-1".into(),
            r#type: "stun".into(),
            url: "stun:stun1.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
        ServerConfig {
            id: "default-stun-2".into(),
            r#type: "stun".into(),
            url: "stun:stun2.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
    ]
});

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    pub enabled: bool,
    /// `EnvFilter` directive; `RUST_LOG` takes precedence when set.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: LOGGING_ENABLED,
            filter: "boardcall=debug,webrtc=warn".into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub ice_servers: Vec<ServerConfig>,
    pub ice_candidate_pool_size: u8,
    pub room_id_len: usize,
    /// How many fresh ids to try when a generated room id is taken.
    pub room_id_attempts: u32,
    /// Give up waiting for an answer after this long. `None` waits forever.
    pub answer_timeout_secs: Option<u64>,
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ice_servers: DEFAULT_ICE_SERVERS.clone(),
            ice_candidate_pool_size: 10,
            room_id_len: MIN_ROOM_ID_LEN,
            room_id_attempts: 5,
            answer_timeout_secs: None,
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn answer_timeout(&self) -> Option<Duration> {
        self.answer_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        for server in &self.ice_servers {
            if server.url.is_empty() {
                return Err(Error::Config(format!("ICE server {:?} has an empty url", server.id)));
            }
            if server.r#type == "turn" && (server.username.is_none() || server.credential.is_none()) {
                return Err(Error::Config(format!(
                    "TURN server {:?} requires username and credential",
                    server.id
                )));
            }
        }
        if self.room_id_len < MIN_ROOM_ID_LEN {
            return Err(Error::Config(format!(
                "room ids must be at least {MIN_ROOM_ID_LEN} characters"
            )));
        }
        if self.room_id_attempts == 0 {
            return Err(Error::Config("room_id_attempts must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.ice_servers.len(), 2);
        assert_eq!(config.answer_timeout(), None);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = AppConfig::from_json(r#"{ "answer_timeout_secs": 30 }"#).unwrap();
        assert_eq!(config.answer_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.room_id_len, 6);
        assert_eq!(config.ice_candidate_pool_size, 10);
    }

    #[test]
    fn turn_without_credentials_is_rejected() {
        let raw = r#"{ "ice_servers": [
            { "id": "t", "type": "turn", "url": "turn.example.org:3478", "username": null, "credential": null }
        ] }"#;
        assert!(matches!(AppConfig::from_json(raw), Err(Error::Config(_))));
    }

    #[test]
    fn short_room_ids_are_rejected() {
        let config = AppConfig {
            room_id_len: 4,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
