use crate::hub::{HubHandle, HubSettings, SignalingHub};
use crate::ws::connections::ConnectionManager;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const CONFIG_PATH_VAR: &str = "LIVELAB_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "livelab.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_address: String,
    pub room_id: String,
    pub max_viewers: usize,
    pub max_chat_length: usize,
    pub heartbeat_interval_secs: u64,
    pub heartbeat_timeout_secs: u64,
    /// HS256 secret used to verify identify tokens; unset trusts the client
    pub identity_secret: Option<String>,
    pub stun_servers: Vec<String>,
    pub turn_servers: Vec<TurnServer>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TurnServer {
    pub url: String,
    pub username: String,
    pub credential: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            room_id: "live-room".to_string(),
            max_viewers: 50,
            max_chat_length: 500,
            heartbeat_interval_secs: 15,
            heartbeat_timeout_secs: 45,
            identity_secret: None,
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: vec![],
        }
    }
}

impl Config {
    /// Defaults, then `livelab.toml` (or `$LIVELAB_CONFIG`), then `LIVELAB_*` variables
    pub fn load() -> anyhow::Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let settings = config::Config::builder()
            .add_source(config::File::new(&path, config::FileFormat::Toml).required(false))
            .add_source(
                config::Environment::with_prefix("LIVELAB")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("stun_servers"),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        if config.identity_secret.is_none() {
            tracing::warn!("LIVELAB_IDENTITY_SECRET not set, trusting client-supplied identities");
        }
        Ok(config)
    }

    pub fn hub_settings(&self) -> HubSettings {
        HubSettings {
            room_id: self.room_id.clone(),
            max_viewers: self.max_viewers,
            max_chat_length: self.max_chat_length,
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs.max(1))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub connections: Arc<ConnectionManager>,
    pub hub: HubHandle,
}

impl AppState {
    /// Build the state and start the signaling hub; must run inside a tokio runtime
    pub fn new(config: Config) -> Self {
        let connections = Arc::new(ConnectionManager::new());
        let hub = SignalingHub::spawn(config.hub_settings(), connections.clone());

        Self {
            config,
            connections,
            hub,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.max_viewers, 50);
        assert!(config.identity_secret.is_none());
        assert_eq!(config.heartbeat_timeout(), Duration::from_secs(45));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(
                "room_id = \"physics\"\nmax_viewers = 3\nstun_servers = [\"stun:a\", \"stun:b\"]",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let config: Config = settings.try_deserialize().unwrap();

        assert_eq!(config.room_id, "physics");
        assert_eq!(config.max_viewers, 3);
        assert_eq!(config.stun_servers, vec!["stun:a", "stun:b"]);
        assert_eq!(config.max_chat_length, 500);
        assert_eq!(config.hub_settings().room_id, "physics");
    }
}
