use livelab_media::{CompositorConfig, Rgba};
use livelab_protocol::IceServer;
use serde::Deserialize;

const CONFIG_PATH_VAR: &str = "LIVELAB_CLIENT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "livelab-client.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the livelab server, `http(s)://` or `ws(s)://`
    pub server_url: String,
    pub room_id: String,
    pub identity_id: String,
    pub display_name: String,
    /// Signed identity token when the server verifies identities
    pub token: Option<String>,
    pub ice_servers: Vec<IceServer>,
    pub compositor: CompositorSettings,
}

/// Serializable subset of [`CompositorConfig`]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompositorSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub pip_scale: f32,
    pub padding: u32,
    pub border: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            room_id: "live-room".to_string(),
            identity_id: uuid::Uuid::new_v4().to_string(),
            display_name: "Viewer".to_string(),
            token: None,
            ice_servers: vec![IceServer {
                urls: vec!["stun:stun.l.google.com:19302".to_string()],
                username: None,
                credential: None,
            }],
            compositor: CompositorSettings::default(),
        }
    }
}

impl Default for CompositorSettings {
    fn default() -> Self {
        let defaults = CompositorConfig::default();
        Self {
            width: defaults.width,
            height: defaults.height,
            fps: defaults.fps,
            pip_scale: defaults.pip_scale,
            padding: defaults.padding,
            border: defaults.border,
        }
    }
}

impl CompositorSettings {
    pub fn to_compositor_config(&self) -> CompositorConfig {
        CompositorConfig {
            width: self.width.max(1),
            height: self.height.max(1),
            fps: self.fps.max(1),
            pip_scale: self.pip_scale.clamp(0.05, 1.0),
            padding: self.padding,
            border: self.border,
            border_color: Rgba::WHITE,
            background: Rgba::BLACK,
        }
    }
}

impl ClientConfig {
    /// Defaults, then `livelab-client.toml` (or `$LIVELAB_CLIENT_CONFIG`), then
    /// `LIVELAB_CLIENT_*` variables (`__` separates nested keys)
    pub fn load() -> anyhow::Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let settings = config::Config::builder()
            .add_source(config::File::new(&path, config::FileFormat::Toml).required(false))
            .add_source(
                config::Environment::with_prefix("LIVELAB_CLIENT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// WebSocket endpoint derived from `server_url`
    pub fn ws_url(&self) -> String {
        let base = self
            .server_url
            .trim_end_matches('/')
            .replace("http://", "ws://")
            .replace("https://", "wss://");
        if base.ends_with("/ws") {
            base
        } else {
            format!("{}/ws", base)
        }
    }
}
