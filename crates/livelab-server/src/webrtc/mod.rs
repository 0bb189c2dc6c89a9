use crate::state::{AppState, Config};
use axum::{Json, extract::State};
use livelab_protocol::IceServer;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServersResponse {
    pub ice_servers: Vec<IceServer>,
}

pub fn ice_servers(config: &Config) -> Vec<IceServer> {
    let mut ice_servers = vec![];

    // Add STUN servers
    for stun_url in &config.stun_servers {
        ice_servers.push(IceServer {
            urls: vec![stun_url.clone()],
            username: None,
            credential: None,
        });
    }

    // Add TURN servers
    for turn in &config.turn_servers {
        ice_servers.push(IceServer {
            urls: vec![turn.url.clone()],
            username: Some(turn.username.clone()),
            credential: Some(turn.credential.clone()),
        });
    }

    ice_servers
}

pub async fn get_ice_servers(State(state): State<AppState>) -> Json<IceServersResponse> {
    Json(IceServersResponse {
        ice_servers: ice_servers(&state.config),
    })
}
