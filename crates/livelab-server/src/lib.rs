//! Livelab Server Library
//!
//! This module exposes the server components for testing and embedding.

pub mod api;
pub mod auth;
pub mod error;
pub mod hub;
pub mod state;
pub mod webrtc;
pub mod ws;

/// Create and configure the server application; starts the signaling hub
pub fn create_app(config: state::Config) -> axum::Router {
    let app_state = state::AppState::new(config);
    api::create_router(app_state)
}
