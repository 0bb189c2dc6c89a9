use crate::error::Result;
use crate::hub::HubSnapshot;
use crate::state::AppState;
use axum::{Json, extract::State};

/// Live indicator and audience counts, for pages outside the session
pub async fn get_status(State(state): State<AppState>) -> Result<Json<HubSnapshot>> {
    let snapshot = state.hub.snapshot().await?;
    Ok(Json(snapshot))
}
