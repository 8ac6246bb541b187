//! Read-only metadata endpoint.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::HubState;

#[derive(Debug, Serialize, Deserialize)]
pub struct SpaceListResponse {
    pub atomspaces: Vec<String>,
}

/// Counts for one space, true at the moment of the call.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpaceInfo {
    pub id: String,
    pub num_nodes: usize,
    pub num_links: usize,
    pub total: usize,
}

pub(crate) async fn list_spaces(State(state): State<Arc<HubState>>) -> Json<SpaceListResponse> {
    Json(SpaceListResponse {
        atomspaces: state.registry.list(),
    })
}

pub(crate) async fn space_info(
    State(state): State<Arc<HubState>>,
    Path(id): Path<String>,
) -> Result<Json<SpaceInfo>, (StatusCode, String)> {
    let space = state.registry.get(&id).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            format!("Atomspace with id {id} not found"),
        )
    })?;

    // One read guard so the three counts agree.
    let (num_nodes, num_links) = space.store().read().counts();

    Ok(Json(SpaceInfo {
        id,
        num_nodes,
        num_links,
        total: num_nodes + num_links,
    }))
}
