use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use porthole_index::queries;
use porthole_types::{ItemPayload, ServerMessage, SessionPayload};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::state::AppState;

pub(crate) struct ApiError(StatusCode, String);

impl ApiError {
    fn not_found(what: impl Into<String>) -> Self {
        Self(StatusCode::NOT_FOUND, what.into())
    }

    fn internal(e: impl std::fmt::Display) -> Self {
        error!(error = %e, "request failed");
        Self(StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.1 }));
        (self.0, body).into_response()
    }
}

pub(crate) async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Serialize)]
pub(crate) struct ProjectPayload {
    id: String,
    path: Option<String>,
    created_at: String,
}

pub(crate) async fn list_projects(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ProjectPayload>>, ApiError> {
    let db = state.db.lock().unwrap();
    let projects = queries::project::list(db.conn()).map_err(ApiError::internal)?;

    Ok(Json(
        projects
            .into_iter()
            .map(|p| ProjectPayload {
                id: p.id,
                path: p.path,
                created_at: p.created_at,
            })
            .collect(),
    ))
}

#[derive(Deserialize)]
pub(crate) struct SessionsQuery {
    #[serde(default)]
    include_archived: bool,
}

pub(crate) async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Query(query): Query<SessionsQuery>,
) -> Result<Json<Vec<SessionPayload>>, ApiError> {
    let db = state.db.lock().unwrap();
    let sessions =
        queries::session::list(db.conn(), Some(project_id.as_str()), query.include_archived)
            .map_err(ApiError::internal)?;

    Ok(Json(sessions.iter().map(|s| s.to_payload()).collect()))
}

pub(crate) async fn get_session(
    State(state): State<Arc<AppState>>,
    Path((project_id, session_id)): Path<(String, String)>,
) -> Result<Json<SessionPayload>, ApiError> {
    let db = state.db.lock().unwrap();
    let session = queries::session::get(db.conn(), &session_id)
        .map_err(ApiError::internal)?
        .filter(|s| s.project_id == project_id)
        .ok_or_else(|| ApiError::not_found(format!("session {session_id}")))?;

    Ok(Json(session.to_payload()))
}

#[derive(Deserialize)]
pub(crate) struct ItemsQuery {
    /// Return only lines strictly after this line number.
    #[serde(default)]
    after: Option<i64>,
}

pub(crate) async fn list_items(
    State(state): State<Arc<AppState>>,
    Path((project_id, session_id)): Path<(String, String)>,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<Vec<ItemPayload>>, ApiError> {
    let db = state.db.lock().unwrap();

    queries::session::get(db.conn(), &session_id)
        .map_err(ApiError::internal)?
        .filter(|s| s.project_id == project_id)
        .ok_or_else(|| ApiError::not_found(format!("session {session_id}")))?;

    let items = queries::item::list(db.conn(), &session_id, query.after)
        .map_err(ApiError::internal)?;

    Ok(Json(items.iter().map(|item| item.to_payload()).collect()))
}

#[derive(Serialize)]
pub(crate) struct ToolResultLinkPayload {
    tool_use_line_num: i64,
    tool_result_line_num: i64,
    tool_use_id: String,
}

#[derive(Serialize)]
pub(crate) struct AgentLinkPayload {
    tool_use_line_num: i64,
    tool_use_id: String,
    prompt: Option<String>,
    agent_id: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct SessionLinksPayload {
    tool_results: Vec<ToolResultLinkPayload>,
    agents: Vec<AgentLinkPayload>,
}

/// Both link tables for a session, so the view can resolve tool_use ->
/// tool_result pairs and jump into subagent sessions.
pub(crate) async fn list_links(
    State(state): State<Arc<AppState>>,
    Path((project_id, session_id)): Path<(String, String)>,
) -> Result<Json<SessionLinksPayload>, ApiError> {
    let db = state.db.lock().unwrap();

    queries::session::get(db.conn(), &session_id)
        .map_err(ApiError::internal)?
        .filter(|s| s.project_id == project_id)
        .ok_or_else(|| ApiError::not_found(format!("session {session_id}")))?;

    let tool_results = queries::link::tool_result_links(db.conn(), &session_id)
        .map_err(ApiError::internal)?
        .into_iter()
        .map(|link| ToolResultLinkPayload {
            tool_use_line_num: link.tool_use_line_num,
            tool_result_line_num: link.tool_result_line_num,
            tool_use_id: link.tool_use_id,
        })
        .collect();

    let agents = queries::link::agent_links(db.conn(), &session_id)
        .map_err(ApiError::internal)?
        .into_iter()
        .map(|link| AgentLinkPayload {
            tool_use_line_num: link.tool_use_line_num,
            tool_use_id: link.tool_use_id,
            prompt: link.prompt,
            agent_id: link.agent_id,
        })
        .collect();

    Ok(Json(SessionLinksPayload {
        tool_results,
        agents,
    }))
}

#[derive(Deserialize)]
pub(crate) struct SessionPatch {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    archived: Option<bool>,
    #[serde(default)]
    pinned: Option<bool>,
}

/// Rename / flag update. The title lands in the store immediately; the
/// journal write routes through the bridge, which stages it while the agent
/// holds the file.
pub(crate) async fn patch_session(
    State(state): State<Arc<AppState>>,
    Path((project_id, session_id)): Path<(String, String)>,
    Json(patch): Json<SessionPatch>,
) -> Result<Json<SessionPayload>, ApiError> {
    let session = {
        let db = state.db.lock().unwrap();

        queries::session::get(db.conn(), &session_id)
            .map_err(ApiError::internal)?
            .filter(|s| s.project_id == project_id)
            .ok_or_else(|| ApiError::not_found(format!("session {session_id}")))?;

        queries::session::set_flags(
            db.conn(),
            &session_id,
            patch.title.as_deref(),
            patch.archived,
            patch.pinned,
        )
        .map_err(ApiError::internal)?;

        queries::session::get(db.conn(), &session_id)
            .map_err(ApiError::internal)?
            .ok_or_else(|| ApiError::not_found(format!("session {session_id}")))?
    };

    if let Some(title) = &patch.title {
        let process_state = state.manager.process_state(&session_id).await;
        if let Err(e) =
            state
                .bridge
                .write_or_stage(process_state, &project_id, &session_id, title)
        {
            // The store row is already renamed; journal write failures are
            // logged, not surfaced.
            error!(session_id, error = %e, "custom title journal write failed");
        }
    }

    let payload = session.to_payload();
    state.broadcaster.send(ServerMessage::SessionUpdated {
        session: payload.clone(),
    });

    Ok(Json(payload))
}

pub(crate) async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path((project_id, session_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    // Capture the row before it goes away; the removal delta carries the
    // same session body as added/updated deltas.
    let session = {
        let db = state.db.lock().unwrap();

        let session = queries::session::get(db.conn(), &session_id)
            .map_err(ApiError::internal)?
            .filter(|s| s.project_id == project_id)
            .ok_or_else(|| ApiError::not_found(format!("session {session_id}")))?;

        queries::session::delete(db.conn(), &session_id).map_err(ApiError::internal)?;
        session
    };

    state.broadcaster.send(ServerMessage::SessionRemoved {
        session: session.to_payload(),
    });

    Ok(StatusCode::NO_CONTENT)
}
