//! Group and student handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use super::AppState;
use crate::db::{CreateGroupInput, Group, GroupMember, Student, UpdateGroupInput};
use crate::error::{AppError, Result};

pub const FILTER_SUCCESS_MESSAGE: &str = "Group filter executed successfully.";

type JsonBody<T> = WithRejection<Json<T>, AppError>;

pub async fn all_groups(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Group>>> {
    Ok(Json(state.db.list_groups().await?))
}

pub async fn create_group(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(input), _): JsonBody<CreateGroupInput>,
) -> Result<(StatusCode, Json<Group>)> {
    let group = state.db.insert_group(input).await?;
    tracing::info!("Created group {} ({})", group.id, group.name);
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn update_group(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(input), _): JsonBody<UpdateGroupInput>,
) -> Result<Json<Group>> {
    Ok(Json(state.db.update_group(input).await?))
}

pub async fn remove_group(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, AppError>,
) -> Result<Response> {
    let removed = state.db.delete_group(id).await?;
    tracing::info!("Removed group {}", id);
    Ok(match removed {
        Some(group) => Json(group).into_response(),
        // The stored row did not decode, there is nothing to echo back
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// Members of a group; no id yields an empty list
pub async fn group_students(
    State(state): State<Arc<AppState>>,
    id: Option<Path<String>>,
) -> Result<Json<Vec<GroupMember>>> {
    let Some(Path(raw)) = id else {
        return Ok(Json(Vec::new()));
    };
    let group_id: i64 = raw
        .parse()
        .map_err(|_| AppError::InvalidInput(format!("invalid group id '{}'", raw)))?;
    Ok(Json(state.db.group_members(group_id).await?))
}

pub async fn run_group_filters(State(state): State<Arc<AppState>>) -> Result<&'static str> {
    let summary = state.db.run_group_filters(Utc::now()).await?;
    tracing::info!(
        "Group filters executed at {}: {} groups, {} memberships",
        summary.ran_at,
        summary.groups,
        summary.memberships
    );
    Ok(FILTER_SUCCESS_MESSAGE)
}

pub async fn all_students(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Student>>> {
    Ok(Json(state.db.list_students().await?))
}

#[derive(Serialize)]
pub struct HealthBody {
    status: &'static str,
    database: &'static str,
}

pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthBody>) {
    match state.db.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthBody {
                status: "ok",
                database: "ok",
            }),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthBody {
                    status: "degraded",
                    database: "unavailable",
                }),
            )
        }
    }
}
