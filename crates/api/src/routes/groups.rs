//! Group routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use domain::models::{
    CreateGroupRequest, Group, GroupSummary, GroupView, ListGroupsQuery, UpdateGroupRequest,
};
use shared::pagination::Page;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::{OptionalUserAuth, UserAuth};

/// Create a new group.
///
/// POST /api/v1/groups
///
/// The creator becomes the group's first admin.
pub async fn create_group(
    State(state): State<AppState>,
    UserAuth(caller): UserAuth,
    Json(request): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<Group>), ApiError> {
    let group = state.service.create_group(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

/// List groups visible to the caller.
///
/// GET /api/v1/groups
///
/// Anonymous callers must pass `org_id`.
pub async fn list_groups(
    State(state): State<AppState>,
    OptionalUserAuth(caller): OptionalUserAuth,
    Query(query): Query<ListGroupsQuery>,
) -> Result<Json<Page<GroupSummary>>, ApiError> {
    let page = state.service.list_groups(caller.as_ref(), query).await?;
    Ok(Json(page))
}

/// Get a group, redacted to what the caller may see.
///
/// GET /api/v1/groups/:group_id
pub async fn get_group(
    State(state): State<AppState>,
    OptionalUserAuth(caller): OptionalUserAuth,
    Path(group_id): Path<Uuid>,
) -> Result<Json<GroupView>, ApiError> {
    let view = state.service.get_group(caller.as_ref(), group_id).await?;
    Ok(Json(view))
}

/// PUT /api/v1/groups/:group_id
pub async fn update_group(
    State(state): State<AppState>,
    UserAuth(caller): UserAuth,
    Path(group_id): Path<Uuid>,
    Json(request): Json<UpdateGroupRequest>,
) -> Result<Json<Group>, ApiError> {
    let group = state
        .service
        .update_group(&caller, group_id, request)
        .await?;
    Ok(Json(group))
}

/// DELETE /api/v1/groups/:group_id
pub async fn delete_group(
    State(state): State<AppState>,
    UserAuth(caller): UserAuth,
    Path(group_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_group(&caller, group_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Groups the caller belongs to.
///
/// GET /api/v1/user/groups
///
/// Also binds directory-created memberships that carry the caller's
/// external identifier to the caller's account.
pub async fn user_groups(
    State(state): State<AppState>,
    UserAuth(caller): UserAuth,
) -> Result<Json<Vec<GroupSummary>>, ApiError> {
    let groups = state.service.user_groups(&caller).await?;
    Ok(Json(groups))
}
