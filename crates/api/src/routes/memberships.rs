//! Membership routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use domain::models::{
    AddMemberRequest, GroupMembership, JoinGroupRequest, ListMembersQuery,
    MembershipDecisionRequest, NotificationsPreferences, UpdateMembershipRequest,
};
use shared::pagination::Page;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;

/// Ask to join a group.
///
/// POST /api/v1/groups/:group_id/join
///
/// Creates a pending membership, or a member one when the group admits
/// automatically.
pub async fn request_join(
    State(state): State<AppState>,
    UserAuth(caller): UserAuth,
    Path(group_id): Path<Uuid>,
    Json(request): Json<JoinGroupRequest>,
) -> Result<(StatusCode, Json<GroupMembership>), ApiError> {
    let membership = state
        .service
        .request_join(&caller, group_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(membership)))
}

/// DELETE /api/v1/groups/:group_id/membership
pub async fn leave(
    State(state): State<AppState>,
    UserAuth(caller): UserAuth,
    Path(group_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.service.leave(&caller, group_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/groups/:group_id/membership/notifications
pub async fn update_notification_preferences(
    State(state): State<AppState>,
    UserAuth(caller): UserAuth,
    Path(group_id): Path<Uuid>,
    Json(preferences): Json<NotificationsPreferences>,
) -> Result<Json<GroupMembership>, ApiError> {
    let membership = state
        .service
        .update_notification_preferences(&caller, group_id, preferences)
        .await?;
    Ok(Json(membership))
}

/// List a group's members, filtered by comma separated `status`.
///
/// GET /api/v1/groups/:group_id/members
pub async fn list_members(
    State(state): State<AppState>,
    UserAuth(caller): UserAuth,
    Path(group_id): Path<Uuid>,
    Query(query): Query<ListMembersQuery>,
) -> Result<Json<Page<GroupMembership>>, ApiError> {
    let page = state.service.list_members(&caller, group_id, query).await?;
    Ok(Json(page))
}

/// Add a member directly. Admin only.
///
/// POST /api/v1/groups/:group_id/members
pub async fn add_member(
    State(state): State<AppState>,
    UserAuth(caller): UserAuth,
    Path(group_id): Path<Uuid>,
    Json(request): Json<AddMemberRequest>,
) -> Result<(StatusCode, Json<GroupMembership>), ApiError> {
    let membership = state.service.add_member(&caller, group_id, request).await?;
    Ok((StatusCode::CREATED, Json(membership)))
}

/// PUT /api/v1/memberships/:membership_id
pub async fn update_membership(
    State(state): State<AppState>,
    UserAuth(caller): UserAuth,
    Path(membership_id): Path<Uuid>,
    Json(request): Json<UpdateMembershipRequest>,
) -> Result<Json<GroupMembership>, ApiError> {
    let membership = state
        .service
        .update_membership(&caller, membership_id, request)
        .await?;
    Ok(Json(membership))
}

/// Approve or reject a pending membership.
///
/// PUT /api/v1/memberships/:membership_id/decision
pub async fn decide_pending(
    State(state): State<AppState>,
    UserAuth(caller): UserAuth,
    Path(membership_id): Path<Uuid>,
    Json(decision): Json<MembershipDecisionRequest>,
) -> Result<Json<GroupMembership>, ApiError> {
    let membership = state
        .service
        .decide_pending(&caller, membership_id, decision)
        .await?;
    Ok(Json(membership))
}

/// PUT /api/v1/memberships/:membership_id/attended
pub async fn mark_attended(
    State(state): State<AppState>,
    UserAuth(caller): UserAuth,
    Path(membership_id): Path<Uuid>,
) -> Result<Json<GroupMembership>, ApiError> {
    let membership = state.service.mark_attended(&caller, membership_id).await?;
    Ok(Json(membership))
}

/// DELETE /api/v1/memberships/:membership_id
pub async fn remove_member(
    State(state): State<AppState>,
    UserAuth(caller): UserAuth,
    Path(membership_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.service.remove_member(&caller, membership_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
