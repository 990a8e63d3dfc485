//! Directory synchronization routes.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use domain::services::{SyncReport, SyncSummary};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;
use crate::middleware::metrics::record_sync_request;
use crate::middleware::RequestId;

#[derive(Debug, Default, Deserialize)]
pub struct SynchronizeAllQuery {
    /// Also reconcile groups synced within the resync interval. Defaults to true.
    pub force: Option<bool>,
}

fn ensure_enabled(state: &AppState) -> Result<(), ApiError> {
    if state.config.authman.enabled {
        Ok(())
    } else {
        Err(ApiError::ServiceUnavailable(
            "Directory synchronization is disabled".to_string(),
        ))
    }
}

/// Reconcile one managed group now.
///
/// POST /api/v1/groups/:group_id/authman/synchronize
///
/// Requires the caller to be a group admin holding the managed-group
/// admin permission.
pub async fn synchronize_group(
    State(state): State<AppState>,
    UserAuth(caller): UserAuth,
    Extension(request_id): Extension<RequestId>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<SyncReport>, ApiError> {
    ensure_enabled(&state)?;
    state.service.authorize_sync(&caller, group_id).await?;

    match state.reconciler.reconcile_group(group_id).await {
        Ok(report) => {
            record_sync_request("group", if report.is_complete() { "ok" } else { "partial" });
            info!(
                request_id = %request_id.0,
                group_id = %group_id,
                sync_id = report.sync_id,
                created = report.created.len(),
                removed = report.removed.len(),
                failures = report.failures.len(),
                "Group synchronized on request"
            );
            Ok(Json(report))
        }
        Err(e) => {
            record_sync_request("group", "error");
            warn!(
                request_id = %request_id.0,
                group_id = %group_id,
                error = %e,
                "Group synchronization failed"
            );
            Err(e.into())
        }
    }
}

/// Reconcile every managed group of the caller's organization.
///
/// POST /api/v1/int/authman/synchronize
pub async fn synchronize_all(
    State(state): State<AppState>,
    UserAuth(caller): UserAuth,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<SynchronizeAllQuery>,
) -> Result<Json<SyncSummary>, ApiError> {
    ensure_enabled(&state)?;
    state.service.gate().require_managed_admin(&caller)?;

    let force = query.force.unwrap_or(true);
    let result = state
        .reconciler
        .reconcile_all(Some(&caller.org_id), force)
        .await;
    record_sync_request("all", if result.is_ok() { "ok" } else { "error" });

    let summary = result?;
    info!(
        request_id = %request_id.0,
        org_id = %caller.org_id,
        considered = summary.groups_considered,
        skipped = summary.groups_skipped,
        "Organization synchronized on request"
    );
    Ok(Json(summary))
}
