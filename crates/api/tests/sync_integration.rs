//! Integration tests for directory (Authman) synchronization routes.

mod common;

use axum::http::StatusCode;
use common::{test_config, TestApp, TestUser, ORG_ID};
use domain::models::DirectoryAccount;
use domain::services::RosterSubject;
use serde_json::{json, Value};

const STEM: &str = "uiuc:courses:cs101";

fn sync_admin() -> TestUser {
    TestUser::new("sync-admin").with_permission("managed_group_admin")
}

async fn managed_group(app: &TestApp) -> String {
    app.create_group(
        &sync_admin(),
        json!({
            "title": "CS 101",
            "privacy": "private",
            "authman_enabled": true,
            "authman_group": STEM
        }),
    )
    .await
}

async fn synchronize(app: &TestApp, user: &TestUser, group_id: &str) -> (StatusCode, Value) {
    app.post(
        &format!("/api/v1/groups/{group_id}/authman/synchronize"),
        user,
        json!({}),
    )
    .await
}

fn strings(value: &Value) -> Vec<&str> {
    value
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect()
}

#[tokio::test]
async fn test_synchronize_creates_and_removes_memberships() {
    let app = TestApp::new();
    let group_id = managed_group(&app).await;
    app.roster.set_roster(STEM, "uin", &["111", "222"]).await;
    app.roster
        .push_subject(
            STEM,
            RosterSubject {
                id: "svc-account".to_string(),
                source_id: "ldap".to_string(),
            },
        )
        .await;
    app.accounts
        .insert(DirectoryAccount {
            user_id: "student-1".to_string(),
            external_id: Some("111".to_string()),
            net_id: Some("stud1".to_string()),
            name: Some("Student One".to_string()),
            email: None,
        })
        .await;

    let (status, report) = synchronize(&app, &sync_admin(), &group_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(strings(&report["created"]), vec!["111", "222"]);
    assert_eq!(report["skipped_subjects"], 1);
    assert_eq!(report["timed_out"], false);
    assert!(report["failures"].as_array().unwrap().is_empty());

    // The resolved account was bound during the pass.
    let (_, groups) = app
        .get("/api/v1/user/groups", Some(&TestUser::new("student-1")))
        .await;
    assert_eq!(groups[0]["title"], "CS 101");
    assert_eq!(groups[0]["your_role"], "member");

    // A second pass over the same roster only stamps.
    let (_, report) = synchronize(&app, &sync_admin(), &group_id).await;
    assert!(report["created"].as_array().unwrap().is_empty());
    assert_eq!(report["stamped"], 2);

    app.roster.set_roster(STEM, "uin", &["111"]).await;
    let (status, report) = synchronize(&app, &sync_admin(), &group_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(strings(&report["removed"]), vec!["222"]);

    // The group admin survives every pass.
    let (_, members) = app
        .get(
            &format!("/api/v1/groups/{group_id}/members"),
            Some(&sync_admin()),
        )
        .await;
    assert_eq!(members["pagination"]["total"], 2);
}

#[tokio::test]
async fn test_user_groups_binds_directory_membership() {
    let app = TestApp::new();
    let group_id = managed_group(&app).await;
    app.roster.set_roster(STEM, "uin", &["333"]).await;
    synchronize(&app, &sync_admin(), &group_id).await;

    let student = TestUser::new("late-student").with_external_id("333");
    let (status, groups) = app.get("/api/v1/user/groups", Some(&student)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(groups.as_array().unwrap().len(), 1);
    assert_eq!(groups[0]["your_role"], "member");

    let (_, members) = app
        .get(
            &format!("/api/v1/groups/{group_id}/members?status=member"),
            Some(&sync_admin()),
        )
        .await;
    assert_eq!(members["data"][0]["external_id"], "333");
    assert_eq!(members["data"][0]["user_id"], "late-student");

    // Now bound, the student sees the private group in full.
    let (status, view) = app
        .get(&format!("/api/v1/groups/{group_id}"), Some(&student))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["access"], "full");
}

#[tokio::test]
async fn test_managed_group_rejects_join_requests() {
    let app = TestApp::new();
    let group_id = managed_group(&app).await;

    let (status, _) = app
        .post(
            &format!("/api/v1/groups/{group_id}/join"),
            &TestUser::new("walk-in"),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_synchronize_requires_admin_and_permission() {
    let app = TestApp::new();
    let group_id = managed_group(&app).await;

    // Permission without group admin role.
    let outsider = TestUser::new("outsider").with_permission("managed_group_admin");
    let (status, _) = synchronize(&app, &outsider, &group_id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Group admin role without permission.
    app.post(
        &format!("/api/v1/groups/{group_id}/members"),
        &sync_admin(),
        json!({ "user_id": "helper", "admin": true }),
    )
    .await;
    let (status, _) = synchronize(&app, &TestUser::new("helper"), &group_id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert_eq!(app.roster.fetch_count(), 0);
}

#[tokio::test]
async fn test_synchronize_unmanaged_group_is_rejected() {
    let app = TestApp::new();
    let admin = sync_admin();
    let group_id = app.create_group(&admin, json!({ "title": "Plain" })).await;

    let (status, _) = synchronize(&app, &admin, &group_id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unavailable_roster_returns_503() {
    let app = TestApp::new();
    let group_id = managed_group(&app).await;
    app.roster.set_failing(true).await;

    let (status, body) = synchronize(&app, &sync_admin(), &group_id).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "service_unavailable");

    // The lease was released, so a retry goes through once the roster is back.
    app.roster.set_failing(false).await;
    let (status, _) = synchronize(&app, &sync_admin(), &group_id).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_sync_routes_are_disabled_without_authman() {
    let app = TestApp::with_config(test_config(&[("authman.enabled", "false")]));
    let group_id = managed_group(&app).await;

    let (status, body) = synchronize(&app, &sync_admin(), &group_id).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["message"], "Directory synchronization is disabled");

    let (status, _) = app
        .post("/api/v1/int/authman/synchronize", &sync_admin(), json!({}))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (_, health) = app.get("/api/health", None).await;
    assert_eq!(health["authman_sync_enabled"], false);
}

#[tokio::test]
async fn test_synchronize_all_for_organization() {
    let app = TestApp::new();
    let group_id = managed_group(&app).await;
    app.create_group(&sync_admin(), json!({ "title": "Unmanaged" }))
        .await;
    app.roster.set_roster(STEM, "uin", &["444"]).await;

    let (status, _) = app
        .post(
            "/api/v1/int/authman/synchronize",
            &TestUser::new("nobody"),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, summary) = app
        .post("/api/v1/int/authman/synchronize", &sync_admin(), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["groups_considered"], 1);
    assert_eq!(summary["groups_skipped"], 0);
    assert_eq!(summary["outcomes"][0]["group_id"], group_id.as_str());
    assert_eq!(
        strings(&summary["outcomes"][0]["report"]["created"]),
        vec!["444"]
    );

    // Without force, the freshly synced group is skipped.
    let (_, summary) = app
        .post(
            "/api/v1/int/authman/synchronize?force=false",
            &sync_admin(),
            json!({}),
        )
        .await;
    assert_eq!(summary["groups_skipped"], 1);
    assert!(summary["outcomes"].as_array().unwrap().is_empty());
    assert_eq!(app.roster.fetch_count(), 1);
}

#[tokio::test]
async fn test_private_managed_group_is_listed_for_anonymous_readers() {
    let app = TestApp::new();
    managed_group(&app).await;

    let (_, body) = app
        .get(&format!("/api/v1/groups?org_id={ORG_ID}"), None)
        .await;
    let titles = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|g| g["title"].as_str())
        .collect::<Vec<_>>();
    assert_eq!(titles, vec!["CS 101"]);
    assert_eq!(body["data"][0]["privacy"], "private");
}

#[tokio::test]
async fn test_directory_member_views_group_before_listing_own_groups() {
    let app = TestApp::new();
    let group_id = managed_group(&app).await;
    app.roster.set_roster(STEM, "uin", &["555"]).await;
    synchronize(&app, &sync_admin(), &group_id).await;

    let student = TestUser::new("fresh-student").with_external_id("555");
    let (status, view) = app
        .get(&format!("/api/v1/groups/{group_id}"), Some(&student))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["access"], "full");
    assert_eq!(view["your_membership"]["status"], "member");

    let (status, members) = app
        .get(&format!("/api/v1/groups/{group_id}/members"), Some(&student))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(members["pagination"]["total"], 2);

    let outsider = TestUser::new("outsider").with_external_id("999");
    let (status, _) = app
        .get(&format!("/api/v1/groups/{group_id}"), Some(&outsider))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
