//! Integration tests for group routes.

mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, TestUser, ORG_ID};
use serde_json::json;

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new();

    let (status, body) = app.get("/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"]["connected"], true);
    assert_eq!(body["authman_sync_enabled"], true);

    let (status, body) = app.get("/api/health/live", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "alive");

    let (status, _) = app.get("/api/health/ready", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_create_group_requires_authentication() {
    let app = TestApp::new();

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/groups",
            None,
            Some(json!({ "title": "Chess Club" })),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_invalid_token_is_rejected() {
    let app = TestApp::new();
    let request = axum::http::Request::builder()
        .uri("/api/v1/user/groups")
        .header("Authorization", "Bearer not-a-jwt")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_creator_becomes_admin_with_full_view() {
    let app = TestApp::new();
    let owner = TestUser::new("owner");

    let group_id = app
        .create_group(&owner, json!({ "title": "Chess Club", "category": "Games" }))
        .await;

    let (status, body) = app.get(&format!("/api/v1/groups/{group_id}"), Some(&owner)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["access"], "full");
    assert_eq!(body["details"]["title"], "Chess Club");
    assert_eq!(body["your_membership"]["status"], "admin");
    assert_eq!(body["stats"]["admins_count"], 1);
    assert_eq!(body["your_permissions"]["can_modify"], true);
}

#[tokio::test]
async fn test_duplicate_title_is_a_conflict() {
    let app = TestApp::new();
    let owner = TestUser::new("owner");
    app.create_group(&owner, json!({ "title": "Chess Club" })).await;

    let (status, body) = app
        .post("/api/v1/groups", &owner, json!({ "title": " chess club " }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn test_invalid_group_payload_is_rejected() {
    let app = TestApp::new();
    let owner = TestUser::new("owner");

    let (status, body) = app
        .post("/api/v1/groups", &owner, json!({ "title": "" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_managed_group_requires_permission() {
    let app = TestApp::new();
    let body = json!({
        "title": "CS 101",
        "authman_enabled": true,
        "authman_group": "uiuc:courses:cs101"
    });

    let (status, _) = app
        .post("/api/v1/groups", &TestUser::new("plain"), body.clone())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = TestUser::new("sync-admin").with_permission("managed_group_admin");
    let (status, created) = app.post("/api/v1/groups", &admin, body).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["authman_group"], "uiuc:courses:cs101");
}

#[tokio::test]
async fn test_anonymous_listing_requires_org() {
    let app = TestApp::new();
    let owner = TestUser::new("owner");
    app.create_group(&owner, json!({ "title": "Open Group" })).await;
    app.create_group(
        &owner,
        json!({ "title": "Hidden Group", "hidden_for_search": true }),
    )
    .await;

    let (status, _) = app.get("/api/v1/groups", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .get(&format!("/api/v1/groups?org_id={ORG_ID}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|g| g["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["Open Group"]);

    // The admin still finds the hidden group.
    let (_, body) = app.get("/api/v1/groups", Some(&owner)).await;
    assert_eq!(body["pagination"]["total"], 2);
}

#[tokio::test]
async fn test_private_group_is_hidden_from_outsiders() {
    let app = TestApp::new();
    let owner = TestUser::new("owner");
    let group_id = app
        .create_group(&owner, json!({ "title": "Secret", "privacy": "private" }))
        .await;
    let uri = format!("/api/v1/groups/{group_id}");

    let (status, _) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get(&uri, Some(&TestUser::new("outsider"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // A missing group looks exactly like a denied one.
    let (status, body) = app
        .get(&format!("/api/v1/groups/{}", uuid::Uuid::new_v4()), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "You do not have access to this group");
}

#[tokio::test]
async fn test_auto_join_private_group_gives_join_preview() {
    let app = TestApp::new();
    let owner = TestUser::new("owner");
    let group_id = app
        .create_group(
            &owner,
            json!({
                "title": "Study Hall",
                "privacy": "private",
                "can_join_automatically": true
            }),
        )
        .await;

    let (status, body) = app
        .get(
            &format!("/api/v1/groups/{group_id}"),
            Some(&TestUser::new("visitor")),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["access"], "join_preview");
    assert!(body.get("details").is_none());
    assert!(body.get("stats").is_none());
}

#[tokio::test]
async fn test_update_and_delete_require_admin() {
    let app = TestApp::new();
    let owner = TestUser::new("owner");
    let stranger = TestUser::new("stranger");
    let group_id = app.create_group(&owner, json!({ "title": "Book Club" })).await;
    let uri = format!("/api/v1/groups/{group_id}");

    let (status, _) = app.put(&uri, &stranger, json!({ "title": "Mine" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .put(&uri, &owner, json!({ "description": "Monthly reads" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Book Club");
    assert_eq!(body["description"], "Monthly reads");

    let (status, _) = app.delete(&uri, &stranger).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.delete(&uri, &owner).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.delete(&uri, &owner).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_user_groups_lists_own_memberships() {
    let app = TestApp::new();
    let owner = TestUser::new("owner");
    app.create_group(&owner, json!({ "title": "Zeta" })).await;
    app.create_group(&owner, json!({ "title": "alpha" })).await;
    app.create_group(&TestUser::new("other"), json!({ "title": "Other" }))
        .await;

    let (status, body) = app.get("/api/v1/user/groups", Some(&owner)).await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|g| g["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["alpha", "Zeta"]);
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .all(|g| g["your_role"] == "admin"));
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let app = TestApp::new();
    let request = axum::http::Request::builder()
        .uri("/api/health/live")
        .header("X-Request-ID", "trace-42")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.headers().get("x-request-id").unwrap(), "trace-42");
}
