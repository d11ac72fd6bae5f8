#![cfg(feature = "inmem-store")]

use actix_web::{test, web, App};
use aix::auth::{create_jwt, Role};
use aix::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use aix::repo::inmem::InMemRepo;
use aix::{config, AppState};
use serial_test::serial;
use std::sync::Arc;

fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("AIX_DATA_DIR", tmp.path().to_str().unwrap());
}

fn admin_token() -> String { create_jwt(1, vec![Role::Admin]).unwrap() }
fn staff_token(id: i64) -> String { create_jwt(id, vec![Role::Staff]).unwrap() }

fn state() -> web::Data<AppState> {
    web::Data::new(AppState {
        repo: Arc::new(InMemRepo::new()),
        rate: RateLimiterFacade::new(InMemoryRateLimiter::new(false), RateLimitConfig::from_env()),
    })
}

macro_rules! create_test_resource {
    ($app:expr, $token:expr, $title:expr) => {{
        let req = test::TestRequest::post()
            .uri("/api/v1/resources")
            .insert_header(("Authorization", format!("Bearer {}", $token)))
            .set_json(&serde_json::json!({
                "type": "use-case",
                "title": $title,
                "content": "body text"
            }))
            .to_request();
        let resp = test::call_service($app, req).await;
        assert_eq!(resp.status(), 201);
        let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        v["id"].as_i64().unwrap()
    }};
}

macro_rules! post_comment {
    ($app:expr, $token:expr, $resource_id:expr, $body:expr) => {{
        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/resources/{}/comments", $resource_id))
            .insert_header(("Authorization", format!("Bearer {}", $token)))
            .set_json(&$body)
            .to_request();
        test::call_service($app, req).await
    }};
}

#[actix_web::test]
#[serial]
async fn test_threaded_comments() {
    setup_env();
    let app = test::init_service(App::new().app_data(state()).configure(config)).await;
    let id = create_test_resource!(&app, staff_token(2), "Discussed");

    let resp = post_comment!(&app, staff_token(3), id, serde_json::json!({"content": "Great idea"}));
    assert_eq!(resp.status(), 201);
    let top: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let top_id = top["id"].as_i64().unwrap();
    assert!(top["parent_comment_id"].is_null());

    // reply under the first comment
    let resp = post_comment!(&app, staff_token(4), id, serde_json::json!({
        "content": "Agreed, works for seminars too",
        "parent_comment_id": top_id
    }));
    assert_eq!(resp.status(), 201);
    let reply: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(reply["parent_comment_id"], top_id);

    // flat list comes back oldest first; clients assemble the tree
    let req = test::TestRequest::get().uri(&format!("/api/v1/resources/{id}/comments")).to_request();
    let resp = test::call_service(&app, req).await;
    let comments: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let comments = comments.as_array().unwrap();
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0]["id"], top_id);

    // comment creation feeds the resource counter
    let req = test::TestRequest::get().uri(&format!("/api/v1/resources/{id}/analytics")).to_request();
    let resp = test::call_service(&app, req).await;
    let a: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(a["comment_count"], 2);
}

#[actix_web::test]
#[serial]
async fn test_parent_must_belong_to_same_resource() {
    setup_env();
    let app = test::init_service(App::new().app_data(state()).configure(config)).await;
    let first = create_test_resource!(&app, staff_token(2), "First");
    let second = create_test_resource!(&app, staff_token(2), "Second");

    let resp = post_comment!(&app, staff_token(3), first, serde_json::json!({"content": "On first"}));
    assert_eq!(resp.status(), 201);
    let comment: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let comment_id = comment["id"].as_i64().unwrap();

    // cross-resource parent pointer is rejected with field detail
    let resp = post_comment!(&app, staff_token(3), second, serde_json::json!({
        "content": "Wrong thread",
        "parent_comment_id": comment_id
    }));
    assert_eq!(resp.status(), 422);
    let err: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(err["field"], "parent_comment_id");

    // unknown parent is a 404
    let resp = post_comment!(&app, staff_token(3), second, serde_json::json!({
        "content": "Orphan reply",
        "parent_comment_id": 999999
    }));
    assert_eq!(resp.status(), 404);

    // empty body is a validation failure
    let resp = post_comment!(&app, staff_token(3), second, serde_json::json!({"content": "   "}));
    assert_eq!(resp.status(), 422);
}

#[actix_web::test]
#[serial]
async fn test_comment_editing_rights_and_helpful_votes() {
    setup_env();
    let app = test::init_service(App::new().app_data(state()).configure(config)).await;
    let id = create_test_resource!(&app, staff_token(2), "Voted");

    let resp = post_comment!(&app, staff_token(3), id, serde_json::json!({"content": "original"}));
    let comment: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let comment_id = comment["id"].as_i64().unwrap();

    // someone else cannot edit
    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/comments/{comment_id}"))
        .insert_header(("Authorization", format!("Bearer {}", staff_token(4))))
        .set_json(&serde_json::json!({"content": "defaced"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    // the author can
    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/comments/{comment_id}"))
        .insert_header(("Authorization", format!("Bearer {}", staff_token(3))))
        .set_json(&serde_json::json!({"content": "edited"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let edited: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(edited["content"], "edited");

    // helpful votes bump the comment and the resource totals
    for n in 1..=2 {
        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/comments/{comment_id}/helpful"))
            .insert_header(("Authorization", format!("Bearer {}", staff_token(5))))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let voted: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        assert_eq!(voted["helpful_count"], n);
    }
    let req = test::TestRequest::get().uri(&format!("/api/v1/resources/{id}/analytics")).to_request();
    let resp = test::call_service(&app, req).await;
    let a: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(a["helpful_count"], 2);

    // admin may delete any comment
    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/comments/{comment_id}"))
        .insert_header(("Authorization", format!("Bearer {}", admin_token())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);

    let req = test::TestRequest::get().uri(&format!("/api/v1/resources/{id}/comments")).to_request();
    let resp = test::call_service(&app, req).await;
    let comments: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(comments.as_array().unwrap().len(), 0);
}
