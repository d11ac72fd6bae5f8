#![cfg(feature = "inmem-store")]

use actix_web::{test, web, App};
use aix::auth::{create_jwt, Role};
use aix::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use aix::repo::inmem::InMemRepo;
use aix::{config, AppState};
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

// Helper to ensure JWT secret present & unique temp data dir per test
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
    ($app:expr, $token:expr, $body:expr) => {{
        let req = test::TestRequest::post()
            .uri("/api/v1/resources")
            .insert_header(("Authorization", format!("Bearer {}", $token)))
            .set_json(&$body)
            .to_request();
        let resp = test::call_service($app, req).await;
        assert_eq!(resp.status(), 201, "resource creation failed");
        let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        v
    }};
}

#[actix_web::test]
#[serial]
async fn test_resource_crud_flow() {
    setup_env();
    let app = test::init_service(App::new().app_data(state()).configure(config)).await;

    // empty listing
    let req = test::TestRequest::get().uri("/api/v1/resources").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v.as_array().unwrap().len(), 0);

    // create
    let created = create_test_resource!(&app, staff_token(2), serde_json::json!({
        "type": "use-case",
        "title": "Lecture summariser",
        "content": "Summarise recordings into bullet points",
        "discipline": "History",
        "tools_used": ["Claude"]
    }));
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["type"], "use-case");
    assert_eq!(created["version_number"], 1);

    // detail
    let req = test::TestRequest::get().uri(&format!("/api/v1/resources/{id}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    // partial update leaves unspecified fields untouched
    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/resources/{id}"))
        .insert_header(("Authorization", format!("Bearer {}", staff_token(2))))
        .set_json(&serde_json::json!({"title": "Lecture summariser v2"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let updated: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(updated["title"], "Lecture summariser v2");
    assert_eq!(updated["discipline"], "History");
    assert_eq!(updated["tools_used"], serde_json::json!(["Claude"]));

    // delete by owner
    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/resources/{id}"))
        .insert_header(("Authorization", format!("Bearer {}", staff_token(2))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);

    let req = test::TestRequest::get().uri(&format!("/api/v1/resources/{id}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
#[serial]
async fn test_listing_filters_and_sorting() {
    setup_env();
    let app = test::init_service(App::new().app_data(state()).configure(config)).await;
    let token = staff_token(2);

    let marketing = create_test_resource!(&app, token, serde_json::json!({
        "type": "prompt-template",
        "title": "Rubric Generator",
        "content": "Generates marking rubrics from outcomes",
        "discipline": "Marketing",
        "tools_used": ["ChatGPT"],
        "time_saved_value": 2.0,
        "time_saved_frequency": "per-week"
    }));
    create_test_resource!(&app, token, serde_json::json!({
        "type": "use-case",
        "title": "Email triage",
        "content": "Sorts the shared inbox",
        "discipline": "Management",
        "tools_used": ["Copilot"],
        "collaboration_status": "seeking"
    }));

    // AND across dimensions includes the matching record
    let req = test::TestRequest::get()
        .uri("/api/v1/resources?discipline=Marketing&tools=ChatGPT&min_time_saved=1.0")
        .to_request();
    let resp = test::call_service(&app, req).await;
    let page: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let page = page.as_array().unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0]["id"], marketing["id"]);

    // discipline mismatch excludes it
    let req = test::TestRequest::get().uri("/api/v1/resources?discipline=Management").to_request();
    let resp = test::call_service(&app, req).await;
    let page: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(page.as_array().unwrap().len(), 1);
    assert_eq!(page[0]["title"], "Email triage");

    // collaboration status filter
    let req = test::TestRequest::get()
        .uri("/api/v1/resources?collaboration_status=seeking")
        .to_request();
    let resp = test::call_service(&app, req).await;
    let page: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(page.as_array().unwrap().len(), 1);

    // free text search over content, case-insensitive
    let req = test::TestRequest::get().uri("/api/v1/resources?search=RUBRIC").to_request();
    let resp = test::call_service(&app, req).await;
    let page: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(page.as_array().unwrap().len(), 1);

    // zero matches is an empty page, not an error
    let req = test::TestRequest::get().uri("/api/v1/resources?search=nothing-here").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let page: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(page.as_array().unwrap().len(), 0);

    // popular sort puts the viewed resource first
    let viewed_id = marketing["id"].as_i64().unwrap();
    for _ in 0..3 {
        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/resources/{viewed_id}/view"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }
    let req = test::TestRequest::get().uri("/api/v1/resources?sort_by=popular").to_request();
    let resp = test::call_service(&app, req).await;
    let page: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(page[0]["id"], marketing["id"]);

    // pagination
    let req = test::TestRequest::get().uri("/api/v1/resources?skip=1&limit=1").to_request();
    let resp = test::call_service(&app, req).await;
    let page: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(page.as_array().unwrap().len(), 1);
}

#[actix_web::test]
#[serial]
async fn test_fork_lineage_rules() {
    setup_env();
    let app = test::init_service(App::new().app_data(state()).configure(config)).await;
    let token = staff_token(2);

    let parent = create_test_resource!(&app, token, serde_json::json!({
        "type": "prompt-template",
        "title": "Quiz writer",
        "content": "Drafts quiz questions"
    }));
    let parent_id = parent["id"].as_i64().unwrap();

    // valid fork pointer accepted
    let req = test::TestRequest::post()
        .uri("/api/v1/resources")
        .insert_header(("Authorization", format!("Bearer {}", staff_token(3))))
        .set_json(&serde_json::json!({
            "type": "prompt-template",
            "title": "Quiz writer, shorter",
            "content": "Leaner variant",
            "is_fork": true,
            "forked_from_id": parent_id
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    // dangling fork pointer is a 404
    let req = test::TestRequest::post()
        .uri("/api/v1/resources")
        .insert_header(("Authorization", format!("Bearer {}", staff_token(3))))
        .set_json(&serde_json::json!({
            "type": "prompt-template",
            "title": "Orphan",
            "content": "body",
            "is_fork": true,
            "forked_from_id": 999_999
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    // fork flag without a pointer is a validation failure
    let req = test::TestRequest::post()
        .uri("/api/v1/resources")
        .insert_header(("Authorization", format!("Bearer {}", staff_token(3))))
        .set_json(&serde_json::json!({
            "type": "prompt-template",
            "title": "No pointer",
            "content": "body",
            "is_fork": true
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 422);

    // fork endpoint copies with lineage and bumps the fork counter
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/resources/{parent_id}/fork"))
        .insert_header(("Authorization", format!("Bearer {}", staff_token(4))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let fork: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(fork["is_fork"], true);
    assert_eq!(fork["forked_from_id"], parent_id);
    assert_eq!(fork["user_id"], 4);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/resources/{parent_id}/analytics"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let analytics: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(analytics["fork_count"], 1);
}

#[actix_web::test]
#[serial]
async fn test_ownership_and_validation() {
    setup_env();
    let app = test::init_service(App::new().app_data(state()).configure(config)).await;

    let created = create_test_resource!(&app, staff_token(2), serde_json::json!({
        "type": "use-case",
        "title": "Mine",
        "content": "body"
    }));
    let id = created["id"].as_i64().unwrap();

    // unauthenticated create is rejected
    let req = test::TestRequest::post()
        .uri("/api/v1/resources")
        .set_json(&serde_json::json!({"type": "use-case", "title": "x", "content": "y"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    // empty title is a validation failure
    let req = test::TestRequest::post()
        .uri("/api/v1/resources")
        .insert_header(("Authorization", format!("Bearer {}", staff_token(2))))
        .set_json(&serde_json::json!({"type": "use-case", "title": "  ", "content": "y"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 422);

    // non-owner cannot delete, and the resource survives
    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/resources/{id}"))
        .insert_header(("Authorization", format!("Bearer {}", staff_token(3))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    let req = test::TestRequest::get().uri(&format!("/api/v1/resources/{id}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    // non-owner cannot patch either
    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/resources/{id}"))
        .insert_header(("Authorization", format!("Bearer {}", staff_token(3))))
        .set_json(&serde_json::json!({"title": "hijacked"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    // admin can delete anything
    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/resources/{id}"))
        .insert_header(("Authorization", format!("Bearer {}", admin_token())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);
}

#[actix_web::test]
#[serial]
async fn test_hidden_resources_visibility() {
    setup_env();
    let app = test::init_service(App::new().app_data(state()).configure(config)).await;

    let created = create_test_resource!(&app, staff_token(2), serde_json::json!({
        "type": "policy",
        "title": "Draft policy",
        "content": "body"
    }));
    let id = created["id"].as_i64().unwrap();

    // admin hides it
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/admin/resources/{id}/hide"))
        .insert_header(("Authorization", format!("Bearer {}", admin_token())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    // anonymous listing and detail no longer see it
    let req = test::TestRequest::get().uri("/api/v1/resources").to_request();
    let resp = test::call_service(&app, req).await;
    let page: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(page.as_array().unwrap().len(), 0);
    let req = test::TestRequest::get().uri(&format!("/api/v1/resources/{id}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    // the owner still sees their own hidden resource
    let req = test::TestRequest::get()
        .uri("/api/v1/resources")
        .insert_header(("Authorization", format!("Bearer {}", staff_token(2))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let page: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(page.as_array().unwrap().len(), 1);

    // unhide restores public visibility
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/admin/resources/{id}/unhide"))
        .insert_header(("Authorization", format!("Bearer {}", admin_token())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let req = test::TestRequest::get().uri(&format!("/api/v1/resources/{id}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    // moderation endpoints are admin-only
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/admin/resources/{id}/hide"))
        .insert_header(("Authorization", format!("Bearer {}", staff_token(2))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
}

#[actix_web::test]
#[serial]
async fn test_resource_creation_rate_limit() {
    setup_env();
    let data = web::Data::new(AppState {
        repo: Arc::new(InMemRepo::new()),
        rate: RateLimiterFacade::new(
            InMemoryRateLimiter::new(true),
            RateLimitConfig {
                resource_limit: 1,
                resource_window: Duration::from_secs(60),
                comment_limit: 100,
                comment_window: Duration::from_secs(60),
                view_limit: 100,
                view_window: Duration::from_secs(60),
            },
        ),
    });
    let app = test::init_service(App::new().app_data(data).configure(config)).await;
    let token = staff_token(2);

    let req = test::TestRequest::post()
        .uri("/api/v1/resources")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(&serde_json::json!({"type": "use-case", "title": "one", "content": "body"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    let req = test::TestRequest::post()
        .uri("/api/v1/resources")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(&serde_json::json!({"type": "use-case", "title": "two", "content": "body"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 429);
}
