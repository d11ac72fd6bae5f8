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
    // Capabilities are read once per process; set before first access.
    std::env::set_var("INTERNAL_MESSAGING_ENABLED", "1");
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("AIX_DATA_DIR", tmp.path().to_str().unwrap());
}

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
        assert_eq!(resp.status(), 201);
        let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        v["id"].as_i64().unwrap()
    }};
}

#[actix_web::test]
#[serial]
async fn test_collaboration_options() {
    setup_env();
    let app = test::init_service(App::new().app_data(state()).configure(config)).await;
    let id = create_test_resource!(&app, staff_token(2), serde_json::json!({
        "type": "request",
        "title": "Co-design an AI marking workflow",
        "content": "Looking for a partner",
        "collaboration_status": "seeking",
        "open_to_collaborate": ["co-teaching", "materials exchange"]
    }));

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/resources/{id}/collaboration-options"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let opts: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(opts["resource_id"], id);
    assert_eq!(opts["collaboration_status"], "seeking");
    assert_eq!(
        opts["open_to_collaborate"],
        serde_json::json!(["co-teaching", "materials exchange"])
    );
    // email is always on; internal messaging comes from platform config
    assert_eq!(opts["contact"]["email"], true);
    assert_eq!(opts["contact"]["internal_messaging"], true);

    let req = test::TestRequest::get()
        .uri("/api/v1/resources/999999/collaboration-options")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
#[serial]
async fn test_similar_ranking() {
    setup_env();
    let app = test::init_service(App::new().app_data(state()).configure(config)).await;
    let token = staff_token(2);

    let strong = create_test_resource!(&app, token, serde_json::json!({
        "type": "use-case",
        "title": "Strong match",
        "content": "body",
        "discipline": "Marketing",
        "tools_used": ["ChatGPT", "Claude"]
    }));
    let discipline_only = create_test_resource!(&app, token, serde_json::json!({
        "type": "use-case",
        "title": "Discipline only",
        "content": "body",
        "discipline": "Marketing",
        "tools_used": ["Excel"]
    }));
    let tool_only = create_test_resource!(&app, token, serde_json::json!({
        "type": "use-case",
        "title": "Tool only",
        "content": "body",
        "discipline": "History",
        "tools_used": ["ChatGPT"]
    }));
    create_test_resource!(&app, token, serde_json::json!({
        "type": "use-case",
        "title": "Unrelated",
        "content": "body",
        "discipline": "Chemistry",
        "tools_used": ["Matlab"]
    }));

    let req = test::TestRequest::get()
        .uri("/api/v1/resources/similar?discipline=Marketing&tools=ChatGPT,Claude&limit=10")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let page: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let page = page.as_array().unwrap();
    // overlap 2 + discipline bonus ranks first; zero-score record excluded
    assert_eq!(page.len(), 3);
    assert_eq!(page[0]["id"], strong);
    // score-1 tie breaks by newest
    assert_eq!(page[1]["id"], tool_only);
    assert_eq!(page[2]["id"], discipline_only);
}

#[actix_web::test]
#[serial]
async fn test_collaboration_requests_are_persisted() {
    setup_env();
    let app = test::init_service(App::new().app_data(state()).configure(config)).await;
    let owner = staff_token(2);
    let requester = staff_token(3);

    let id = create_test_resource!(&app, owner, serde_json::json!({
        "type": "request",
        "title": "Looking for collaborators",
        "content": "body"
    }));

    // requester must be authenticated
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/resources/{id}/collaborate"))
        .set_json(&serde_json::json!({"message": "count me in"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/resources/{id}/collaborate"))
        .insert_header(("Authorization", format!("Bearer {requester}")))
        .set_json(&serde_json::json!({"message": "count me in"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let request: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(request["resource_id"], id);
    assert_eq!(request["from_user_id"], 3);
    assert_eq!(request["message"], "count me in");

    // the owner can list what arrived
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/resources/{id}/collaborate"))
        .insert_header(("Authorization", format!("Bearer {owner}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let requests: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(requests.as_array().unwrap().len(), 1);

    // a third party cannot
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/resources/{id}/collaborate"))
        .insert_header(("Authorization", format!("Bearer {}", staff_token(4))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
}
