// HTTP API tests for Mystery Match

use actix_web::{http::StatusCode, test, web, App};
use mystery_match::core::{LifecycleService, Matcher, Scheduler, SchedulerSettings};
use mystery_match::models::{UserResponse, UserState};
use mystery_match::routes::{self, AppState};
use mystery_match::services::{InMemoryStore, NotificationDispatcher, StateStore};
use serde_json::{json, Value};
use std::sync::Arc;

fn app_state() -> AppState {
    let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
    let dispatcher = NotificationDispatcher::default();
    let matcher = Matcher::default();
    let lifecycle = LifecycleService::new(store.clone(), dispatcher.clone(), *matcher.quota());
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        matcher,
        dispatcher,
        SchedulerSettings::default(),
    ));

    AppState {
        store,
        lifecycle,
        scheduler,
    }
}

macro_rules! init_app {
    () => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(app_state()))
                .configure(routes::configure_extractors)
                .configure(routes::configure_routes),
        )
        .await
    };
}

fn profile(gender: &str, preference: &str) -> Value {
    json!({
        "age": 26,
        "gender": gender,
        "preference": preference,
        "city": "Mumbai",
        "latitude": 19.0760,
        "longitude": 72.8777
    })
}

#[actix_web::test]
async fn test_health_check() {
    let app = init_app!();

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["status"], "healthy");
}

#[actix_web::test]
async fn test_register_and_fetch_user() {
    let app = init_app!();

    let req = test::TestRequest::post()
        .uri("/api/v1/users")
        .set_json(json!({ "userId": 42, "username": "anon" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let req = test::TestRequest::get().uri("/api/v1/users/42").to_request();
    let user: UserResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(user.state, UserState::New);
    assert_eq!(user.free_matches_remaining, 2);
    assert!(!user.is_premium);
}

#[actix_web::test]
async fn test_unknown_user_is_404() {
    let app = init_app!();

    let req = test::TestRequest::get().uri("/api/v1/users/7").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::post().uri("/api/v1/users/7/onboarding").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_non_numeric_id_is_rejected() {
    let app = init_app!();

    let req = test::TestRequest::get().uri("/api/v1/users/abc").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_profile_validation() {
    let app = init_app!();

    for id in [1, 2] {
        let req = test::TestRequest::post()
            .uri("/api/v1/users")
            .set_json(json!({ "userId": id }))
            .to_request();
        test::call_service(&app, req).await;
    }

    let mut underage = profile("Male", "Female");
    underage["age"] = json!(17);
    let req = test::TestRequest::post()
        .uri("/api/v1/users/1/profile")
        .set_json(underage)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/v1/users/1/profile")
        .set_json(json!({ "age": 30, "gender": "Male", "preference": "Female", "latitude": 19.0 }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/v1/users/1/profile")
        .set_json(json!({ "age": 30, "gender": "Robot", "preference": "Female" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_stale_command_is_conflict() {
    let app = init_app!();

    let req = test::TestRequest::post()
        .uri("/api/v1/users")
        .set_json(json!({ "userId": 5 }))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::post().uri("/api/v1/users/5/search/cancel").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["outcome"], "no_op");
    assert_eq!(body["state"], "NEW");
}

#[actix_web::test]
async fn test_match_flow_over_http() {
    let app = init_app!();

    for (id, gender, preference) in [(1, "Male", "Female"), (2, "Female", "Male")] {
        let req = test::TestRequest::post()
            .uri("/api/v1/users")
            .set_json(json!({ "userId": id }))
            .to_request();
        test::call_service(&app, req).await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/users/{}/onboarding", id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/users/{}/profile", id))
            .set_json(profile(gender, preference))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["state"], "SEARCHING");
    }

    let req = test::TestRequest::post().uri("/api/v1/admin/tick").to_request();
    let report: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(report["matchesCreated"], 1);
    assert_eq!(report["strategy"], "individual");

    let req = test::TestRequest::get().uri("/api/v1/users/1").to_request();
    let user: UserResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(user.state, UserState::Chatting);
    assert_eq!(user.free_matches_used, 1);

    let req = test::TestRequest::post()
        .uri("/api/v1/users/2/chat/report")
        .set_json(json!({ "reason": "rude" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["state"], "IDLE");

    let req = test::TestRequest::post().uri("/api/v1/users/2/chat/end").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let req = test::TestRequest::get().uri("/api/v1/admin/scheduler").to_request();
    let status: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["ticking"], false);
    assert_eq!(status["lastReport"]["matchesCreated"], 1);
}

#[actix_web::test]
async fn test_premium_gate_and_billing_hook() {
    let app = init_app!();

    let req = test::TestRequest::post()
        .uri("/api/v1/users")
        .set_json(json!({ "userId": 9 }))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/users/9/premium")
        .set_json(json!({ "plan": "monthly", "durationDays": 0 }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/v1/users/9/premium")
        .set_json(json!({ "plan": "monthly", "durationDays": 30 }))
        .to_request();
    let user: UserResponse = test::call_and_read_body_json(&app, req).await;
    assert!(user.is_premium);
    assert!(user.premium_expires_at.is_some());
}

#[actix_web::test]
async fn test_admin_block_and_unblock() {
    let app = init_app!();

    let req = test::TestRequest::post()
        .uri("/api/v1/users")
        .set_json(json!({ "userId": 3 }))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::post().uri("/api/v1/admin/users/3/block").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["state"], "BLOCKED");

    let req = test::TestRequest::post().uri("/api/v1/users/3/onboarding").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

    let req = test::TestRequest::post().uri("/api/v1/admin/users/3/unblock").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["state"], "IDLE");
}
