use actix_web::{test, App, web};
use chrono::DateTime;
use std::sync::Arc;
use tt2_auth_server::db::IdCounter;
use tt2_auth_server::{AppState, MemoryStore, Settings};

#[actix_rt::test]
async fn test_health_check() {
    // Create test app state backed by the in-memory store
    let config = Settings::new_for_test().expect("Failed to load test config");
    let store = Arc::new(MemoryStore::with_counter("users", IdCounter::new(25173, 13849)));
    let state = web::Data::new(AppState::with_store(config, store));

    state.auth_service.register("alice", "hunter2").await.unwrap();
    state.auth_service.login("alice", "hunter2").await.unwrap();

    // Create test app
    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(tt2_auth_server::health_check))
    ).await;

    // Send request
    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;

    // Assert response
    assert!(resp.status().is_success());

    // Parse response body
    let body = test::read_body(resp).await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    // Verify response format
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["active_sessions"], 1);
    assert!(DateTime::parse_from_rfc3339(
        json["timestamp"].as_str().unwrap()
    ).is_ok());
}
