mod common;

use actix_web::cookie::Cookie;
use actix_web::http::{StatusCode, header};
use actix_web::{App, test};
use common::*;
use cropscan_backend::db::memory_repository::MemoryRepository;
use cropscan_backend::db::models::User;
use cropscan_backend::db::{ReportStore, UserStore};
use cropscan_backend::narrative::FALLBACK_NARRATIVE;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use uuid::Uuid;

macro_rules! app {
    ($ctx:expr) => {
        test::init_service(
            App::new()
                .wrap($ctx.auth_middleware())
                .configure(|cfg| $ctx.configure(cfg)),
        )
        .await
    };
}

fn analyze_request(token: &str, model: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri(&format!("/api/analyze?model={}", model))
        .insert_header(bearer(token))
        .insert_header(multipart_content_type())
        .set_payload(multipart_body("file", "image/png", PNG))
}

#[actix_web::test]
async fn analyze_returns_and_persists_the_report() {
    let store = Arc::new(MemoryRepository::new());
    let ctx = context(
        store.clone(),
        FakeClassifier::predicting("Tomato___Late_blight", 0.93),
        FakeNarrator(Some("<h3>Late blight</h3>".to_string())),
    );
    let app = app!(ctx);
    let owner = Uuid::new_v4();
    let token = token_for(&ctx, owner);

    let resp = test::call_service(&app, analyze_request(&token, "accurate").to_request()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["prediction"]["label"], "Tomato___Late_blight");
    assert_eq!(body["prediction"]["confidence"], 0.93);
    assert_eq!(body["severity"], "high");
    assert_eq!(body["model_used"], "accurate");
    assert_eq!(body["narrative_report"], "<h3>Late blight</h3>");
    assert_eq!(body["owner_id"], owner.to_string());

    let saved = store.list_by_owner(owner, None).await.unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].id.to_string(), body["id"].as_str().unwrap());
}

#[actix_web::test]
async fn classifier_error_is_a_bad_gateway_and_nothing_is_saved() {
    let store = Arc::new(MemoryRepository::new());
    let ctx = context(
        store.clone(),
        FakeClassifier::failing(500),
        FakeNarrator(Some("unused".to_string())),
    );
    let app = app!(ctx);
    let owner = Uuid::new_v4();

    let resp = test::call_service(
        &app,
        analyze_request(&token_for(&ctx, owner), "fast").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("Classification failed"));
    assert!(store.list_by_owner(owner, None).await.unwrap().is_empty());
}

#[actix_web::test]
async fn llm_failure_uses_the_fallback_and_still_saves() {
    let store = Arc::new(MemoryRepository::new());
    let ctx = context(
        store.clone(),
        FakeClassifier::predicting("Apple___Cedar_apple_rust", 0.55),
        FakeNarrator(None),
    );
    let app = app!(ctx);
    let owner = Uuid::new_v4();

    let resp = test::call_service(
        &app,
        analyze_request(&token_for(&ctx, owner), "fast").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["narrative_report"], FALLBACK_NARRATIVE);
    assert_eq!(body["severity"], "low");

    let saved = store.list_by_owner(owner, None).await.unwrap();
    assert_eq!(saved[0].narrative_report.as_deref(), Some(FALLBACK_NARRATIVE));
}

#[actix_web::test]
async fn unsupported_images_never_reach_the_classifier() {
    let store = Arc::new(MemoryRepository::new());
    let classifier = Arc::new(FakeClassifier::predicting("Healthy", 0.99));
    let ctx = context_with_classifier(store, classifier.clone(), FakeNarrator(None));
    let app = app!(ctx);
    let token = token_for(&ctx, Uuid::new_v4());

    let req = test::TestRequest::post()
        .uri("/api/analyze")
        .insert_header(bearer(&token))
        .insert_header(multipart_content_type())
        .set_payload(multipart_body("file", "image/gif", b"GIF89a"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
}

#[actix_web::test]
async fn reports_are_scoped_to_their_owner() {
    let store = Arc::new(MemoryRepository::new());
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    for minutes in [30, 20, 10] {
        store.save(&stored_report(alice, "Rust", minutes)).await.unwrap();
    }
    store.save(&stored_report(bob, "Scab", 5)).await.unwrap();

    let ctx = context(
        store,
        FakeClassifier::failing(500),
        FakeNarrator(None),
    );
    let app = app!(ctx);

    let req = test::TestRequest::get()
        .uri("/api/reports")
        .insert_header(bearer(&token_for(&ctx, alice)))
        .to_request();
    let reports: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r["owner_id"] == alice.to_string()));

    let req = test::TestRequest::get()
        .uri("/api/reports?limit=1")
        .insert_header(bearer(&token_for(&ctx, bob)))
        .to_request();
    let reports: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["prediction"]["label"], "Scab");
}

#[actix_web::test]
async fn deleting_history_leaves_other_owners_untouched() {
    let store = Arc::new(MemoryRepository::new());
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    store.save(&stored_report(alice, "Rust", 2)).await.unwrap();
    store.save(&stored_report(alice, "Blight", 1)).await.unwrap();
    store.save(&stored_report(bob, "Scab", 1)).await.unwrap();

    let ctx = context(store.clone(), FakeClassifier::failing(500), FakeNarrator(None));
    let app = app!(ctx);

    let req = test::TestRequest::delete()
        .uri("/api/reports")
        .insert_header(bearer(&token_for(&ctx, alice)))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["reports_deleted"], 2);

    assert!(store.list_by_owner(alice, None).await.unwrap().is_empty());
    assert_eq!(store.list_by_owner(bob, None).await.unwrap().len(), 1);
}

#[actix_web::test]
async fn insights_aggregate_the_full_history() {
    let store = Arc::new(MemoryRepository::new());
    let owner = Uuid::new_v4();
    for (label, minutes) in [("Rust", 3), ("Rust", 2), ("Blight", 1)] {
        store.save(&stored_report(owner, label, minutes)).await.unwrap();
    }
    let ctx = context(store, FakeClassifier::failing(500), FakeNarrator(None));
    let app = app!(ctx);
    let token = token_for(&ctx, owner);

    let req = test::TestRequest::get()
        .uri("/api/insights")
        .insert_header(bearer(&token))
        .to_request();
    let insights: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(insights["most_common_label"], "Rust");
    assert_eq!(insights["unique_labels"], 2);
    assert_eq!(insights["total_scans"], 3);
    assert_eq!(insights["most_active_month"].as_str().map(str::len), Some(7));

    let req = test::TestRequest::get()
        .uri("/api/dashboard")
        .insert_header(bearer(&token))
        .to_request();
    let dashboard: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(dashboard["total_scans"], 3);
    assert_eq!(dashboard["recent"][0]["label"], "Blight");
}

#[actix_web::test]
async fn summary_report_of_an_empty_history_is_fixed_text() {
    let store = Arc::new(MemoryRepository::new());
    let ctx = context(
        store,
        FakeClassifier::failing(500),
        FakeNarrator(Some("should not be used".to_string())),
    );
    let app = app!(ctx);

    let req = test::TestRequest::get()
        .uri("/api/insights/report")
        .insert_header(bearer(&token_for(&ctx, Uuid::new_v4())))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert!(body["report"].as_str().unwrap().contains("No scan data available"));
}

#[actix_web::test]
async fn requests_without_a_session_are_gated() {
    let store = Arc::new(MemoryRepository::new());
    let ctx = context(store, FakeClassifier::failing(500), FakeNarrator(None));
    let app = app!(ctx);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/api/reports").to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/dashboard").to_request()).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/auth/login");

    let req = test::TestRequest::get()
        .uri("/api/reports")
        .insert_header(bearer("not.a.token"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn session_cookie_is_accepted() {
    let store = Arc::new(MemoryRepository::new());
    let owner = Uuid::new_v4();
    store.save(&stored_report(owner, "Rust", 1)).await.unwrap();
    let ctx = context(store, FakeClassifier::failing(500), FakeNarrator(None));
    let app = app!(ctx);

    let req = test::TestRequest::get()
        .uri("/api/reports")
        .cookie(Cookie::new("cropscan_session", token_for(&ctx, owner)))
        .to_request();
    let reports: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(reports.len(), 1);
}

#[actix_web::test]
async fn sign_in_without_a_provider_is_unavailable() {
    let store = Arc::new(MemoryRepository::new());
    let ctx = context(store, FakeClassifier::failing(500), FakeNarrator(None));
    let app = app!(ctx);

    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/auth/login").to_request()).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[actix_web::test]
async fn profile_update_and_account_deletion() {
    let store = Arc::new(MemoryRepository::new());
    let user = User::new("google_42".into(), "ada@example.com".into(), "Ada".into());
    store.create_user(&user).await.unwrap();
    store.save(&stored_report(user.id, "Rust", 1)).await.unwrap();

    let ctx = context(store.clone(), FakeClassifier::failing(500), FakeNarrator(None));
    let app = app!(ctx);
    let token = token_for(&ctx, user.id);

    let req = test::TestRequest::put()
        .uri("/api/settings/profile")
        .insert_header(bearer(&token))
        .set_json(serde_json::json!({"display_name": "Ada L.", "theme": "dark"}))
        .to_request();
    let profile: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(profile["display_name"], "Ada L.");
    assert_eq!(profile["theme"], "dark");

    let req = test::TestRequest::get()
        .uri("/auth/me")
        .insert_header(bearer(&token))
        .to_request();
    let me: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(me["name"], "Ada L.");

    let req = test::TestRequest::delete()
        .uri("/api/account")
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["reports_deleted"], 1);
    assert_eq!(body["user_deleted"], true);
    assert_eq!(body["identity_deleted"], false);

    assert!(store.get_user_by_id(user.id).await.unwrap().is_none());
    assert!(store.list_by_owner(user.id, None).await.unwrap().is_empty());
}

#[actix_web::test]
async fn password_change_is_validated_then_needs_a_provider() {
    let store = Arc::new(MemoryRepository::new());
    let user = User::new("google_7".into(), "grace@example.com".into(), "Grace".into());
    store.create_user(&user).await.unwrap();

    let ctx = context(store, FakeClassifier::failing(500), FakeNarrator(None));
    let app = app!(ctx);
    let token = token_for(&ctx, user.id);
    let change = |current: &str, new: &str| {
        serde_json::json!({ "current_password": current, "new_password": new })
    };

    let req = test::TestRequest::put()
        .uri("/api/settings/password")
        .set_json(change("old-secret", "new-secret"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::put()
        .uri("/api/settings/password")
        .insert_header(bearer(&token))
        .set_json(change("old-secret", "abc"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("at least 6"));

    let req = test::TestRequest::put()
        .uri("/api/settings/password")
        .insert_header(bearer(&token))
        .set_json(change("old-secret", "new-secret"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}
