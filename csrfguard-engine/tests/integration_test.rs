use csrfguard_config::Settings;
use csrfguard_core::{HttpRequest, HttpResponse};
use csrfguard_engine::prelude::*;
use csrfguard_engine::{PROTECTED_BY, VALIDATED_MARKER};
use csrfguard_store::MemoryTokenStore;
use std::sync::Arc;

fn cookie_value<'a>(resp: &'a HttpResponse, name: &str) -> &'a str {
    resp.headers
        .get_all("Set-Cookie")
        .into_iter()
        .find_map(|c| c.strip_prefix(name)?.strip_prefix('='))
        .and_then(|rest| rest.split(';').next())
        .expect("cookie present")
}

async fn first_visit(engine: &CsrfEngine) -> (String, String) {
    let mut req = HttpRequest::get("/form");
    let Gate::Proceed(ctx) = engine.before_request(&mut req).await else {
        panic!("GET should be exempt");
    };
    let resp = engine.after_response(&ctx, HttpResponse::html("<body>form</body>")).await;
    (
        cookie_value(&resp, "CSRFPSESSID").to_string(),
        cookie_value(&resp, "csrfp_token").to_string(),
    )
}

#[tokio::test]
async fn test_token_round_trip_rotates() {
    let engine = CsrfEngine::new(CsrfConfig::builder().build().unwrap(), Arc::new(MemoryTokenStore::new()));
    let (session, token) = first_visit(&engine).await;

    let mut post = HttpRequest::post("/submit")
        .with_header("Cookie", format!("CSRFPSESSID={session}"))
        .with_header("Content-Type", "application/x-www-form-urlencoded")
        .with_body(format!("name=a&csrfp_token={token}"));
    let Gate::Proceed(ctx) = engine.before_request(&mut post).await else {
        panic!("valid token rejected");
    };
    assert_eq!(post.env_var(VALIDATED_MARKER), Some("true"));

    let resp = engine.after_response(&ctx, HttpResponse::ok()).await;
    assert_eq!(resp.headers.get("X-Protected-By"), Some(PROTECTED_BY));
    assert_eq!(cookie_value(&resp, "CSRFPSESSID"), session);
    let rotated = cookie_value(&resp, "csrfp_token");
    assert_ne!(rotated, token);

    // The old token no longer matches the session.
    let mut replay = HttpRequest::post(&format!("/submit?csrfp_token={token}"))
        .with_header("Cookie", format!("CSRFPSESSID={session}"));
    assert!(matches!(engine.before_request(&mut replay).await, Gate::Respond(r) if r.status == 403));
}

#[tokio::test]
async fn test_token_is_bound_to_session() {
    let engine = CsrfEngine::new(CsrfConfig::builder().build().unwrap(), Arc::new(MemoryTokenStore::new()));
    let (_, token) = first_visit(&engine).await;
    let (other_session, _) = first_visit(&engine).await;

    let mut req = HttpRequest::post(&format!("/submit?csrfp_token={token}"))
        .with_header("Cookie", format!("CSRFPSESSID={other_session}"));
    assert!(matches!(engine.before_request(&mut req).await, Gate::Respond(_)));
}

#[tokio::test]
async fn test_from_settings_connects_memory_store() {
    let settings = Settings {
        action: "redirect".to_string(),
        error_redirection_uri: Some("/csrf-error".to_string()),
        ..Settings::default()
    };
    let engine = CsrfEngine::from_settings(&settings).await.unwrap();
    assert_eq!(engine.store().store_type(), "memory");

    let mut req = HttpRequest::post("/submit");
    let Gate::Respond(resp) = engine.before_request(&mut req).await else {
        panic!("expected redirect");
    };
    assert_eq!(resp.status, 302);
    assert_eq!(resp.headers.get("Location"), Some("/csrf-error"));
}

#[tokio::test]
async fn test_invalid_settings_are_rejected() {
    let settings = Settings {
        token_length: 4,
        ..Settings::default()
    };
    assert!(matches!(
        CsrfEngine::from_settings(&settings).await,
        Err(CsrfError::Config(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sessions() {
    let engine = Arc::new(CsrfEngine::new(
        CsrfConfig::builder().build().unwrap(),
        Arc::new(MemoryTokenStore::new()),
    ));

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let (session, token) = first_visit(&engine).await;
                let mut post = HttpRequest::post(&format!("/submit?csrfp_token={token}"))
                    .with_header("Cookie", format!("CSRFPSESSID={session}"));
                matches!(engine.before_request(&mut post).await, Gate::Proceed(_))
            })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap());
    }
}
