//! End-to-end protection workflows through the middleware chain.

use bytes::Bytes;
use csrfguard::http::{ChunkStream, handler_fn};
use csrfguard::prelude::*;
use csrfguard::{Body, Fragments, MemoryAuditSink, PROTECTED_BY, StreamChunk};
use futures_util::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const PAGE: &str = "<html><head><title>Online Bank!</title></head><body><form method=\"post\"><input></form></body></html>";

struct Harness {
    engine: Arc<CsrfEngine>,
    audit: Arc<MemoryAuditSink>,
    calls: Arc<AtomicUsize>,
}

impl Harness {
    fn new(config: CsrfConfig) -> Self {
        let audit = Arc::new(MemoryAuditSink::new());
        let engine = CsrfEngine::new(config, Arc::new(MemoryTokenStore::new())).with_audit_sink(audit.clone());
        Self {
            engine: Arc::new(engine),
            audit,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn with_fragments(config: CsrfConfig, fragments: Fragments) -> Self {
        let audit = Arc::new(MemoryAuditSink::new());
        let engine = CsrfEngine::new(config, Arc::new(MemoryTokenStore::new()))
            .with_audit_sink(audit.clone())
            .with_fragments(fragments);
        Self {
            engine: Arc::new(engine),
            audit,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    async fn send(&self, req: HttpRequest) -> HttpResponse {
        let calls = Arc::clone(&self.calls);
        let handler = handler_fn(move |_req| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(HttpResponse::html(PAGE))
            }
        });
        MiddlewareChain::new()
            .with(CsrfMiddleware::from_shared(Arc::clone(&self.engine)))
            .apply(req, handler)
            .await
            .unwrap()
    }

    fn handler_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn text(resp: &HttpResponse) -> &str {
    std::str::from_utf8(resp.body.as_bytes().unwrap()).unwrap()
}

#[tokio::test]
async fn test_valid_post_is_served_and_rewritten() {
    let harness = Harness::new(CsrfConfig::builder().build().unwrap());
    let token = harness.engine.issue_token("sess42").await.unwrap();

    let req = HttpRequest::post("/transfer")
        .with_header("Host", "bank.example")
        .with_header("Cookie", "CSRFPSESSID=sess42")
        .with_header("Content-Type", "application/x-www-form-urlencoded")
        .with_body(format!("amount=10&csrfp_token={token}"));
    let resp = harness.send(req).await;

    assert_eq!(resp.status, 200);
    assert_eq!(harness.handler_calls(), 1);
    assert_eq!(resp.headers.get("X-Protected-By"), Some(PROTECTED_BY));

    let fragments = harness.engine.fragments();
    let noscript = std::str::from_utf8(&fragments.noscript).unwrap();
    let script = std::str::from_utf8(&fragments.script).unwrap();
    let body = text(&resp);
    assert!(body.contains(&format!("<body>{noscript}<form")));
    assert!(body.contains(&format!("</form>{script}</body>")));
    assert_eq!(resp.headers.content_length(), Some(body.len() as u64));
    assert!(harness.audit.is_empty());
}

#[tokio::test]
async fn test_wrong_token_is_forbidden_without_side_effects() {
    let harness = Harness::new(CsrfConfig::builder().build().unwrap());
    harness.engine.issue_token("sess42").await.unwrap();

    let req = HttpRequest::post("/transfer")
        .with_header("Cookie", "CSRFPSESSID=sess42")
        .with_body("amount=1000000&csrfp_token=GuessedToken123");
    let resp = harness.send(req).await;

    assert_eq!(resp.status, 403);
    assert_eq!(harness.handler_calls(), 0);
    assert!(resp.headers.get_all("Set-Cookie").is_empty());

    let events = harness.audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].method, "POST");
    assert_eq!(events[0].reason, "token mismatch");
    assert!(events[0].to_string().starts_with("CSRF ATTACK, denied, action=forbidden"));
}

#[tokio::test]
async fn test_static_asset_is_bypassed() {
    let harness = Harness::new(CsrfConfig::builder().build().unwrap());

    let resp = harness.send(HttpRequest::get("/assets/app.js")).await;
    assert_eq!(resp.status, 200);
    assert!(resp.headers.get_all("Set-Cookie").is_empty());
    assert!(!resp.headers.contains("X-Protected-By"));
    assert_eq!(text(&resp), PAGE);

    // Even a state-changing method is not validated on an asset path.
    let resp = harness.send(HttpRequest::post("/assets/app.js")).await;
    assert_eq!(resp.status, 200);
    assert!(harness.audit.is_empty());
    assert_eq!(harness.handler_calls(), 2);
}

#[tokio::test]
async fn test_declared_length_grows_by_fragment_size() {
    let fragments = Fragments::custom("<noscript>JS</noscript>", "<script src=\"/csrfp1.js\"></script>");
    assert_eq!(fragments.total_len(), 57);
    assert_eq!(PAGE.len(), 100);

    let harness = Harness::with_fragments(CsrfConfig::builder().build().unwrap(), fragments);
    let mut req = HttpRequest::get("/");
    let Gate::Proceed(ctx) = harness.engine.before_request(&mut req).await else {
        panic!("GET should be exempt");
    };

    let mut resp = HttpResponse::ok().with_header("Content-Type", "text/html").with_header("Content-Length", "100");
    resp.body = Body::from_stream(futures_util::stream::iter(
        PAGE.as_bytes()
            .chunks(7)
            .map(|c| Ok(StreamChunk::Data(Bytes::copy_from_slice(c))))
            .collect::<Vec<_>>(),
    ));

    let resp = harness.engine.after_response(&ctx, resp).await;
    assert_eq!(resp.headers.content_length(), Some(157));
    let body = resp.body.collect().await.unwrap();
    assert_eq!(body.len(), 157);
}

#[tokio::test]
async fn test_stream_is_rewritten_incrementally() {
    let harness = Harness::new(CsrfConfig::builder().build().unwrap());
    let mut req = HttpRequest::get("/report");
    let Gate::Proceed(ctx) = harness.engine.before_request(&mut req).await else {
        panic!("GET should be exempt");
    };

    let (stream, sender) = ChunkStream::channel();
    let mut resp = HttpResponse::ok().with_header("Content-Type", "text/html");
    resp.body = Body::from_stream(stream);
    let resp = harness.engine.after_response(&ctx, resp).await;
    assert!(!resp.headers.contains("Content-Length"));

    let Body::Stream(mut body) = resp.body else {
        panic!("streamed body expected");
    };

    sender.send("<html><BODY class=\"report\">").await.unwrap();
    let first = body.next().await.unwrap().unwrap();
    assert_eq!(first, StreamChunk::data("<html><BODY class=\"report\">"));
    let second = body.next().await.unwrap().unwrap();
    assert_eq!(second.as_data(), Some(&harness.engine.fragments().noscript));

    sender.send("<p>row</p></bo").await.unwrap();
    sender.send("dy></html>").await.unwrap();
    sender.close().await;

    let mut rest = Vec::new();
    while let Some(chunk) = body.next().await {
        rest.push(chunk.unwrap());
    }
    assert_eq!(rest.last(), Some(&StreamChunk::End));
    let tail: Vec<u8> = rest
        .iter()
        .filter_map(StreamChunk::as_data)
        .flat_map(|b| b.iter().copied())
        .collect();
    let tail = String::from_utf8(tail).unwrap();
    assert!(tail.starts_with("<p>row</p>"));
    assert!(tail.ends_with("</script>\n</body></html>"));
}

#[tokio::test]
async fn test_settings_drive_the_failure_action() {
    let settings = SettingsLoader::new()
        .vars([
            ("CSRFGUARD_ACTION", "message"),
            ("CSRFGUARD_ERROR_CUSTOM_MESSAGE", "<h1>Blocked</h1>"),
        ])
        .load()
        .unwrap();
    let engine = CsrfEngine::from_settings(&settings).await.unwrap();
    let chain = MiddlewareChain::new().with(CsrfMiddleware::new(engine));
    let handler = handler_fn(|_req| async { Ok(HttpResponse::ok()) });

    let resp = chain.apply(HttpRequest::post("/transfer"), handler).await.unwrap();
    assert_eq!(resp.status, 403);
    assert_eq!(text(&resp), "<h1>Blocked</h1>");
}
