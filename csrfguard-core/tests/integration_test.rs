//! Integration tests for csrfguard-core

use bytes::Bytes;
use csrfguard_core::*;

#[tokio::test]
async fn test_streamed_html_response_roundtrip() {
    let (stream, sender) = ChunkStream::channel();
    let mut resp = HttpResponse::ok().with_body(Body::from_stream(stream));
    resp.headers.set_content_type("text/html");

    tokio::spawn(async move {
        for part in ["<html>", "<body>", "hi", "</body>", "</html>"] {
            sender.send(part).await.unwrap();
        }
        sender.close().await;
    });

    let body = resp.body.collect().await.unwrap();
    assert_eq!(body, Bytes::from_static(b"<html><body>hi</body></html>"));
}

#[test]
fn test_request_cookie_and_token_sources() {
    let req = HttpRequest::post("/submit?csrfp_token=fromquery")
        .with_header("Host", "app.example")
        .with_header("Cookie", "CSRFPSESSID=abcdef; other=1")
        .with_header("Content-Type", "application/x-www-form-urlencoded")
        .with_body("csrfp_token=frombody");

    assert_eq!(req.cookie("CSRFPSESSID"), Some("abcdef"));
    assert_eq!(req.query_param("csrfp_token").as_deref(), Some("fromquery"));
    assert_eq!(req.form_param("csrfp_token").as_deref(), Some("frombody"));
    assert_eq!(req.url_without_query(), "http://app.example/submit");
}

#[test]
fn test_header_map_collects_duplicates() {
    let headers: HeaderMap = vec![("Set-Cookie", "a=1"), ("Set-Cookie", "b=2")]
        .into_iter()
        .collect();
    assert_eq!(headers.len(), 2);
    assert_eq!(headers.get("set-cookie"), Some("a=1"));
}
