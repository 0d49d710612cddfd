// HTTP request and response types

use crate::body::Body;
use crate::headers::HeaderMap;
use bytes::Bytes;
use std::collections::HashMap;

/// An inbound request as seen by the protection pipeline.
///
/// `env` is a per-request scratch map that middleware and handlers use to
/// pass flags to each other.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub scheme: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub remote_addr: Option<String>,
    pub env: HashMap<String, String>,
}

impl HttpRequest {
    /// Build a request from a method and a request target such as
    /// `/transfer?amount=10`.
    pub fn new(method: impl Into<String>, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target.to_string(), None),
        };
        Self {
            method: method.into().to_ascii_uppercase(),
            scheme: "http".to_string(),
            path,
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: None,
            env: HashMap::new(),
        }
    }

    pub fn get(target: &str) -> Self {
        Self::new("GET", target)
    }

    pub fn post(target: &str) -> Self {
        Self::new("POST", target)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    pub fn host(&self) -> Option<&str> {
        self.headers.host()
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers.cookie(name)
    }

    /// Last value of `name` in the query string.
    pub fn query_param(&self, name: &str) -> Option<String> {
        last_value(self.query.as_deref()?.as_bytes(), name)
    }

    /// Last value of `name` in a urlencoded body.
    pub fn form_param(&self, name: &str) -> Option<String> {
        if self.body.is_empty() {
            return None;
        }
        last_value(&self.body, name)
    }

    /// Top-level string or number field of a JSON object body.
    pub fn json_field(&self, name: &str) -> Option<String> {
        let value: serde_json::Value = serde_json::from_slice(&self.body).ok()?;
        match value.get(name)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Parse the body as JSON.
    pub fn json<T: for<'de> serde::Deserialize<'de>>(&self) -> Result<T, crate::Error> {
        serde_json::from_slice(&self.body).map_err(|e| crate::Error::Deserialization(e.to_string()))
    }

    /// `scheme://host/path` without the query string.
    pub fn url_without_query(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host().unwrap_or("localhost"), self.path)
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }
}

fn last_value(encoded: &[u8], name: &str) -> Option<String> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(encoded).ok()?;
    pairs
        .into_iter()
        .rev()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value)
}

/// An outbound response.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Body,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn found(location: impl Into<String>) -> Self {
        Self::new(302).with_header("Location", location)
    }

    pub fn forbidden() -> Self {
        Self::new(403)
    }

    pub fn internal_server_error() -> Self {
        Self::new(500)
    }

    /// HTML body with matching `Content-Type` and `Content-Length`.
    pub fn html(body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let mut response = Self::ok();
        response.headers.set_content_type("text/html; charset=utf-8");
        response.headers.set_content_length(body.len() as u64);
        response.body = Body::Full(body);
        response
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_splits_target() {
        let req = HttpRequest::new("post", "/transfer?to=bob&amount=5");
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/transfer");
        assert_eq!(req.query.as_deref(), Some("to=bob&amount=5"));

        let req = HttpRequest::get("/");
        assert_eq!(req.query, None);
    }

    #[test]
    fn test_query_param_last_wins() {
        let req = HttpRequest::get("/a?t=first&x=1&t=second");
        assert_eq!(req.query_param("t"), Some("second".to_string()));
        assert_eq!(req.query_param("x"), Some("1".to_string()));
        assert_eq!(req.query_param("missing"), None);
    }

    #[test]
    fn test_form_param_decodes() {
        let req = HttpRequest::post("/a").with_body("note=hello+world&t=a%2Bb&t=c");
        assert_eq!(req.form_param("note"), Some("hello world".to_string()));
        assert_eq!(req.form_param("t"), Some("c".to_string()));
    }

    #[test]
    fn test_json_field() {
        let req = HttpRequest::post("/a").with_body(r#"{"t":"abc","n":5,"o":{}}"#);
        assert_eq!(req.json_field("t"), Some("abc".to_string()));
        assert_eq!(req.json_field("n"), Some("5".to_string()));
        assert_eq!(req.json_field("o"), None);

        let req = HttpRequest::post("/a").with_body("not json");
        assert_eq!(req.json_field("t"), None);
    }

    #[test]
    fn test_url_without_query() {
        let req = HttpRequest::get("/p/q?x=1")
            .with_scheme("https")
            .with_header("Host", "bank.example:8443");
        assert_eq!(req.url_without_query(), "https://bank.example/p/q");
    }

    #[test]
    fn test_env_roundtrip() {
        let mut req = HttpRequest::get("/");
        assert_eq!(req.env_var("k"), None);
        req.set_env("k", "v");
        assert_eq!(req.env_var("k"), Some("v"));
    }

    #[test]
    fn test_html_response() {
        let resp = HttpResponse::html("<p>x</p>");
        assert_eq!(resp.status, 200);
        assert_eq!(resp.headers.content_length(), Some(8));
        assert_eq!(resp.headers.media_type().as_deref(), Some("text/html"));
    }

    #[test]
    fn test_found() {
        let resp = HttpResponse::found("/login");
        assert_eq!(resp.status, 302);
        assert_eq!(resp.headers.get("location"), Some("/login"));
    }
}
