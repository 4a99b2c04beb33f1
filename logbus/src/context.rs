//! Request context snapshots
//!
//! A [`RequestContext`] captures the parts of an inbound request that every
//! log record carries: path, method, headers, client address and user agent.
//! It is taken from the live request in the handler and never reused across
//! requests.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Method};

/// Snapshot of the request a log record is about
#[derive(Debug, Clone)]
pub struct RequestContext {
    path: String,
    method: Method,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
}

impl RequestContext {
    /// Create a context for the given method and path with no headers
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            headers: HeaderMap::new(),
            remote_addr: None,
        }
    }

    /// Build a context from request parts
    ///
    /// The peer address is read from axum's `ConnectInfo<SocketAddr>`
    /// extension, which is present when the server was started with
    /// `into_make_service_with_connect_info`.
    pub fn from_parts(parts: &Parts) -> Self {
        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Self {
            path: parts.uri.path().to_string(),
            method: parts.method.clone(),
            headers: parts.headers.clone(),
            remote_addr,
        }
    }

    /// Replace the headers
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Append a header value, keeping earlier values for the same name
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set the peer address
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Request path (without query string)
    pub fn path(&self) -> &str {
        &self.path
    }

    /// HTTP method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Raw header map
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Peer socket address, if known
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// `User-Agent` header value, if present and valid UTF-8
    pub fn user_agent(&self) -> Option<&str> {
        self.headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
    }

    /// Client IP address
    ///
    /// Prefers the first hop of `X-Forwarded-For`, then `X-Real-IP`, then the
    /// peer address of the connection.
    pub fn client_ip(&self) -> Option<String> {
        self.headers
            .get("x-forwarded-for")
            .or_else(|| self.headers.get("x-real-ip"))
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| self.remote_addr.map(|addr| addr.ip().to_string()))
    }

    /// Headers flattened to one value per name, see [`flatten_headers`]
    pub fn flattened_headers(&self) -> HashMap<String, String> {
        flatten_headers(&self.headers)
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

/// Flatten a multi-valued header map into one value per header name
///
/// When a name carries several values the last one wins. Names are written in
/// canonical MIME form (`content-type` becomes `Content-Type`). Values that are
/// not valid UTF-8 are converted lossily.
pub fn flatten_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut flattened = HashMap::with_capacity(headers.keys_len());
    for (name, value) in headers {
        flattened.insert(
            canonical_header_name(name.as_str()),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
        );
    }
    flattened
}

/// Canonical MIME form of a header name: each dash-separated word capitalised
pub fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::get, Router};
    use http::{Request, StatusCode};
    use tower::ServiceExt;

    #[test]
    fn test_flatten_headers_last_value_wins() {
        let mut headers = HeaderMap::new();
        headers.append("x-a", HeaderValue::from_static("1"));
        headers.append("x-a", HeaderValue::from_static("2"));
        headers.insert("accept", HeaderValue::from_static("application/json"));

        let flattened = flatten_headers(&headers);

        assert_eq!(flattened.len(), 2);
        assert_eq!(flattened.get("X-A").map(String::as_str), Some("2"));
        assert_eq!(
            flattened.get("Accept").map(String::as_str),
            Some("application/json")
        );
    }

    #[test]
    fn test_flatten_headers_lossy_values() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-binary",
            HeaderValue::from_bytes(&[b'o', b'k', 0xff]).unwrap(),
        );

        let flattened = flatten_headers(&headers);
        assert_eq!(flattened.get("X-Binary").map(String::as_str), Some("ok\u{fffd}"));
    }

    #[test]
    fn test_canonical_header_name() {
        assert_eq!(canonical_header_name("x-request-id"), "X-Request-Id");
        assert_eq!(canonical_header_name("user-agent"), "User-Agent");
        assert_eq!(canonical_header_name("accept"), "Accept");
        assert_eq!(canonical_header_name("x--a"), "X--A");
    }

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let ctx = RequestContext::new(Method::GET, "/users")
            .with_remote_addr("10.0.0.5:51234".parse().unwrap())
            .with_header(
                HeaderName::from_static("x-forwarded-for"),
                HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
            );
        assert_eq!(ctx.client_ip().as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_client_ip_falls_back_to_peer() {
        let ctx = RequestContext::new(Method::GET, "/users")
            .with_remote_addr("10.0.0.5:51234".parse().unwrap());
        assert_eq!(ctx.client_ip().as_deref(), Some("10.0.0.5"));

        let ctx = RequestContext::new(Method::GET, "/users");
        assert!(ctx.client_ip().is_none());
    }

    #[test]
    fn test_from_parts() {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri("/orders?expand=items")
            .header("user-agent", "curl/8.0")
            .body(())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("192.0.2.10:4000".parse().unwrap()));
        let (parts, _) = request.into_parts();

        let ctx = RequestContext::from_parts(&parts);
        assert_eq!(ctx.path(), "/orders");
        assert_eq!(ctx.method(), Method::POST);
        assert_eq!(ctx.user_agent(), Some("curl/8.0"));
        assert_eq!(ctx.client_ip().as_deref(), Some("192.0.2.10"));
    }

    #[tokio::test]
    async fn test_extractor_in_handler() {
        async fn handler(ctx: RequestContext) -> String {
            format!("{} {}", ctx.method(), ctx.path())
        }

        let app = Router::new().route("/orders/{id}", get(handler));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/orders/42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"GET /orders/42");
    }
}
