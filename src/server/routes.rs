//! Request routing for the viewer API

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full};
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONNECTION, CONTENT_TYPE,
};
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, error};

use super::sse::event_stream;
use super::{AppState, ResponseBody};

const TEXT_PLAIN: &str = "text/plain";
const APPLICATION_JSON: &str = "application/json";
const REQUEST_PREFIX: &str = "/request/";

/// Route one viewer request
///
/// Every response carries the permissive CORS headers.
pub(crate) fn handle<B>(request: &Request<B>, state: &AppState) -> Response<ResponseBody> {
    let path = request.uri().path();
    debug!("{} {}", request.method(), path);

    let mut response = match (request.method(), path) {
        (&Method::OPTIONS, _) => empty(StatusCode::NO_CONTENT),
        (&Method::GET, "/requests") => json(StatusCode::OK, &state.store.list()),
        (&Method::GET, "/events") => events(state),
        (&Method::POST, "/clear") => {
            state.store.clear();
            json(StatusCode::OK, &serde_json::json!({ "success": true }))
        }
        (&Method::GET, p) if p.starts_with(REQUEST_PREFIX) => {
            let id = &p[REQUEST_PREFIX.len()..];
            match state.store.get(id) {
                Some(record) => json(StatusCode::OK, &record),
                None => text(StatusCode::NOT_FOUND, "Request not found"),
            }
        }
        _ => text(StatusCode::NOT_FOUND, "Not Found"),
    };

    add_cors_headers(&mut response);
    response
}

fn events(state: &AppState) -> Response<ResponseBody> {
    let mut response = Response::new(event_stream(&state.store, &state.stream));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Response<ResponseBody> {
    match serde_json::to_vec(value) {
        Ok(body) => with_body(status, APPLICATION_JSON, Bytes::from(body)),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn text(status: StatusCode, body: &'static str) -> Response<ResponseBody> {
    with_body(status, TEXT_PLAIN, Bytes::from_static(body.as_bytes()))
}

fn with_body(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<ResponseBody> {
    let mut response = Response::new(Full::new(body).boxed_unsync());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn empty(status: StatusCode) -> Response<ResponseBody> {
    let mut response = Response::new(Empty::new().boxed_unsync());
    *response.status_mut() = status;
    response
}

fn add_cors_headers(response: &mut Response<ResponseBody>) {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use crate::record::{Headers, Record, ResponseSummary};
    use crate::store::RecordStore;
    use std::sync::Arc;

    fn state() -> AppState {
        AppState {
            store: Arc::new(RecordStore::new(10)),
            stream: StreamConfig::default(),
        }
    }

    fn request(method: Method, uri: &str) -> Request<()> {
        Request::builder().method(method).uri(uri).body(()).unwrap()
    }

    async fn body_text(response: Response<ResponseBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn assert_cors(response: &Response<ResponseBody>) {
        let headers = response.headers();
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_METHODS], "GET, POST, OPTIONS");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
    }

    #[tokio::test]
    async fn test_list_then_update_scenario() {
        let state = state();
        let record = Record::pending("1", "GET", "http://x/1", Headers::new(), None, 1000);
        state.store.append(record.clone());

        let response = handle(&request(Method::GET, "/requests"), &state);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], APPLICATION_JSON);
        assert_cors(&response);
        let listed: Vec<Record> = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(listed, vec![record.clone()]);

        state.store.update(record.with_response(
            ResponseSummary {
                status: 200,
                ..ResponseSummary::default()
            },
            50,
        ));

        let response = handle(&request(Method::GET, "/request/1"), &state);
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["statusCode"], 200);
        assert_eq!(json["duration"], 50);
        assert_eq!(json["isCompleted"], true);
    }

    #[tokio::test]
    async fn test_missing_record_is_404() {
        let state = state();
        let response = handle(&request(Method::GET, "/request/nope"), &state);

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_cors(&response);
        assert_eq!(body_text(response).await, "Request not found");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let state = state();
        for (method, uri) in [
            (Method::GET, "/nope"),
            (Method::POST, "/requests"),
            (Method::GET, "/clear"),
            (Method::DELETE, "/request/1"),
        ] {
            let response = handle(&request(method, uri), &state);
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_cors(&response);
            assert_eq!(body_text(response).await, "Not Found");
        }
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let state = state();
        state
            .store
            .append(Record::pending("1", "GET", "http://x", Headers::new(), None, 1));

        for _ in 0..2 {
            let response = handle(&request(Method::POST, "/clear"), &state);
            assert_eq!(response.status(), StatusCode::OK);
            let json: serde_json::Value =
                serde_json::from_str(&body_text(response).await).unwrap();
            assert_eq!(json, serde_json::json!({ "success": true }));
        }

        let response = handle(&request(Method::GET, "/requests"), &state);
        assert_eq!(body_text(response).await, "[]");
    }

    #[tokio::test]
    async fn test_preflight() {
        let state = state();
        let response = handle(&request(Method::OPTIONS, "/clear"), &state);

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_cors(&response);
    }

    #[tokio::test]
    async fn test_events_headers() {
        let state = state();
        let response = handle(&request(Method::GET, "/events"), &state);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/event-stream");
        assert_eq!(response.headers()[CACHE_CONTROL], "no-cache");
        assert_eq!(response.headers()[CONNECTION], "keep-alive");
        assert_cors(&response);
        assert_eq!(state.store.observer_count(), 1);

        drop(response);
        assert_eq!(state.store.observer_count(), 0);
    }
}
