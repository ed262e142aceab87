//! HTTP client that records every exchange it performs

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use tracing::warn;

use crate::record::{headers_from_map, ResponseSummary};

use super::{buffer_body, Interceptor};

/// Failure of a request sent through [`CapturingClient`]
///
/// Wraps the underlying transport error without altering it.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request could not be sent or no response arrived
    #[error("Request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    /// The response body failed after the headers arrived
    #[error("Failed to read response body: {0}")]
    Body(#[from] hyper::Error),
}

/// HTTP client whose exchanges are captured by an [`Interceptor`]
///
/// Response bodies are buffered in full so the preview and the caller see
/// the same bytes.
#[derive(Clone)]
pub struct CapturingClient {
    client: Client<HttpConnector, Full<Bytes>>,
    interceptor: Interceptor,
}

impl CapturingClient {
    /// Create a new capturing client
    #[must_use]
    pub fn new(interceptor: Interceptor) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build_http();

        Self {
            client,
            interceptor,
        }
    }

    /// Send a request, recording it and its outcome
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response body cannot be
    /// read
    pub async fn request(
        &self,
        request: Request<Full<Bytes>>,
    ) -> Result<Response<Full<Bytes>>, ClientError> {
        let (parts, body) = request.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };

        let capture = self.interceptor.begin(
            parts.method.as_str(),
            &parts.uri.to_string(),
            headers_from_map(&parts.headers),
            Some(&body[..]),
        );

        let request = Request::from_parts(parts, Full::new(body));
        let response = match self.client.request(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Request failed: {e}");
                capture.fail(&e);
                return Err(ClientError::Request(e));
            }
        };

        let (parts, incoming) = response.into_parts();
        let headers = headers_from_map(&parts.headers);
        let status = parts.status.as_u16();

        let (body, body_preview) = buffer_body(incoming, self.interceptor.preview_limit).await;
        let summary = ResponseSummary {
            status,
            headers,
            body_preview,
        };

        match body {
            Ok(bytes) => {
                capture.complete_with(summary);
                Ok(Response::from_parts(parts, Full::new(bytes)))
            }
            Err(e) => {
                warn!("Failed to read response body: {e}");
                capture.fail_with(summary, &e);
                Err(ClientError::Body(e))
            }
        }
    }

    /// Send a GET request
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn get(&self, uri: Uri) -> Result<Response<Full<Bytes>>, ClientError> {
        let mut request = Request::new(Full::new(Bytes::new()));
        *request.uri_mut() = uri;
        self.request(request).await
    }
}
