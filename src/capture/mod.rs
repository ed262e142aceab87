//! Capture of outgoing exchanges into the record store
//!
//! A capture is two store operations around the host's real exchange: a
//! pending record is appended before the request goes out, and the same
//! record is replaced once the outcome is known. The host's result is
//! always handed back untouched.

mod client;

pub use client::{CapturingClient, ClientError};

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::{Request, Response};
use tracing::debug;
use uuid::Uuid;

use crate::config::DEFAULT_BODY_PREVIEW_LIMIT;
use crate::record::{body_preview, headers_from_map, Headers, Record, ResponseSummary};
use crate::store::RecordStore;

/// Wall clock in milliseconds that never runs backwards between captures
///
/// Shared by every interceptor of one inspector.
#[derive(Debug, Default)]
pub(crate) struct CaptureClock {
    last: AtomicU64,
}

impl CaptureClock {
    pub(crate) fn now_millis(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let previous = self.last.fetch_max(now, Ordering::Relaxed);
        previous.max(now)
    }

    #[cfg(test)]
    pub(crate) fn advance_to(&self, millis: u64) {
        self.last.fetch_max(millis, Ordering::Relaxed);
    }
}

/// Creates and completes records for outgoing exchanges
///
/// Cheap to clone; every clone feeds the same store. While the owning
/// inspector is stopped `begin` records nothing; captures begun before a
/// stop still complete.
#[derive(Clone)]
pub struct Interceptor {
    store: Arc<RecordStore>,
    active: Arc<AtomicBool>,
    clock: Arc<CaptureClock>,
    preview_limit: usize,
}

impl Interceptor {
    /// Create an interceptor that is always active
    #[must_use]
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self::with_gate(
            store,
            Arc::new(AtomicBool::new(true)),
            Arc::new(CaptureClock::default()),
            DEFAULT_BODY_PREVIEW_LIMIT,
        )
    }

    pub(crate) fn with_gate(
        store: Arc<RecordStore>,
        active: Arc<AtomicBool>,
        clock: Arc<CaptureClock>,
        preview_limit: usize,
    ) -> Self {
        Self {
            store,
            active,
            clock,
            preview_limit,
        }
    }

    /// Whether captures are currently recorded
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Record a request that is about to be sent
    ///
    /// Appends a pending record and returns the handle used to complete it.
    #[must_use]
    pub fn begin(
        &self,
        method: &str,
        url: &str,
        headers: Headers,
        body: Option<&[u8]>,
    ) -> Capture {
        let started = Instant::now();

        if !self.is_active() {
            return Capture {
                interceptor: self.clone(),
                record: None,
                started,
            };
        }

        let record = Record::pending(
            Uuid::new_v4().to_string(),
            method,
            url,
            headers,
            body.and_then(|b| body_preview(b, self.preview_limit)),
            self.clock.now_millis(),
        );

        debug!("Capture {} started: {} {}", record.id, record.method, record.url);
        self.store.append(record.clone());

        Capture {
            interceptor: self.clone(),
            record: Some(record),
            started,
        }
    }

    /// Capture an exchange performed by `send`
    ///
    /// `send` receives the request unchanged. Its result, success or
    /// error, is returned exactly as produced.
    ///
    /// # Errors
    ///
    /// Returns whatever error `send` returns.
    pub async fn intercept<F, Fut, E>(
        &self,
        request: Request<Bytes>,
        send: F,
    ) -> Result<Response<Bytes>, E>
    where
        F: FnOnce(Request<Bytes>) -> Fut,
        Fut: Future<Output = Result<Response<Bytes>, E>>,
        E: Display,
    {
        let capture = self.begin(
            request.method().as_str(),
            &request.uri().to_string(),
            headers_from_map(request.headers()),
            Some(&request.body()[..]),
        );

        match send(request).await {
            Ok(response) => {
                capture.complete(
                    response.status().as_u16(),
                    headers_from_map(response.headers()),
                    Some(&response.body()[..]),
                );
                Ok(response)
            }
            Err(e) => {
                capture.fail(&e);
                Err(e)
            }
        }
    }

    fn preview(&self, body: Option<&[u8]>) -> Option<String> {
        body.and_then(|b| body_preview(b, self.preview_limit))
    }
}

/// An in-flight capture
///
/// Consumed by exactly one of the completion methods. Dropping it without
/// completing leaves the record pending.
pub struct Capture {
    interceptor: Interceptor,
    record: Option<Record>,
    started: Instant,
}

impl Capture {
    /// Id of the pending record, if capture was active
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.record.as_ref().map(|r| r.id.as_str())
    }

    /// Complete with a response
    pub fn complete(self, status: u16, headers: Headers, body: Option<&[u8]>) {
        let body_preview = self.interceptor.preview(body);
        self.complete_with(ResponseSummary {
            status,
            headers,
            body_preview,
        });
    }

    /// Complete with an already built response summary
    pub fn complete_with(self, response: ResponseSummary) {
        let duration = self.elapsed_millis();
        self.finish(|record| record.with_response(response, duration));
    }

    /// Complete with a transport error
    pub fn fail(self, error: &impl Display) {
        let duration = self.elapsed_millis();
        let message = error.to_string();
        self.finish(|record| record.with_error(message, duration));
    }

    /// Complete with a response whose body failed mid-transfer
    pub fn fail_with(self, response: ResponseSummary, error: &impl Display) {
        let duration = self.elapsed_millis();
        let message = error.to_string();
        self.finish(|record| {
            record
                .with_response(response, duration)
                .with_error(message, duration)
        });
    }

    fn elapsed_millis(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn finish(self, build: impl FnOnce(&Record) -> Record) {
        let Some(pending) = self.record else {
            return;
        };

        let done = build(&pending);
        debug!(
            "Capture {} completed in {:?} ms (status {:?})",
            done.id, done.duration_millis, done.status_code
        );
        self.interceptor.store.update(done);
    }
}

/// Buffer a body so it can be both previewed and passed on
///
/// A read failure yields a placeholder preview instead of aborting the
/// capture; the error is still returned for the caller to surface.
pub async fn buffer_body<B>(body: B, limit: usize) -> (Result<Bytes, B::Error>, Option<String>)
where
    B: hyper::body::Body,
    B::Error: Display,
{
    match body.collect().await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            let preview = body_preview(&bytes, limit);
            (Ok(bytes), preview)
        }
        Err(e) => {
            let placeholder = format!("Error reading body: {e}");
            (Err(e), Some(placeholder))
        }
    }
}
