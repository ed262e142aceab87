//! `/events` server-sent event stream
//!
//! Each connection gets its own bounded frame buffer. The store pushes
//! into it from the capturing thread without waiting on the viewer; when
//! a viewer falls behind, the oldest buffered frames are dropped.
//!
//! A new connection subscribes before it snapshots the store, so a record
//! changing in between may be sent twice but is never missed. Snapshot
//! frames go out oldest first.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::config::StreamConfig;
use crate::error::ObserverError;
use crate::record::Record;
use crate::store::{ObserverId, RecordObserver, RecordStore};

use super::ResponseBody;

/// Comment frame sent on idle streams
pub const KEEP_ALIVE_FRAME: &[u8] = b": keep-alive\n\n";

/// Encode a record as one `data:` frame
///
/// # Errors
///
/// Returns error if the record cannot be serialized
pub fn encode_frame(record: &Record) -> serde_json::Result<Bytes> {
    let json = serde_json::to_string(record)?;
    Ok(Bytes::from(format!("data: {json}\n\n")))
}

/// Frames waiting to be written to one connection
struct FrameBuffer {
    frames: Mutex<VecDeque<Bytes>>,
    ready: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl FrameBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            ready: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    fn push(&self, frame: Bytes) {
        let overflow = {
            let mut frames = self.frames.lock();
            frames.push_back(frame);
            let mut overflow = 0;
            while frames.len() > self.capacity {
                frames.pop_front();
                overflow += 1;
            }
            overflow
        };

        if overflow > 0 {
            let total = self.dropped.fetch_add(overflow, Ordering::Relaxed) + overflow;
            warn!("Slow viewer: dropped {} buffered event(s), {} total", overflow, total);
        }

        self.ready.notify_one();
    }

    fn pop(&self) -> Option<Bytes> {
        self.frames.lock().pop_front()
    }
}

/// Store observer feeding one connection's buffer
///
/// Holds the buffer weakly; once the connection is gone it reports
/// itself disconnected and the store drops it.
struct StreamObserver {
    buffer: Weak<FrameBuffer>,
}

impl RecordObserver for StreamObserver {
    fn on_record(&self, record: &Record) -> Result<(), ObserverError> {
        let buffer = self.buffer.upgrade().ok_or(ObserverError::Disconnected)?;
        let frame = encode_frame(record).map_err(|e| ObserverError::Failed(e.to_string()))?;
        buffer.push(frame);
        Ok(())
    }
}

/// Unsubscribes from the store when the connection's body is dropped
struct Subscription {
    store: Arc<RecordStore>,
    id: ObserverId,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.store.unsubscribe(self.id);
        debug!("Event stream {:?} closed", self.id);
    }
}

struct StreamState {
    snapshot: VecDeque<Bytes>,
    buffer: Arc<FrameBuffer>,
    keep_alive: Duration,
    _subscription: Subscription,
}

impl StreamState {
    async fn next_frame(&mut self) -> Bytes {
        if let Some(frame) = self.snapshot.pop_front() {
            return frame;
        }

        loop {
            if let Some(frame) = self.buffer.pop() {
                return frame;
            }

            tokio::select! {
                () = self.buffer.ready.notified() => {}
                () = tokio::time::sleep(self.keep_alive) => {
                    return Bytes::from_static(KEEP_ALIVE_FRAME);
                }
            }
        }
    }
}

/// Open an event stream over `store`
///
/// The returned body yields the current records, then every append and
/// update, until it is dropped.
pub fn event_stream(store: &Arc<RecordStore>, config: &StreamConfig) -> ResponseBody {
    let buffer = Arc::new(FrameBuffer::new(config.buffer_size));
    let id = store.subscribe(Arc::new(StreamObserver {
        buffer: Arc::downgrade(&buffer),
    }));

    let snapshot: VecDeque<Bytes> = store
        .list()
        .iter()
        .rev()
        .filter_map(|record| encode_frame(record).ok())
        .collect();

    debug!(
        "Event stream {:?} opened with {} snapshot record(s)",
        id,
        snapshot.len()
    );

    let state = StreamState {
        snapshot,
        buffer,
        keep_alive: Duration::from_secs(config.keep_alive_secs),
        _subscription: Subscription {
            store: Arc::clone(store),
            id,
        },
    };

    let frames = stream::unfold(state, |mut state| async move {
        let frame = state.next_frame().await;
        Some((Ok::<_, Infallible>(Frame::data(frame)), state))
    });

    StreamBody::new(frames).boxed_unsync()
}
