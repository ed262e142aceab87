//! Netscope - in-process HTTP traffic recorder
//!
//! Captures the host application's outgoing HTTP exchanges into a bounded
//! in-memory store and serves them to a viewer over a local HTTP and
//! server-sent events API.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::multiple_crate_versions
)]

pub mod capture;
pub mod config;
pub mod error;
pub mod inspector;
pub mod record;
pub mod server;
pub mod store;

pub use capture::{Capture, CapturingClient, Interceptor};
pub use config::Config;
pub use error::{NetscopeError, ObserverError, Result};
pub use inspector::{InitStatus, Inspector};
pub use record::Record;
pub use store::{ObserverId, RecordObserver, RecordStore};
