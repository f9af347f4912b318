//! Recplay - record/playback HTTP test proxy
//!
//! Captures the outbound HTTP traffic of a test suite into structured
//! recordings and replays it deterministically, with a sanitizer pipeline
//! that keeps secrets and volatile values out of both the stored data and
//! the request matching.

#![deny(unsafe_code)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::field_reassign_with_default,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod error;
pub mod matching;
pub mod network;
pub mod proxy;
pub mod recording;
pub mod sanitize;
pub mod storage;
pub mod store;
pub mod transform;

pub use error::{RecplayError, Result};
pub use proxy::RecordingHandler;
pub use store::RecordingStore;
