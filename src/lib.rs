//! `MockNet` - HTTP stub server with a REST control plane
//!
//! Stubs are matched in registration order and served verbatim. While a
//! recording is active, traffic is forwarded to a target and every exchange
//! is captured as a stub, with JSON bodies persisted by endpoint key.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::multiple_crate_versions
)]

pub mod app;
pub mod catalog;
pub mod config;
pub mod error;
pub mod matcher;
pub mod network;
pub mod recording;
pub mod registry;
pub mod storage;
pub mod stub;
pub mod synthesizer;

pub use app::MockNet;
pub use error::{MockError, Result};
