// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice,
    dead_code
)]

//! Common test utilities and fixtures shared across test targets
//!
//! Builders for HostedClusters, their control planes and the secrets a
//! reconcile pass reads, plus a [`TestEnv`] wiring a recording client over
//! the `kube_fake_client` API server and a `FakeClock` into a controller
//! `Context`.
//!
//! # Usage
//!
//! ```rust,ignore
//! #[path = "../common/mod.rs"]
//! mod common;
//! use common::*;
//! ```

mod recording;

pub use fixtures::*;
pub use recording::{Action, RecordingClient, Verb};
