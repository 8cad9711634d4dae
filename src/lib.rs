//! pmok - recording proxy that captures live HTTP traffic as JSON mocks
//!
//! Every request is forwarded to a target service; the caller gets the
//! target's answer untouched while a single capture worker persists a copy of
//! each exchange under the project's mock root.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::field_reassign_with_default,
    clippy::multiple_crate_versions
)]

pub mod artifact;
pub mod capture;
pub mod config;
pub mod error;
pub mod exchange;
pub mod logging;
pub mod project;
pub mod proxy;
pub mod server;

pub use error::{RecorderError, Result};
