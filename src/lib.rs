//! labsync
//!
//! Catalog synchronization and optimistic-update engine for a laboratory inventory
//! and service-request console.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod cache;
pub mod client;
pub mod config;
pub mod errors;
pub mod events;
pub mod models;
pub mod search;
pub mod services;
pub mod sync;

pub use errors::{ServiceError, ServiceResult};
