#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

//! Parley server: two-party direct messages with live presence.
//!
//! The messaging core lives in [`services`]: storage traits with Postgres and
//! in-memory implementations, the presence registry, the delivery dispatcher
//! and the messaging service that ties them together. [`server`] assembles the
//! HTTP and WebSocket surface around it.

pub mod app_state;
mod auth;
pub mod db;
mod handlers;
pub mod http;
mod middleware;
pub mod openapi;
mod routes;
pub mod server;
pub mod services;
mod tracer;

pub use app_state::AppState;
pub use services::memory_store::MemoryChatStore;
