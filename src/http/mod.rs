//! Client-facing HTTP/JSON API.
//!
//! Each request loads the stack record for `(course, user)`, runs one
//! orchestrator operation on it, and stores it back.

pub mod handlers;
pub mod server;

pub use server::{router, serve_http, serve_listener, AppState};
