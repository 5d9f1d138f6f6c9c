//! HTTP server for Merit

pub mod http;

pub use http::{run, AppState};
