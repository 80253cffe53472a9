//! HTTP API: job submission, status polling, artifact serving.

pub mod error;
pub mod routes;
pub mod server;
