//! vidforge — a batch media conversion and merge service.
//!
//! Clients submit a set of media files plus an action; each job runs a
//! convert → normalize → merge → archive pipeline on its own background
//! task while clients poll for progress and retrieve artifact links. The
//! actual encoding is delegated to ffmpeg through the [`media`] boundary.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod media;
pub mod pipeline;
pub mod utils;

pub use error::{Error, Result};
