//! Image remix service: accepts an uploaded image and a prompt, forwards both
//! to a Gemini image model and serves back what the model produced.
//!
//! Uploads are normalized before the call; results get the upload's
//! transparency reapplied and blank images are rejected.

pub mod config;
pub mod error;
pub mod imaging;
pub mod model;
pub mod server;
pub mod storage;

pub use error::{Error, Result};
