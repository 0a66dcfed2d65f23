//! HTTP request handlers.
//!
//! - [`convert`]: upload, convert, and stream back the result
//! - [`health`]: constant liveness response
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`], which renders as `{"error": "..."}` with status 500.

pub mod convert;
pub mod health;
