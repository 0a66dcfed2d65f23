//! Request and response types for the HTTP API.

pub mod convert;
