//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! # API Structure
//!
//! - `GET /health`: liveness check
//! - `POST /convert/pdf2docx`: PDF to DOCX
//! - `POST /convert/libreoffice/`: any format LibreOffice can export
//!
//! All endpoints are documented with `utoipa`; the reference is served at `/docs`.

pub mod handlers;
pub mod models;
