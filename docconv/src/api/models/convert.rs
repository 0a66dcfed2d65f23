use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Query parameters for the LibreOffice conversion endpoint
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ConvertQuery {
    /// LibreOffice `--convert-to` argument, e.g. `pdf` or `pdf:writer_pdf_Export`.
    /// A `target_format` form field takes precedence. Default: `pdf`
    pub target_format: Option<String>,
}

/// Multipart body accepted by the conversion endpoints (documentation only)
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct ConvertUpload {
    /// The document to convert
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    /// LibreOffice endpoint only: target format, overrides the query parameter
    pub target_format: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Body of every failed conversion
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
