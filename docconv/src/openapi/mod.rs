//! OpenAPI documentation for the conversion API.
//!
//! The document is served at `/api-docs/openapi.json` and rendered at `/docs`.

use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "docconv",
        description = "Upload a document, get it back converted. PDF to DOCX goes through pdf2docx; \
                       everything else through headless LibreOffice."
    ),
    paths(
        api::handlers::health::health,
        api::handlers::convert::pdf_to_docx,
        api::handlers::convert::libreoffice,
    ),
    components(schemas(
        api::models::convert::HealthResponse,
        api::models::convert::ErrorResponse,
        api::models::convert::ConvertUpload,
    )),
    tags(
        (name = "health", description = "Liveness"),
        (name = "convert", description = "Document conversion"),
    )
)]
pub struct ApiDoc;
