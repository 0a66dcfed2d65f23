use axum::{
    body::Body,
    extract::{
        Multipart, Query, State,
        multipart::MultipartRejection,
        rejection::QueryRejection,
    },
    http::{HeaderName, HeaderValue, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, instrument};

use crate::AppState;
use crate::api::models::convert::ConvertQuery;
use crate::convert::{TargetFormat, office, pdf};
use crate::errors::{Error, Result};
use crate::metrics::record_conversion;
use crate::storage::Workspace;

/// Name the PDF upload is stored under, whatever the client called it
const PDF_INPUT_NAME: &str = "input.pdf";

/// Download name of every PDF to DOCX result
const DOCX_DOWNLOAD_NAME: &str = "converted.docx";

/// A multipart upload staged in a workspace.
#[derive(Debug)]
struct Upload {
    path: PathBuf,
    filename: Option<String>,
    target_format: Option<String>,
}

/// Drain the multipart body: stream the `file` field into `workspace` (under `stored_name`, or
/// the client's filename when `None`) and pick up a `target_format` field if present.
async fn receive_upload(multipart: &mut Multipart, workspace: &Workspace, stored_name: Option<&str>) -> Result<Upload> {
    let mut upload: Option<(PathBuf, Option<String>)> = None;
    let mut target_format: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| Error::InvalidUpload {
        message: format!("Failed to parse multipart data: {e}"),
    })? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                let filename = field.file_name().map(|s| s.to_string());
                let name = stored_name.or(filename.as_deref());
                let path = workspace.persist_stream(name, field).await?;
                upload = Some((path, filename));
            }
            "target_format" => {
                target_format = Some(field.text().await.map_err(|e| Error::InvalidUpload {
                    message: format!("Failed to read target_format: {e}"),
                })?);
            }
            other => {
                debug!(field = other, "Ignoring unknown multipart field");
            }
        }
    }

    let (path, filename) = upload.ok_or_else(|| Error::InvalidUpload {
        message: "Missing multipart field 'file'".to_string(),
    })?;

    Ok(Upload {
        path,
        filename,
        target_format,
    })
}

/// `Content-Disposition` for a download, with an RFC 5987 form for non-ASCII names.
fn content_disposition(filename: &str) -> String {
    if filename.is_ascii() {
        let escaped = filename.replace('\\', "\\\\").replace('"', "\\\"");
        format!("attachment; filename=\"{escaped}\"")
    } else {
        let encoded: String = filename
            .bytes()
            .map(|b| match b {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'!' | b'#' | b'$' | b'&' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~' => {
                    (b as char).to_string()
                }
                _ => format!("%{b:02X}"),
            })
            .collect();
        format!("attachment; filename*=UTF-8''{encoded}")
    }
}

/// Stream `path` back to the client. The workspace rides along with the body and is removed
/// once the body has been sent or dropped.
async fn file_response(workspace: Workspace, path: &Path, content_type: &str, filename: &str) -> Result<Response> {
    let file = tokio::fs::File::open(path).await?;
    let length = file.metadata().await?.len();

    let stream = ReaderStream::new(file).map(move |chunk| {
        let _workspace = &workspace;
        chunk
    });

    let headers: [(HeaderName, HeaderValue); 3] = [
        (header::CONTENT_TYPE, HeaderValue::from_str(content_type).map_err(anyhow::Error::from)?),
        (header::CONTENT_LENGTH, HeaderValue::from(length)),
        (
            header::CONTENT_DISPOSITION,
            HeaderValue::from_str(&content_disposition(filename)).map_err(anyhow::Error::from)?,
        ),
    ];

    Ok((headers, Body::from_stream(stream)).into_response())
}

#[utoipa::path(
    post,
    path = "/convert/pdf2docx",
    tag = "convert",
    summary = "Convert PDF to DOCX",
    description = "Converts every page of the uploaded PDF into a Word document.",
    request_body(
        content_type = "multipart/form-data",
        content = crate::api::models::convert::ConvertUpload,
        description = "The PDF in the `file` field"
    ),
    responses(
        (status = 200, description = "The converted document, named converted.docx",
            content_type = "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        (status = 500, description = "Upload, tool, or conversion failure", body = crate::api::models::convert::ErrorResponse),
    )
)]
#[instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn pdf_to_docx(State(state): State<AppState>, multipart: std::result::Result<Multipart, MultipartRejection>) -> Result<Response> {
    let mut multipart = multipart?;
    let workspace = state.storage.workspace()?;
    let upload = receive_upload(&mut multipart, &workspace, Some(PDF_INPUT_NAME)).await?;
    info!(filename = ?upload.filename, "Received PDF for conversion");

    pdf::ensure_pdf(&upload.path).await?;

    let output = workspace.output_path(&upload.path, "docx");
    let started = Instant::now();
    let result = state.pdf.convert(&upload.path, &output, &state.shutdown).await;
    record_conversion(pdf::TOOL, started, &result);
    let output = result?;

    file_response(workspace, &output, pdf::DOCX_CONTENT_TYPE, DOCX_DOWNLOAD_NAME).await
}

#[utoipa::path(
    post,
    path = "/convert/libreoffice/",
    tag = "convert",
    summary = "Convert with LibreOffice",
    description = "Converts the uploaded document with headless LibreOffice (DOCX to PDF, XLSX to PDF, ...).
The result is named after the upload with the target extension.",
    params(ConvertQuery),
    request_body(
        content_type = "multipart/form-data",
        content = crate::api::models::convert::ConvertUpload,
        description = "The document in the `file` field, optionally a `target_format` field"
    ),
    responses(
        (status = 200, description = "The converted document"),
        (status = 500, description = "Upload, tool, or conversion failure", body = crate::api::models::convert::ErrorResponse),
    )
)]
#[instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn libreoffice(
    State(state): State<AppState>,
    query: std::result::Result<Query<ConvertQuery>, QueryRejection>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    let Query(query) = query?;
    let mut multipart = multipart?;
    let workspace = state.storage.workspace()?;
    let upload = receive_upload(&mut multipart, &workspace, None).await?;

    let requested = upload
        .target_format
        .or(query.target_format)
        .unwrap_or_else(|| state.config.libreoffice.default_target_format.clone());
    let format = TargetFormat::parse(&requested)?;
    info!(filename = ?upload.filename, format = format.as_str(), "Received document for conversion");

    let started = Instant::now();
    let result = state
        .office
        .convert(&upload.path, &workspace.output_dir(), &format, &state.shutdown)
        .await;
    record_conversion(office::TOOL, started, &result);
    let output = result?;

    let filename = output
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("converted.{}", format.extension()));
    let content_type = mime_guess::from_path(&output).first_or_octet_stream();

    file_response(workspace, &output, content_type.as_ref(), &filename).await
}
