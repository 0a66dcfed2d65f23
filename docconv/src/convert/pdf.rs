//! PDF to DOCX conversion through the `pdf2docx` command-line tool.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::process::ToolCommand;
use crate::config::Pdf2DocxConfig;
use crate::errors::{Error, Result};

pub const TOOL: &str = "pdf2docx";

pub const DOCX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Readers accept the header anywhere in the first KiB of the file.
const HEADER_WINDOW: u64 = 1024;

/// Whether `prefix` (the start of a file) carries a PDF header.
pub fn has_pdf_header(prefix: &[u8]) -> bool {
    prefix.windows(PDF_MAGIC.len()).any(|window| window == PDF_MAGIC)
}

/// Reject uploads that are not PDFs before spending a tool run on them.
pub async fn ensure_pdf(path: &Path) -> Result<()> {
    let mut prefix = Vec::with_capacity(HEADER_WINDOW as usize);
    tokio::fs::File::open(path).await?.take(HEADER_WINDOW).read_to_end(&mut prefix).await?;

    if has_pdf_header(&prefix) {
        Ok(())
    } else {
        Err(Error::InvalidUpload {
            message: "Uploaded file is not a PDF document".to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct PdfConverter {
    binary: String,
    timeout: Duration,
}

impl PdfConverter {
    pub fn new(config: &Pdf2DocxConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            timeout: config.timeout,
        }
    }

    /// Build `<binary> convert <input> <output> --start 0`, i.e. the full page range.
    pub fn command(&self, input: &Path, output: &Path) -> ToolCommand {
        ToolCommand::new(TOOL, &self.binary, self.timeout)
            .arg("convert")
            .arg(input)
            .arg(output)
            .arg("--start")
            .arg("0")
    }

    /// Convert the PDF at `input` into a DOCX at `output`.
    ///
    /// The output must exist afterwards, even when the tool reports success.
    #[instrument(skip(self, cancel), fields(input = %input.display()))]
    pub async fn convert(&self, input: &Path, output: &Path, cancel: &CancellationToken) -> Result<PathBuf> {
        self.command(input, output).run(cancel).await?;

        if !tokio::fs::try_exists(output).await? {
            return Err(Error::MissingOutput {
                expected: output.to_path_buf(),
            });
        }

        info!(output = %output.display(), "PDF conversion complete");
        Ok(output.to_path_buf())
    }
}
