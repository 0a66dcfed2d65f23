//! Headless LibreOffice conversion.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use url::Url;

use super::process::ToolCommand;
use crate::config::LibreOfficeConfig;
use crate::errors::{Error, Result};
use crate::storage::PROFILE_DIR;

pub const TOOL: &str = "LibreOffice";

/// A `--convert-to` argument such as `pdf` or `pdf:writer_pdf_Export`.
///
/// The part before the first `:` is the extension LibreOffice gives the output file. It is
/// lowercased. Filter options after it are passed through as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFormat {
    spec: String,
    extension: String,
}

impl TargetFormat {
    pub fn parse(raw: &str) -> Result<Self> {
        let spec = raw.trim();
        let (extension, filter) = match spec.split_once(':') {
            Some((extension, filter)) => (extension.to_ascii_lowercase(), Some(filter)),
            None => (spec.to_ascii_lowercase(), None),
        };

        if extension.is_empty() {
            return Err(Error::InvalidUpload {
                message: "target_format cannot be empty".to_string(),
            });
        }

        if spec.contains(['/', '\\', '\0']) || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidUpload {
                message: format!("Invalid target_format: {spec:?}"),
            });
        }

        let spec = match filter {
            Some(filter) => format!("{extension}:{filter}"),
            None => extension.clone(),
        };

        Ok(Self { spec, extension })
    }

    pub fn as_str(&self) -> &str {
        &self.spec
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }
}

#[derive(Debug, Clone)]
pub struct OfficeConverter {
    binary: String,
    timeout: Duration,
    isolated_profile: bool,
}

impl OfficeConverter {
    pub fn new(config: &LibreOfficeConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            timeout: config.timeout,
            isolated_profile: config.isolated_profile,
        }
    }

    /// The path LibreOffice writes when converting `input` into `outdir`.
    pub fn expected_output(input: &Path, outdir: &Path, format: &TargetFormat) -> PathBuf {
        let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
        outdir.join(format!("{stem}.{}", format.extension()))
    }

    /// Build `<binary> --headless --convert-to <format> <input> --outdir <outdir>`.
    pub fn command(&self, input: &Path, outdir: &Path, format: &TargetFormat) -> Result<ToolCommand> {
        let mut command = ToolCommand::new(TOOL, &self.binary, self.timeout)
            .arg("--headless")
            .arg("--convert-to")
            .arg(format.as_str())
            .arg(input)
            .arg("--outdir")
            .arg(outdir);

        if self.isolated_profile {
            let profile = std::path::absolute(outdir.parent().unwrap_or(outdir).join(PROFILE_DIR))?;
            let url = Url::from_directory_path(&profile)
                .map_err(|_| anyhow::anyhow!("Cannot build a profile URL for {}", profile.display()))?;
            command = command.arg(format!("-env:UserInstallation={url}"));
        }

        Ok(command)
    }

    /// Convert `input` into `format`, writing the result into `outdir`, and return its path.
    #[instrument(skip(self, cancel), fields(input = %input.display(), format = format.as_str()))]
    pub async fn convert(&self, input: &Path, outdir: &Path, format: &TargetFormat, cancel: &CancellationToken) -> Result<PathBuf> {
        let expected = Self::expected_output(input, outdir, format);
        let output = self.command(input, outdir, format)?.run(cancel).await?;

        if !tokio::fs::try_exists(&expected).await? {
            if let Some(diagnostic) = output.error_diagnostic() {
                warn!(diagnostic, "LibreOffice reported an error but exited successfully");
                return Err(Error::ToolFailed {
                    tool: TOOL,
                    message: diagnostic.to_string(),
                });
            }
            return Err(Error::MissingOutput { expected });
        }

        info!(output = %expected.display(), "LibreOffice conversion complete");
        Ok(expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn converter(binary: &str, isolated_profile: bool) -> OfficeConverter {
        OfficeConverter::new(&LibreOfficeConfig {
            binary: binary.to_string(),
            isolated_profile,
            ..Default::default()
        })
    }

    #[test]
    fn test_parse_target_format() {
        let plain = TargetFormat::parse("pdf").unwrap();
        assert_eq!(plain.as_str(), "pdf");
        assert_eq!(plain.extension(), "pdf");

        let filtered = TargetFormat::parse("pdf:writer_pdf_Export").unwrap();
        assert_eq!(filtered.as_str(), "pdf:writer_pdf_Export");
        assert_eq!(filtered.extension(), "pdf");

        let with_options = TargetFormat::parse(r#"txt:Text (encoded):UTF8"#).unwrap();
        assert_eq!(with_options.extension(), "txt");

        let upper = TargetFormat::parse(" DOCX ").unwrap();
        assert_eq!(upper.extension(), "docx");
        assert_eq!(upper.as_str(), "docx");

        let upper_filtered = TargetFormat::parse("PDF:writer_pdf_Export").unwrap();
        assert_eq!(upper_filtered.as_str(), "pdf:writer_pdf_Export");
    }

    #[test]
    fn test_parse_target_format_rejects_bad_input() {
        for raw in ["", "   ", ":writer_pdf_Export", "../pdf", "pdf/x", "p.df", "pdf\0"] {
            let err = TargetFormat::parse(raw).unwrap_err();
            assert!(matches!(err, Error::InvalidUpload { .. }), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn test_command_arguments() {
        let format = TargetFormat::parse("pdf").unwrap();
        let command = converter("soffice", false)
            .command(Path::new("/scratch/ws/report.docx"), Path::new("/scratch/ws/out"), &format)
            .unwrap();

        assert_eq!(command.tool, TOOL);
        assert_eq!(command.program, "soffice");
        let expected: Vec<OsString> = ["--headless", "--convert-to", "pdf", "/scratch/ws/report.docx", "--outdir", "/scratch/ws/out"]
            .into_iter()
            .map(OsString::from)
            .collect();
        assert_eq!(command.args, expected);
    }

    #[cfg(unix)]
    #[test]
    fn test_isolated_profile_adds_user_installation() {
        let format = TargetFormat::parse("pdf").unwrap();
        let command = converter("libreoffice", true)
            .command(Path::new("/scratch/ws/report.docx"), Path::new("/scratch/ws/out"), &format)
            .unwrap();

        assert_eq!(command.args.len(), 7);
        assert_eq!(
            command.args[6],
            OsString::from("-env:UserInstallation=file:///scratch/ws/lo-profile/")
        );
    }

    #[test]
    fn test_expected_output() {
        let format = TargetFormat::parse("odt").unwrap();
        assert_eq!(
            OfficeConverter::expected_output(Path::new("/a/minutes.v2.docx"), Path::new("/a/out"), &format),
            PathBuf::from("/a/out/minutes.v2.odt")
        );
    }

    #[cfg(unix)]
    mod with_fake_tool {
        use super::*;
        use crate::test_utils::fake_libreoffice;

        async fn run(format: &str) -> (tempfile::TempDir, Result<PathBuf>) {
            let dir = tempfile::tempdir().unwrap();
            let outdir = dir.path().join("out");
            std::fs::create_dir(&outdir).unwrap();
            let input = dir.path().join("letter.docx");
            std::fs::write(&input, b"docx bytes").unwrap();

            let format = TargetFormat::parse(format).unwrap();
            let result = converter(&fake_libreoffice(), false)
                .convert(&input, &outdir, &format, &CancellationToken::new())
                .await;
            (dir, result)
        }

        #[tokio::test]
        async fn test_convert_returns_output_path() {
            let (dir, result) = run("pdf").await;
            let output = result.unwrap();

            assert_eq!(output, dir.path().join("out").join("letter.pdf"));
            assert_eq!(std::fs::read(&output).unwrap(), b"docx bytes");
        }

        #[tokio::test]
        async fn test_nonzero_exit_is_tool_error() {
            let (_dir, result) = run("fail").await;
            let err = result.unwrap_err();

            assert!(err.to_string().starts_with("LibreOffice error: exit status: 1"), "{err}");
        }

        #[tokio::test]
        async fn test_unknown_filter_is_tool_error() {
            let (_dir, result) = run("xyz").await;
            let err = result.unwrap_err();

            assert!(matches!(err, Error::ToolFailed { .. }));
            assert!(err.to_string().starts_with("LibreOffice error: Error: no export filter"), "{err}");
        }

        #[tokio::test]
        async fn test_silent_missing_output_is_conversion_failure() {
            let (dir, result) = run("none").await;
            let err = result.unwrap_err();

            match &err {
                Error::MissingOutput { expected } => assert_eq!(expected, &dir.path().join("out").join("letter.none")),
                other => panic!("unexpected error: {other:?}"),
            }
            assert_eq!(err.to_string(), "Conversion failed");
        }
    }
}
