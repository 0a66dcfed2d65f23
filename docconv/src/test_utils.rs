//! Test utilities: a configured test server and stand-ins for the external tools.
//!
//! The fake tools are tiny shell scripts honouring the same command lines as the real ones, so
//! tests exercise the real process plumbing without LibreOffice or pdf2docx installed.

use axum_test::TestServer;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use crate::config::{Config, LibreOfficeConfig, Pdf2DocxConfig, StorageConfig};

/// `fake-libreoffice --headless --convert-to FMT INPUT --outdir DIR [-env:...]`
///
/// Copies INPUT to `DIR/<stem>.<ext>`. Special formats: `fail` exits 1, `none` exits 0 without
/// output, `slow` hangs; anything outside pdf/txt/odt/docx mimics LibreOffice's
/// "no export filter" diagnostic while exiting 0.
const FAKE_LIBREOFFICE: &str = r#"#!/bin/sh
[ "$1" = "--headless" ] || { echo "expected --headless first" >&2; exit 2; }
fmt="$3"; input="$4"; outdir="$6"
ext="${fmt%%:*}"
case "$ext" in
  pdf|txt|odt|docx) ;;
  fail) echo "source file could not be loaded" >&2; exit 1 ;;
  none) exit 0 ;;
  slow) exec sleep 30 ;;
  *) echo "Error: no export filter for $input found, aborting." >&2; exit 0 ;;
esac
name=$(basename "$input")
stem="${name%.*}"
cp "$input" "$outdir/$stem.$ext"
"#;

/// `fake-pdf2docx convert INPUT OUTPUT --start 0`
///
/// Writes a zip-looking DOCX that embeds the input. Inputs containing `BROKEN` fail, inputs
/// containing `SILENT` exit 0 without output.
const FAKE_PDF2DOCX: &str = r#"#!/bin/sh
[ "$1" = "convert" ] || { echo "expected convert subcommand" >&2; exit 2; }
if grep -q BROKEN "$2"; then echo "Traceback: damaged xref table" >&2; exit 1; fi
if grep -q SILENT "$2"; then exit 0; fi
printf 'PK\003\004' > "$3"
cat "$2" >> "$3"
"#;

/// Scripts are written once per test process, so no test executes a file another thread still
/// has open for writing.
static FAKE_TOOLS: LazyLock<tempfile::TempDir> = LazyLock::new(|| {
    let dir = tempfile::Builder::new()
        .prefix("docconv-fake-tools-")
        .tempdir()
        .expect("Failed to create fake tool directory");
    write_script(&dir.path().join("fake-libreoffice"), FAKE_LIBREOFFICE);
    write_script(&dir.path().join("fake-pdf2docx"), FAKE_PDF2DOCX);
    dir
});

fn write_script(path: &Path, contents: &str) {
    std::fs::write(path, contents).expect("Failed to write fake tool");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).expect("Failed to make fake tool executable");
    }
}

pub fn fake_libreoffice() -> String {
    FAKE_TOOLS.path().join("fake-libreoffice").to_string_lossy().into_owned()
}

pub fn fake_pdf2docx() -> String {
    FAKE_TOOLS.path().join("fake-pdf2docx").to_string_lossy().into_owned()
}

/// Config pointing at the fake tools, with workspaces under `scratch_dir`.
pub fn create_test_config(scratch_dir: &Path) -> Config {
    Config {
        storage: StorageConfig {
            scratch_dir: scratch_dir.to_path_buf(),
            keep_files: false,
        },
        libreoffice: LibreOfficeConfig {
            binary: fake_libreoffice(),
            timeout: Duration::from_secs(2),
            ..Default::default()
        },
        pdf2docx: Pdf2DocxConfig {
            binary: fake_pdf2docx(),
            timeout: Duration::from_secs(2),
        },
        ..Default::default()
    }
}

pub async fn create_test_app(config: Config) -> TestServer {
    crate::Application::new(config)
        .await
        .expect("Failed to create application")
        .into_test_server()
}

/// Workspaces currently present under the scratch root
pub fn workspaces_in(scratch_dir: &Path) -> usize {
    std::fs::read_dir(scratch_dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().starts_with("docconv-"))
                .count()
        })
        .unwrap_or(0)
}
