//! Per-request scratch storage for uploads and conversion outputs.
//!
//! Every request gets its own [`Workspace`]: a uniquely named directory under the configured
//! scratch root. The upload is written into it and the conversion tools write their output into
//! its `out/` subdirectory, so concurrent requests never share a path. The directory and
//! everything in it is removed when the workspace is dropped, whichever way the request ends.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::config::{LimitsConfig, StorageConfig};
use crate::errors::{Error, Result};

const OUTPUT_DIR: &str = "out";

/// Per-workspace LibreOffice user profile, used when `libreoffice.isolated_profile` is set
pub const PROFILE_DIR: &str = "lo-profile";
const FALLBACK_FILENAME: &str = "upload";

/// Allocates workspaces under a scratch root.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
    keep_files: bool,
    max_upload_size: u64,
}

impl Storage {
    pub fn new(storage: &StorageConfig, limits: &LimitsConfig) -> Self {
        Self {
            root: storage.scratch_dir.clone(),
            keep_files: storage.keep_files,
            max_upload_size: limits.max_upload_size,
        }
    }

    /// Create the scratch root if it does not exist yet.
    pub async fn prepare(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a fresh, uniquely named workspace.
    pub fn workspace(&self) -> Result<Workspace> {
        let dir = tempfile::Builder::new().prefix("docconv-").tempdir_in(&self.root)?;
        std::fs::create_dir(dir.path().join(OUTPUT_DIR))?;
        debug!(workspace = %dir.path().display(), "Allocated workspace");

        let (path, guard) = if self.keep_files {
            (dir.keep(), None)
        } else {
            (dir.path().to_path_buf(), Some(dir))
        };

        Ok(Workspace {
            path,
            _guard: guard,
            max_upload_size: self.max_upload_size,
        })
    }
}

/// A request-scoped scratch directory. Removed on drop unless `storage.keep_files` is set.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    _guard: Option<TempDir>,
    max_upload_size: u64,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory the conversion tools write into
    pub fn output_dir(&self) -> PathBuf {
        self.path().join(OUTPUT_DIR)
    }

    /// Where a tool converting `input` to `extension` is expected to leave its result.
    pub fn output_path(&self, input: &Path, extension: &str) -> PathBuf {
        let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or(FALLBACK_FILENAME);
        self.output_dir().join(format!("{stem}.{extension}"))
    }

    /// Write an in-memory upload into the workspace and return its path.
    pub async fn persist(&self, filename: Option<&str>, data: &[u8]) -> Result<PathBuf> {
        self.persist_stream(filename, futures::stream::iter([Ok::<_, std::io::Error>(Bytes::copy_from_slice(data))]))
            .await
    }

    /// Stream an upload into the workspace chunk by chunk and return its path.
    ///
    /// Fails with [`Error::InvalidUpload`] once more than `limits.max_upload_size` bytes arrive
    /// or when the upload stream itself errors.
    #[instrument(skip_all, fields(workspace = %self.path().display()))]
    pub async fn persist_stream<S, E>(&self, filename: Option<&str>, stream: S) -> Result<PathBuf>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: std::fmt::Display,
    {
        let path = self.path().join(sanitize_filename(filename));
        let mut file = tokio::fs::File::create(&path).await?;
        let mut stream = std::pin::pin!(stream);
        let mut total_size = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::InvalidUpload {
                message: format!("Failed to read uploaded file: {e}"),
            })?;

            total_size += chunk.len() as u64;
            if total_size > self.max_upload_size {
                return Err(Error::InvalidUpload {
                    message: format!("File size exceeds maximum allowed size of {} bytes", self.max_upload_size),
                });
            }

            file.write_all(&chunk).await?;
        }

        file.flush().await?;
        debug!(path = %path.display(), total_size, "Persisted upload");
        Ok(path)
    }
}

/// Reduce a client-supplied filename to a safe basename inside the workspace.
pub fn sanitize_filename(filename: Option<&str>) -> String {
    let name = filename
        .map(|f| f.rsplit(['/', '\\']).next().unwrap_or_default())
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>();
    let name = name.trim();

    if name.is_empty() || name == "." || name == ".." || name == OUTPUT_DIR || name == PROFILE_DIR {
        FALLBACK_FILENAME.to_string()
    } else {
        name.to_string()
    }
}
