//! Image sources.

use std::path::{Path, PathBuf};

use crate::transport::{Transport, TransportError};

/// Default MJPG-streamer snapshot path on an OctoPrint host.
pub const DEFAULT_SNAPSHOT_PATH: &str = "/webcam/?action=snapshot";

/// Errors from capturing an image.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The snapshot request did not complete.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The camera answered with an error status.
    #[error("snapshot failed with HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The camera returned no data.
    #[error("snapshot was empty")]
    Empty,

    /// Reading an image file failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Image file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Something that produces encoded images on demand.
pub trait ImageSource {
    /// Capture one encoded image (JPEG, PNG, ...).
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError`] if no image could be obtained.
    fn capture(&self) -> Result<Vec<u8>, CaptureError>;
}

/// Webcam snapshot over HTTP.
#[derive(Debug)]
pub struct SnapshotCamera<T> {
    transport: T,
    path: String,
}

impl<T: Transport> SnapshotCamera<T> {
    /// Snapshot camera at `path` on the transport's server.
    pub fn new(transport: T, path: &str) -> Self {
        Self {
            transport,
            path: path.to_owned(),
        }
    }
}

impl<T: Transport> ImageSource for SnapshotCamera<T> {
    fn capture(&self) -> Result<Vec<u8>, CaptureError> {
        let response = self.transport.get(&self.path)?;
        if !response.is_success() {
            return Err(CaptureError::Status {
                status: response.status,
            });
        }
        if response.body.is_empty() {
            return Err(CaptureError::Empty);
        }
        tracing::debug!(bytes = response.body.len(), "snapshot captured");
        Ok(response.body)
    }
}

/// Reads the same image file on every capture. Used for offline runs.
#[derive(Debug, Clone)]
pub struct FileImageSource {
    path: PathBuf,
}

impl FileImageSource {
    /// Source backed by `path`.
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl ImageSource for FileImageSource {
    fn capture(&self) -> Result<Vec<u8>, CaptureError> {
        let bytes = std::fs::read(&self.path).map_err(|source| CaptureError::Io {
            path: self.path.clone(),
            source,
        })?;
        if bytes.is_empty() {
            return Err(CaptureError::Empty);
        }
        Ok(bytes)
    }
}
