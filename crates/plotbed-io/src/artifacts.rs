//! Persisted capture artifacts.
//!
//! Each capture cycle writes the raw snapshot and the two annotated
//! overlays so the operator can inspect them before confirming motion.
//! Files are overwritten on every cycle.

use std::path::{Path, PathBuf};

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Errors that can occur when writing artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// Creating a directory or writing a file failed.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Target path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Encoding an image failed (the extension selects the format).
    #[error("failed to encode {path}: {source}")]
    Encode {
        /// Target path.
        path: PathBuf,
        /// Encoder error.
        source: image::ImageError,
    },
}

/// Where the artifacts of a capture cycle go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPaths {
    /// Raw snapshot bytes as received.
    pub snapshot: PathBuf,
    /// Snapshot with detected markers.
    pub markers: PathBuf,
    /// Snapshot with workpiece corners.
    pub corners: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            snapshot: PathBuf::from("images/snapshot.jpg"),
            markers: PathBuf::from("images/markers.png"),
            corners: PathBuf::from("images/corners.png"),
        }
    }
}

fn ensure_parent(path: &Path) -> Result<(), ArtifactError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|source| ArtifactError::Io {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

/// Write raw bytes, creating parent directories.
///
/// # Errors
///
/// Returns [`ArtifactError::Io`] on filesystem failure.
pub fn save_bytes(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    ensure_parent(path)?;
    std::fs::write(path, bytes).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "artifact written");
    Ok(())
}

/// Encode and write an image, creating parent directories. The format
/// follows the file extension.
///
/// # Errors
///
/// Returns [`ArtifactError::Encode`] for unsupported extensions or
/// encoder failures, [`ArtifactError::Io`] for directory failures.
pub fn save_image(path: &Path, image: &RgbaImage) -> Result<(), ArtifactError> {
    ensure_parent(path)?;
    // JPEG has no alpha channel.
    let is_jpeg = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));
    let result = if is_jpeg {
        image::DynamicImage::ImageRgba8(image.clone())
            .to_rgb8()
            .save(path)
    } else {
        image.save(path)
    };
    result.map_err(|source| ArtifactError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "annotated image written");
    Ok(())
}
