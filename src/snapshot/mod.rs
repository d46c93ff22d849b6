//!
//! Sources for the photo of the printer the overlays are drawn on
//!

use std::path::{Path, PathBuf};

use image::RgbaImage;
use tracing::warn;

use error::SnapshotError;

pub mod error;

///
/// Something that can produce a photo of the printer. A source gets one bounded attempt per
/// call; callers should surface the failure rather than retry.
///
pub trait SnapshotSource {
    fn fetch(&self) -> Result<RgbaImage, SnapshotError>;
}

///
/// A snapshot stored on disk, e.g. where a webcam grabber writes its latest frame.
///
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    path: PathBuf,
}

impl FileSnapshot {
    pub fn new<P: AsRef<Path>>(path: P) -> FileSnapshot {
        FileSnapshot { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotSource for FileSnapshot {
    fn fetch(&self) -> Result<RgbaImage, SnapshotError> {
        match image::open(&self.path) {
            Ok(photo) => Ok(photo.to_rgba8()),
            Err(err) => {
                warn!("snapshot at {} unavailable: {}", self.path.display(), err);
                Err(SnapshotError::SnapshotUnavailable { source_name: self.path.display().to_string(), reason: err.to_string() })
            }
        }
    }
}

impl SnapshotSource for RgbaImage {
    fn fetch(&self) -> Result<RgbaImage, SnapshotError> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn reads_a_photo_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.png");
        RgbaImage::from_pixel(8, 6, Rgba([10, 20, 30, 255])).save(&path).unwrap();

        let photo = FileSnapshot::new(&path).fetch().unwrap();
        assert_eq!(photo.dimensions(), (8, 6));
        assert_eq!(*photo.get_pixel(3, 3), Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn missing_photo_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileSnapshot::new(dir.path().join("nothing.jpg")).fetch();

        assert!(matches!(result, Err(SnapshotError::SnapshotUnavailable { .. })));
    }

    #[test]
    fn undecodable_photo_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not a jpeg").unwrap();

        assert!(FileSnapshot::new(&path).fetch().is_err());
    }
}
