//! Frame source backed by image files on disk.
//!
//! Replays every PNG/JPEG/BMP file of a directory in lexical order, wrapping
//! around after the last one.  Used by the CLI for offline runs against
//! recorded camera frames.

use std::path::{Path, PathBuf};

use image::RgbImage;
use panelbot_types::PanelError;
use tracing::debug;

use crate::camera::FrameSource;

const EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Replays image files from a directory as camera frames.
pub struct FileFrameSource {
    id: String,
    files: Vec<PathBuf>,
    next: usize,
}

impl FileFrameSource {
    /// Index the image files in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`PanelError::HardwareFault`] when the directory cannot be
    /// read or holds no image files.
    pub fn open(dir: &Path) -> Result<Self, PanelError> {
        let id = format!("files:{}", dir.display());
        let entries = std::fs::read_dir(dir).map_err(|e| PanelError::HardwareFault {
            component: id.clone(),
            details: e.to_string(),
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .collect();
        files.sort();
        if files.is_empty() {
            return Err(PanelError::HardwareFault {
                component: id,
                details: "directory holds no image files".to_string(),
            });
        }
        Ok(Self { id, files, next: 0 })
    }

    /// Number of indexed image files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for FileFrameSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn capture(&mut self) -> Result<RgbImage, PanelError> {
        let path = &self.files[self.next % self.files.len()];
        self.next += 1;
        debug!(source = %self.id, file = %path.display(), "loading frame");
        let img = image::open(path).map_err(|e| PanelError::HardwareFault {
            component: self.id.clone(),
            details: format!("{}: {e}", path.display()),
        })?;
        Ok(img.to_rgb8())
    }
}
