//! Media discovery inside post folders
//!
//! A post folder holds one media file and, optionally, a caption file named
//! [`CAPTION_FILE_NAME`]. Directory entries are always visited in sorted order
//! so repeated scans pick the same file.

use std::path::{Path, PathBuf};

use tracing::warn;

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "webm"];
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
pub const CAPTION_FILE_NAME: &str = "final_caption.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify a file by its extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Image)
        } else {
            None
        }
    }
}

fn sorted_files(folder: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// First image or video file in `folder`, if any
pub fn find_media_file(folder: &Path) -> std::io::Result<Option<PathBuf>> {
    Ok(sorted_files(folder)?
        .into_iter()
        .find(|path| MediaKind::from_path(path).is_some()))
}

/// Every image in `folder`, for album uploads
pub fn list_images(folder: &Path) -> std::io::Result<Vec<PathBuf>> {
    Ok(sorted_files(folder)?
        .into_iter()
        .filter(|path| MediaKind::from_path(path) == Some(MediaKind::Image))
        .collect())
}

/// Caption file in `folder`, if present
pub fn caption_file_in(folder: &Path) -> Option<PathBuf> {
    let path = folder.join(CAPTION_FILE_NAME);
    path.is_file().then_some(path)
}

/// Resolve caption text: inline override, then caption file, then the
/// folder's conventional caption file, then empty.
pub fn resolve_caption(
    caption_override: Option<&str>,
    caption_file: Option<&Path>,
    folder: &Path,
) -> String {
    if let Some(text) = caption_override.filter(|t| !t.trim().is_empty()) {
        return text.to_string();
    }

    let candidate = caption_file
        .filter(|p| p.is_file())
        .map(Path::to_path_buf)
        .or_else(|| caption_file_in(folder));

    match candidate {
        Some(path) => match std::fs::read_to_string(&path) {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(path = %path.display(), "Unreadable caption file, posting without caption: {}", e);
                String::new()
            }
        },
        None => String::new(),
    }
}
