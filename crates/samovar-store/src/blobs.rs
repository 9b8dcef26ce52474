//! On-disk storage for chat attachments.
//!
//! Files are classified by name into one of four directories next to the
//! JSON collections: `<user>_avatar.png` uploads land with the avatars,
//! everything else goes by extension. Incoming names are reduced to their
//! final path component so a peer cannot escape the blob root.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::info;

use crate::StorageError;

const IMAGE_EXTS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp"];
const VIDEO_EXTS: &[&str] = &["mp4", "avi", "mov", "mkv"];

const IMAGES_DIR: &str = "chat_images";
const VIDEOS_DIR: &str = "chat_videos";
const VOICE_DIR: &str = "voice_messages";
const AVATARS_DIR: &str = "user_avatars";

pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub async fn new(root: &Path) -> Result<Self, StorageError> {
        for dir in [IMAGES_DIR, VIDEOS_DIR, VOICE_DIR, AVATARS_DIR] {
            let path = root.join(dir);
            fs::create_dir_all(&path)
                .await
                .map_err(|source| StorageError::Io { path, source })?;
        }
        info!("blob storage rooted at {}", root.display());
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Directory an attachment lands in. Avatar uploads follow the
    /// `<user>_avatar.png` naming convention; everything else goes by
    /// extension, and anything that is neither an image nor a video is
    /// treated as a voice message.
    fn classify(filename: &str) -> &'static str {
        if filename.ends_with("_avatar.png") {
            return AVATARS_DIR;
        }
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if IMAGE_EXTS.contains(&ext.as_str()) {
            IMAGES_DIR
        } else if VIDEO_EXTS.contains(&ext.as_str()) {
            VIDEOS_DIR
        } else {
            VOICE_DIR
        }
    }

    /// Final on-disk path for an attachment, with the name sanitized to its
    /// last path component.
    pub fn attachment_path(&self, filename: &str) -> PathBuf {
        let name = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());
        self.root.join(Self::classify(&name)).join(name)
    }

    pub async fn save_attachment(
        &self,
        filename: &str,
        data: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let path = self.attachment_path(filename);
        fs::write(&path, data)
            .await
            .map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;
        info!("stored attachment {} ({} bytes)", path.display(), data.len());
        Ok(path)
    }

}
