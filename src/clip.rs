//! Output clip file management.
//!
//! Clip paths use a time-based unique suffix under the configured save
//! directory; uniqueness per recording attempt is guaranteed by creating the
//! file eagerly with `create_new`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// MIME type of every produced clip.
pub const CLIP_MIME: &str = "video/mp4";

const CLIP_EXTENSION: &str = "mp4";

/// Platform default save location when the host configures none.
pub fn default_save_dir() -> PathBuf {
    dirs::video_dir()
        .or_else(dirs::download_dir)
        .unwrap_or_else(std::env::temp_dir)
}

/// Reserve a fresh output path for one recording attempt.
///
/// The save directory is created if needed and the clip file is created
/// empty, so a concurrent attempt can never be handed the same path.
pub fn new_clip_path(save_dir: Option<&Path>) -> io::Result<PathBuf> {
    let dir = save_dir.map(Path::to_path_buf).unwrap_or_else(default_save_dir);
    fs::create_dir_all(&dir)?;

    loop {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let candidate = dir.join(format!(
            "clip_{}_{:04x}.{}",
            timestamp,
            rand::random::<u16>(),
            CLIP_EXTENSION
        ));
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Delete a clip, tolerating one that never made it to disk.
pub fn delete_clip(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
