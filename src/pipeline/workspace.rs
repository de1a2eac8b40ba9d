//! On-disk layout of one track's files.
//!
//! Unlike scratch space, the workspace outlives the run: produced stems stay
//! where a resumed run expects to find them.
//!
//! ```text
//! <work_dir>/<track id>/
//!     source/                  acquired audio
//!     separation/<model>_<device>/
//!     stems/<stem>.mp3         normalized deliverables
//!     tmp/                     mixes before normalization
//!     assets/                  backgrounds, overlays, icons
//!     videos/<channel>/<stem>.mp4
//! ```

use std::path::{Path, PathBuf};

use stemforge_common::paths::sanitize_file_name;
use stemforge_common::{StemType, TrackId};

#[derive(Debug, Clone)]
pub struct TrackWorkspace {
    root: PathBuf,
}

impl TrackWorkspace {
    pub fn new(work_dir: &Path, track_id: &TrackId) -> Self {
        Self {
            root: work_dir.join(sanitize_file_name(track_id.as_str(), "track")),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_dir(&self) -> PathBuf {
        self.root.join("source")
    }

    /// Output directory of one separation attempt.
    pub fn separation_dir(&self, model: &str, device: &str) -> PathBuf {
        self.root.join("separation").join(format!(
            "{}_{}",
            sanitize_file_name(model, "model"),
            sanitize_file_name(device, "device")
        ))
    }

    pub fn stem_path(&self, stem: StemType) -> PathBuf {
        self.root.join("stems").join(format!("{stem}.mp3"))
    }

    pub fn tmp_path(&self, name: &str) -> PathBuf {
        self.root.join("tmp").join(name)
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join("assets")
    }

    pub fn video_path(&self, channel: &str, stem: StemType) -> PathBuf {
        self.root
            .join("videos")
            .join(sanitize_file_name(channel, "channel"))
            .join(format!("{stem}.mp4"))
    }

    /// Create every directory of the layout.
    pub async fn prepare(&self) -> std::io::Result<()> {
        for dir in ["source", "separation", "stems", "tmp", "assets", "videos"] {
            tokio::fs::create_dir_all(self.root.join(dir)).await?;
        }
        Ok(())
    }

    /// Remove intermediate files once the track is done.
    pub async fn clean_intermediates(&self) {
        for dir in ["separation", "tmp"] {
            let path = self.root.join(dir);
            if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to clean workspace");
                }
            }
        }
    }
}
