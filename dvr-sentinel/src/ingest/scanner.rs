//! Polling scanner for DVR output folders.
//!
//! AgentDVR writes each recording into a camera folder and keeps snapshots in
//! a `grabs/` subfolder next to it. A recording is registered once its file
//! has not been modified for the settle delay, with the newest snapshot as
//! its thumbnail. A recording without a snapshot is still registered so no
//! digest misses it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::VideoIngest;
use crate::Result;
use crate::schedule::TickAction;

/// How long a file must be left alone before it counts as complete.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(20);

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif"];
const GRABS_DIR: &str = "grabs";

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// Newest image in `dir`, by modification time.
async fn newest_image(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !has_extension(&path, IMAGE_EXTENSIONS) {
            continue;
        }
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        if newest.as_ref().is_none_or(|(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

/// Registers settled recordings found in the watched folders.
pub struct FolderScanner {
    folders: Vec<PathBuf>,
    ingest: Arc<VideoIngest>,
    settle_delay: Duration,
}

impl FolderScanner {
    pub fn new(folders: Vec<PathBuf>, ingest: Arc<VideoIngest>) -> Self {
        Self {
            folders,
            ingest,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn folders(&self) -> &[PathBuf] {
        &self.folders
    }

    /// Scan every folder once. Returns the number of new recordings.
    pub async fn scan_once(&self, now: SystemTime) -> Result<usize> {
        let mut registered = 0;
        for folder in &self.folders {
            match self.scan_folder(folder, now).await {
                Ok(count) => registered += count,
                Err(e) => warn!(folder = %folder.display(), "Folder scan failed: {}", e),
            }
        }
        Ok(registered)
    }

    async fn scan_folder(&self, folder: &Path, now: SystemTime) -> Result<usize> {
        let mut entries = tokio::fs::read_dir(folder).await?;
        let mut registered = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !has_extension(&path, VIDEO_EXTENSIONS) {
                continue;
            }
            // Follows symlinks. The DVR may also delete a file between
            // listing and stat.
            let metadata = match tokio::fs::metadata(&path).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!(path = %path.display(), "Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }

            let Ok(modified) = metadata.modified() else {
                continue;
            };
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age < self.settle_delay {
                debug!(path = %path.display(), "Recording still being written");
                continue;
            }

            let path_str = path.to_string_lossy().into_owned();
            if self.ingest.is_known(&path_str).await? {
                continue;
            }

            let grabs = folder.join(GRABS_DIR);
            let thumbnail = match newest_image(&grabs).await {
                Ok(thumbnail) => thumbnail.map(|t| t.to_string_lossy().into_owned()),
                Err(e) => {
                    warn!(grabs = %grabs.display(), "Cannot read snapshots: {}", e);
                    None
                }
            };
            if thumbnail.is_none() {
                warn!(path = %path.display(), "No snapshot for recording");
            }

            let recorded_at: DateTime<Utc> = modified.into();
            if self
                .ingest
                .register(&path_str, thumbnail.as_deref(), recorded_at)
                .await?
                .is_some()
            {
                registered += 1;
            }
        }

        Ok(registered)
    }
}

#[async_trait]
impl TickAction for FolderScanner {
    fn name(&self) -> &str {
        "folder-scanner"
    }

    async fn run(&self) -> Result<()> {
        let registered = self.scan_once(SystemTime::now()).await?;
        if registered > 0 {
            debug!(registered, "Folder scan registered recordings");
        }
        Ok(())
    }
}
