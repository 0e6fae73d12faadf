//! New-recording intake.
//!
//! [`VideoIngest`] registers a recording and, in immediate mode, forwards it
//! right away. [`FolderScanner`] finds recordings in the DVR's output folders.

mod scanner;

pub use scanner::{DEFAULT_SETTLE_DELAY, FolderScanner};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::Result;
use crate::database::models::VideoDbModel;
use crate::database::repositories::VideoRepository;
use crate::domain::ReportMode;
use crate::notification::VideoSink;

/// Persists recordings and forwards them when digests are off.
pub struct VideoIngest {
    videos: Arc<dyn VideoRepository>,
    sink: Arc<dyn VideoSink>,
    mode: ReportMode,
}

impl VideoIngest {
    pub fn new(
        videos: Arc<dyn VideoRepository>,
        sink: Arc<dyn VideoSink>,
        mode: ReportMode,
    ) -> Self {
        Self { videos, sink, mode }
    }

    pub async fn is_known(&self, path: &str) -> Result<bool> {
        self.videos.contains_path(path).await
    }

    /// Register a recording. Returns `None` if the path was already known.
    ///
    /// A failed forward is logged and does not undo the registration; the
    /// recording still shows up in later digests.
    pub async fn register(
        &self,
        path: &str,
        thumbnail_path: Option<&str>,
        recorded_at: DateTime<Utc>,
    ) -> Result<Option<VideoDbModel>> {
        let Some(video) = self
            .videos
            .add_video(path, thumbnail_path, recorded_at)
            .await?
        else {
            return Ok(None);
        };

        info!(path = %video.path, recorded_at = %video.recorded_at(), "Registered recording");

        if !self.mode.uses_digests()
            && let Err(e) = self.sink.send_video(&video).await
        {
            warn!(
                path = %video.path,
                sink = self.sink.sink_type(),
                "Failed to forward recording: {}", e
            );
        }

        Ok(Some(video))
    }
}
