//! Recording model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::ms_to_datetime;

/// A recording registered from a watched folder.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct VideoDbModel {
    pub id: i64,
    pub path: String,
    /// Preview image taken by the DVR for this recording, if any.
    pub thumbnail_path: Option<String>,
    pub recorded_at: i64,
}

impl VideoDbModel {
    pub fn recorded_at(&self) -> DateTime<Utc> {
        ms_to_datetime(self.recorded_at)
    }

    /// File name of the recording, for display.
    pub fn file_name(&self) -> &str {
        std::path::Path::new(&self.path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.path)
    }

    /// File name of the snapshot, for display.
    pub fn thumbnail_name(&self) -> Option<&str> {
        let thumbnail = self.thumbnail_path.as_deref()?;
        std::path::Path::new(thumbnail)
            .file_name()
            .and_then(|n| n.to_str())
            .or(Some(thumbnail))
    }
}
