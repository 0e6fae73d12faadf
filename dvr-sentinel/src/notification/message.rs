//! Plain-text digest and recording messages.

use chrono_tz::Tz;

use crate::database::models::VideoDbModel;
use crate::domain::TimeWindow;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Format a window in the configured zone.
pub fn format_window(window: &TimeWindow, tz: Tz) -> String {
    format!(
        "{} - {}",
        window.start().with_timezone(&tz).format(TIME_FORMAT),
        window.end().with_timezone(&tz).format(TIME_FORMAT)
    )
}

/// Digest of every recording inside a window.
pub fn build_report(videos: &[VideoDbModel], window: &TimeWindow, tz: Tz) -> String {
    let period = format_window(window, tz);
    if videos.is_empty() {
        return format!("Report {period}\nNo events recorded.");
    }

    let mut text = format!("Report {period}\n{} recording(s):", videos.len());
    for video in videos {
        text.push_str(&format!(
            "\n{}  {}",
            video.recorded_at().with_timezone(&tz).format("%H:%M:%S"),
            video.file_name()
        ));
        if video.thumbnail_path.is_none() {
            text.push_str("  (no snapshot)");
        }
    }
    text
}

/// Announcement of a single new recording.
pub fn build_video_notice(video: &VideoDbModel, tz: Tz) -> String {
    let mut text = format!(
        "New recording {} at {}",
        video.file_name(),
        video.recorded_at().with_timezone(&tz).format(TIME_FORMAT)
    );
    match video.thumbnail_name() {
        Some(snapshot) => text.push_str(&format!("\nSnapshot: {snapshot}")),
        None => text.push_str("\nNo snapshot available"),
    }
    text
}

/// Truncate a message to `limit` characters, marking the cut.
pub fn truncate_message(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let suffix = "\n\n[truncated]";
    let budget = limit.saturating_sub(suffix.len());
    let truncated: String = text.chars().take(budget).collect();
    format!("{truncated}{suffix}")
}
