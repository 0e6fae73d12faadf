use chrono::Local;
use std::backtrace::Backtrace;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::panic::{PanicHookInfo, take_hook};
use std::path::{Path, PathBuf};

use crate::logging::LOG_FILE_PREFIX;

/// Reports panics through `tracing` and writes them straight into today's log
/// file, since a panicking worker can take the process down before the
/// background log writer drains.
pub fn install(log_dir: impl AsRef<Path>) {
    let log_dir = log_dir.as_ref().to_path_buf();
    let previous_hook = take_hook();

    std::panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
        // A panic inside the hook itself would abort.
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let record = PanicRecord::capture(info);
            tracing::error!(target: "dvr_sentinel::panic", "{record}");
            if let Err(e) = append_to_log(&log_dir, &record.to_string()) {
                eprintln!("failed to write panic record: {e}");
            }
        }));

        previous_hook(info);
    }));
}

struct PanicRecord {
    thread: String,
    location: String,
    message: String,
    backtrace: Backtrace,
}

impl PanicRecord {
    fn capture(info: &PanicHookInfo<'_>) -> Self {
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&'static str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| info.to_string());

        Self {
            thread: std::thread::current().name().unwrap_or("<unnamed>").to_string(),
            location: info
                .location()
                .map_or_else(|| "<unknown>".to_string(), |l| format!("{}:{}", l.file(), l.line())),
            message,
            backtrace: Backtrace::force_capture(),
        }
    }
}

impl fmt::Display for PanicRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} PANIC in '{}' at {}: {}\n{}",
            Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"),
            self.thread,
            self.location,
            self.message,
            self.backtrace
        )
    }
}

/// Same name `tracing_appender::rolling::daily` gives today's file.
fn todays_log(log_dir: &Path) -> PathBuf {
    log_dir.join(format!("{LOG_FILE_PREFIX}.{}", Local::now().format("%Y-%m-%d")))
}

fn append_to_log(log_dir: &Path, record: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(todays_log(log_dir))?;
    writeln!(file, "{record}")?;
    file.flush()
}
