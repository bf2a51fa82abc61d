use crate::error::ErrorKind;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// Append-only destination for per-URL failures
pub trait ErrorSink: Send + Sync {
    fn report(&self, kind: ErrorKind, url: &str);
}

/// Formats one error-log line (without the trailing newline)
pub fn format_entry(kind: ErrorKind, url: &str) -> String {
    format!("{}: {}", kind, url)
}

/// Writes `<kind>: <url>` lines to a flat file, opening it in append mode for every entry
pub struct FileErrorSink {
    path: PathBuf,
}

impl FileErrorSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)
    }
}

impl ErrorSink for FileErrorSink {
    fn report(&self, kind: ErrorKind, url: &str) {
        let line = format_entry(kind, url);
        tracing::warn!("{}", line);

        if let Err(e) = self.append(&line) {
            tracing::error!("Failed to write to error log {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Keeps reported entries in memory so tests can inspect them
    #[derive(Default)]
    pub struct MemorySink {
        entries: Mutex<Vec<String>>,
    }

    impl MemorySink {
        pub fn entries(&self) -> Vec<String> {
            self.entries.lock().unwrap().clone()
        }
    }

    impl ErrorSink for MemorySink {
        fn report(&self, kind: ErrorKind, url: &str) {
            self.entries.lock().unwrap().push(format_entry(kind, url));
        }
    }
}
