//! Local persistence of span records.
//!
//! Every emit writes one line: a JSON array of records followed by `\n`.
//! Where the line goes is decided by the [`Destination`]:
//!
//! - `Stdout` and `Writer` append to a stream
//! - `File` appends to a single file, created on first write
//! - `SpanDirectory` creates a fresh `<uuid>_span` (start) or `<uuid>_end`
//!   (end) file per emit, the layout watched by the Lumigo extension
//!
//! Writes are serialized by a mutex around the destination. The shutdown flag
//! lives behind its own lock so that [`RecordSink::close`] never waits on an
//! in-flight write.

use crate::record::{RecordRole, SpanRecord};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Errors reported by the sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write span records: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode span records: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("sink close cancelled: deadline already passed")]
    Cancelled,
}

/// Where records are written.
pub enum Destination {
    Stdout,
    File(PathBuf),
    SpanDirectory(PathBuf),
    Writer(Box<dyn Write + Send>),
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Stdout => f.write_str("Stdout"),
            Destination::File(path) => f.debug_tuple("File").field(path).finish(),
            Destination::SpanDirectory(dir) => f.debug_tuple("SpanDirectory").field(dir).finish(),
            Destination::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

impl Destination {
    fn write_line(&mut self, line: &[u8], role: RecordRole) -> io::Result<()> {
        match self {
            Destination::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(line)?;
                out.flush()
            }
            Destination::File(path) => {
                let mut file = OpenOptions::new().create(true).append(true).open(path)?;
                file.write_all(line)
            }
            Destination::SpanDirectory(dir) => {
                fs::create_dir_all(&*dir)?;
                let suffix = match role {
                    RecordRole::Start => "_span",
                    RecordRole::End => "_end",
                };
                let path = dir.join(format!("{}{}", Uuid::new_v4(), suffix));
                fs::write(path, line)
            }
            Destination::Writer(writer) => {
                writer.write_all(line)?;
                writer.flush()
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Destination::Stdout => io::stdout().flush(),
            Destination::Writer(writer) => writer.flush(),
            Destination::File(_) | Destination::SpanDirectory(_) => Ok(()),
        }
    }
}

/// Thread-safe writer of span record lines.
#[derive(Debug)]
pub struct RecordSink {
    destination: Mutex<Destination>,
    stopped: RwLock<bool>,
}

impl RecordSink {
    pub fn new(destination: Destination) -> Self {
        Self {
            destination: Mutex::new(destination),
            stopped: RwLock::new(false),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Destination::Stdout)
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(Destination::File(path.into()))
    }

    pub fn span_directory(dir: impl Into<PathBuf>) -> Self {
        Self::new(Destination::SpanDirectory(dir.into()))
    }

    pub fn writer(writer: impl Write + Send + 'static) -> Self {
        Self::new(Destination::Writer(Box::new(writer)))
    }

    /// True once [`RecordSink::close`] has been called.
    pub fn is_stopped(&self) -> bool {
        *self.stopped.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes `records` as one JSON array line.
    ///
    /// Nothing is retried. After [`RecordSink::close`] the records are
    /// discarded and `Ok(())` is returned.
    pub fn emit(&self, records: &[SpanRecord], role: RecordRole) -> Result<(), SinkError> {
        if self.is_stopped() {
            debug!(%role, count = records.len(), "sink closed, discarding span records");
            return Ok(());
        }

        let mut line = serde_json::to_vec(records)?;
        line.push(b'\n');

        let mut destination = self
            .destination
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        destination.write_line(&line, role)?;

        info!(%role, count = records.len(), bytes = line.len(), "wrote span records");
        Ok(())
    }

    /// Stops the sink.
    ///
    /// The shutdown flag is set first, so later emits are discarded even when
    /// this returns [`SinkError::Cancelled`] because `deadline` has passed.
    pub fn close(&self, deadline: Instant) -> Result<(), SinkError> {
        *self.stopped.write().unwrap_or_else(PoisonError::into_inner) = true;

        if Instant::now() >= deadline {
            return Err(SinkError::Cancelled);
        }

        self.destination
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SharedBuffer;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn record(id: &str) -> SpanRecord {
        SpanRecord {
            id: id.to_string(),
            ..Default::default()
        }
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[test]
    fn test_emit_writes_one_array_per_line() {
        let buffer = SharedBuffer::default();
        let sink = RecordSink::writer(buffer.clone());

        sink.emit(&[record("a_started")], RecordRole::Start).unwrap();
        sink.emit(&[record("b"), record("a")], RecordRole::End).unwrap();

        let lines = buffer.lines();
        assert_eq!(lines.len(), 2);
        let first: Vec<SpanRecord> = serde_json::from_str(&lines[0]).unwrap();
        let second: Vec<SpanRecord> = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(first, vec![record("a_started")]);
        assert_eq!(second, vec![record("b"), record("a")]);
    }

    #[test]
    fn test_emit_after_close_is_discarded() {
        let buffer = SharedBuffer::default();
        let sink = RecordSink::writer(buffer.clone());

        sink.close(far_deadline()).unwrap();
        assert!(sink.is_stopped());
        sink.emit(&[record("late")], RecordRole::End).unwrap();

        assert!(buffer.lines().is_empty());
    }

    #[test]
    fn test_close_with_elapsed_deadline_is_cancelled() {
        let sink = RecordSink::writer(SharedBuffer::default());
        let result = sink.close(Instant::now());

        assert!(matches!(result, Err(SinkError::Cancelled)));
        assert!(sink.is_stopped());
    }

    #[test]
    fn test_concurrent_emits_do_not_interleave() {
        let buffer = SharedBuffer::default();
        let sink = Arc::new(RecordSink::writer(buffer.clone()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let sink = Arc::clone(&sink);
                thread::spawn(move || {
                    for j in 0..25 {
                        let id = format!("{}-{}", i, j);
                        sink.emit(&[record(&id), record(&id)], RecordRole::End).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let lines = buffer.lines();
        assert_eq!(lines.len(), 200);
        for line in lines {
            let records: Vec<SpanRecord> = serde_json::from_str(&line).unwrap();
            assert_eq!(records.len(), 2);
            assert_eq!(records[0].id, records[1].id);
        }
    }

    #[test]
    fn test_file_destination_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spans.jsonl");
        let sink = RecordSink::file(&path);

        sink.emit(&[record("a_started")], RecordRole::Start).unwrap();
        sink.emit(&[record("a")], RecordRole::End).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn test_span_directory_creates_fresh_files() {
        let dir = tempfile::tempdir().unwrap();
        let spans_dir = dir.path().join("lumigo-spans");
        let sink = RecordSink::span_directory(&spans_dir);

        sink.emit(&[record("a_started")], RecordRole::Start).unwrap();
        sink.emit(&[record("a")], RecordRole::End).unwrap();
        sink.emit(&[record("b")], RecordRole::End).unwrap();

        let mut names: Vec<String> = fs::read_dir(&spans_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();

        assert_eq!(names.len(), 3);
        assert_eq!(names.iter().filter(|n| n.ends_with("_span")).count(), 1);
        assert_eq!(names.iter().filter(|n| n.ends_with("_end")).count(), 2);
    }

    #[test]
    fn test_io_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // a directory cannot be opened for appending
        let sink = RecordSink::file(dir.path());

        let result = sink.emit(&[record("a")], RecordRole::End);
        assert!(matches!(result, Err(SinkError::Io(_))));
    }
}
