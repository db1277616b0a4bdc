//! Background writer appending metrics rows to the durable CSV log.
//!
//! A single worker thread owns the file handle, so the request path only pays for a
//! channel send. Write failures are logged and counted, never returned to the caller.
//!
//! TODO: Rotate the CSV once it passes a size limit; it only ever grows today.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use super::domain::CSV_HEADER;

enum Job {
    Row(String),
    Flush(mpsc::SyncSender<()>),
}

pub struct CsvWriter {
    tx: Option<mpsc::Sender<Job>>,
    handle: Option<JoinHandle<()>>,
    failures: Arc<AtomicU64>,
    path: PathBuf,
}

impl CsvWriter {
    /// Spawn the writer thread for `path`. The file is opened lazily on the first row.
    pub fn spawn(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let (tx, rx) = mpsc::channel::<Job>();
        let failures = Arc::new(AtomicU64::new(0));

        let worker = Worker {
            path: path.clone(),
            file: None,
            failures: failures.clone(),
        };
        let handle = thread::Builder::new()
            .name("metrics-csv".to_string())
            .spawn(move || worker.run(rx))?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            failures,
            path,
        })
    }

    /// Queue a row. Never blocks on disk.
    pub fn submit(&self, line: String) {
        let sent = self
            .tx
            .as_ref()
            .map(|tx| tx.send(Job::Row(line)).is_ok())
            .unwrap_or(false);
        if !sent {
            self.failures.fetch_add(1, Ordering::Relaxed);
            warn!(event = "metrics_write_dropped", path = %self.path.display(), "csv writer is gone");
        }
    }

    /// Block until every row queued before this call has been attempted.
    pub fn flush(&self) {
        let Some(tx) = self.tx.as_ref() else {
            return;
        };
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        if tx.send(Job::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Rows that could not be written since start.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CsvWriter {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain the queue and exit.
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(event = "metrics_writer_panicked", path = %self.path.display());
            }
        }
    }
}

struct Worker {
    path: PathBuf,
    file: Option<File>,
    failures: Arc<AtomicU64>,
}

impl Worker {
    fn run(mut self, rx: mpsc::Receiver<Job>) {
        for job in rx {
            match job {
                Job::Row(line) => {
                    if let Err(err) = self.append(&line) {
                        self.failures.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            event = "metrics_write_failed",
                            path = %self.path.display(),
                            error = %err,
                        );
                        // Reopen on the next row in case the file was rotated or removed.
                        self.file = None;
                    }
                }
                Job::Flush(ack) => {
                    if let Some(file) = self.file.as_mut() {
                        let _ = file.flush();
                    }
                    let _ = ack.send(());
                }
            }
        }
        debug!(event = "metrics_writer_stopped", path = %self.path.display());
    }

    fn append(&mut self, line: &str) -> io::Result<()> {
        let file = match self.file.take() {
            Some(file) => file,
            None => open_with_header(&self.path)?,
        };
        writeln!(self.file.insert(file), "{line}")
    }
}

fn open_with_header(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if file.metadata()?.len() == 0 {
        writeln!(file, "{CSV_HEADER}")?;
    }
    Ok(file)
}
