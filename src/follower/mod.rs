//! The per-source Follower (§4.1)
//!
//! Produces a lazy, non-restartable sequence of raw text lines from a
//! single file, indefinitely, until its terminate flag is set. Tracks the
//! file across truncation, rotation, and device changes by re-checking
//! `(device_id, inode, size)` on every tick.

use crate::error::PyLogChopError;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// One outcome of a single Follower tick.
#[derive(Debug)]
pub enum FollowerEvent {
    /// A full line was read, including its trailing newline if present.
    Line(String),
    /// No line was available this tick (already slept 1s before returning).
    Eof,
}

struct OpenFile {
    reader: BufReader<File>,
    device_id: u64,
    inode: u64,
}

/// Tails a single file (§4.1, §3 `FollowerState`).
pub struct Follower {
    path: PathBuf,
    encoding: &'static encoding_rs::Encoding,
    terminate: Arc<AtomicBool>,
    open: Option<OpenFile>,
}

impl Follower {
    /// `encoding_label` must already have been validated to resolve via
    /// `encoding_rs::Encoding::for_label` - the Worker does this at
    /// `start()` time and aborts the start otherwise (§4.4, §7 `EncodingUnknown`).
    pub fn new(path: PathBuf, encoding: &'static encoding_rs::Encoding, terminate: Arc<AtomicBool>) -> Self {
        Self {
            path,
            encoding,
            terminate,
            open: None,
        }
    }

    fn is_terminated(&self) -> bool {
        self.terminate.load(Ordering::Relaxed)
    }

    /// Log a `FollowerTransient` for `reason` against this Follower's path.
    /// Never propagates - every caller has already decided to close/retry
    /// the handle regardless (§7 `FollowerTransient`).
    fn log_transient(&self, reason: impl std::fmt::Display) {
        let err = PyLogChopError::FollowerTransient {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        };
        tracing::error!(%err);
    }

    /// Run one tick of the read loop described in §4.1. Returns `None` once
    /// the terminate flag is observed; otherwise returns exactly one event.
    pub fn next_event(&mut self) -> Option<FollowerEvent> {
        loop {
            if self.is_terminated() {
                return None;
            }

            if self.open.is_some() {
                self.check_identity();
            }

            if self.open.is_none() {
                if !self.open_with_retry() {
                    return None;
                }
            }

            let open = self.open.as_mut().expect("just opened or confirmed open");
            let pos_before = match open.reader.stream_position() {
                Ok(p) => p,
                Err(err) => {
                    self.log_transient(format!("could not determine read position: {err}"));
                    self.open = None;
                    continue;
                }
            };

            let mut raw = Vec::new();
            match open.reader.read_until(b'\n', &mut raw) {
                Ok(0) => {
                    let _ = open.reader.seek(SeekFrom::Start(pos_before));
                    thread::sleep(Duration::from_secs(1));
                    return Some(FollowerEvent::Eof);
                }
                Ok(_) if !raw.ends_with(b"\n") => {
                    // Partial trailing line - put it back and wait for the rest.
                    let _ = open.reader.seek(SeekFrom::Start(pos_before));
                    thread::sleep(Duration::from_secs(1));
                    return Some(FollowerEvent::Eof);
                }
                Ok(_) => {
                    let (decoded, _, had_errors) = self.encoding.decode(&raw);
                    if had_errors {
                        tracing::error!(path = %self.path.display(), "line could not be decoded with the configured encoding, dropping");
                        continue;
                    }
                    return Some(FollowerEvent::Line(decoded.into_owned()));
                }
                Err(err) => {
                    tracing::error!(path = %self.path.display(), %err, "read error, reopening");
                    self.open = None;
                    continue;
                }
            }
        }
    }

    /// `stat` the path and close the handle on truncation, device change,
    /// inode change, or `stat` failure (§4.1).
    fn check_identity(&mut self) {
        let Some(open) = self.open.as_mut() else { return };

        let metadata = match std::fs::metadata(&self.path) {
            Ok(m) => m,
            Err(err) => {
                tracing::error!(path = %self.path.display(), %err, "could not stat file, closing");
                self.open = None;
                return;
            }
        };

        let position = match open.reader.stream_position() {
            Ok(p) => p,
            Err(_) => {
                self.open = None;
                return;
            }
        };

        if position > metadata.size() {
            tracing::info!(path = %self.path.display(), "truncate detected, reopening");
            self.open = None;
        } else if open.device_id != metadata.dev() {
            tracing::info!(path = %self.path.display(), "underlying device changed, reopening");
            self.open = None;
        } else if open.inode != metadata.ino() {
            tracing::info!(path = %self.path.display(), "inode has changed, reopening");
            self.open = None;
        }
    }

    /// Retry opening every 10s (1s poll granularity) until success or
    /// terminate (§4.1). Never aborts the worker.
    fn open_with_retry(&mut self) -> bool {
        loop {
            if self.is_terminated() {
                return false;
            }
            if self.try_open() {
                return true;
            }
            tracing::error!(path = %self.path.display(), "retrying open in 10 seconds");
            for _ in 0..10 {
                if self.is_terminated() {
                    return false;
                }
                thread::sleep(Duration::from_secs(1));
            }
        }
    }

    fn try_open(&mut self) -> bool {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(err) => {
                tracing::error!(path = %self.path.display(), %err, "could not open logfile");
                return false;
            }
        };

        let metadata = match file.metadata() {
            Ok(m) => m,
            Err(err) => {
                tracing::error!(path = %self.path.display(), %err, "could not stat logfile after open");
                return false;
            }
        };

        let mut reader = BufReader::new(file);
        if let Err(err) = reader.seek(SeekFrom::End(0)) {
            tracing::error!(path = %self.path.display(), %err, "could not seek to end of logfile");
            return false;
        }

        self.open = Some(OpenFile {
            reader,
            device_id: metadata.dev(),
            inode: metadata.ino(),
        });
        true
    }
}

/// Resolve an encoding label the same way `Worker::start()` validates it
/// before spawning (§4.4, §7 `EncodingUnknown`).
pub fn resolve_encoding(label: &str) -> Option<&'static encoding_rs::Encoding> {
    encoding_rs::Encoding::for_label(label.as_bytes())
}
