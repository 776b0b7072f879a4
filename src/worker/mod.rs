//! The Source Worker (§4.4)
//!
//! Owns and composes a Follower, Assembler, and Renderer for one source,
//! running the read/assemble/render/enqueue loop on its own thread until
//! told to terminate.

use crate::assembler::Assembler;
use crate::config::{self, SourceConfig, SourceFacility, SourceSeverity};
use crate::error::PyLogChopError;
use crate::follower::{Follower, FollowerEvent};
use crate::renderer::{self, RecordContext};
use crossbeam::channel::Sender;
use regex::Regex;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// One rendered record bound for the Dispatcher (§3 `QueueMessage`).
#[derive(Debug)]
pub struct QueueMessage {
    pub facility: SourceFacility,
    pub severity: SourceSeverity,
    pub tag: String,
    pub payload: Value,
}

/// The subset of a source's configuration the Supervisor may change without
/// restarting the worker (§4.4). Published as a whole, never field-by-field.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub tags: String,
    pub template: Value,
    pub syslog_facility: SourceFacility,
    pub syslog_severity: SourceSeverity,
    pub syslog_tag: String,
    pub anchor_regex: String,
}

impl SourceSettings {
    fn from_config(config: &SourceConfig, template: Value) -> Self {
        Self {
            tags: config.tags.clone(),
            template,
            syslog_facility: config.syslog_facility,
            syslog_severity: config.syslog_severity,
            syslog_tag: config.syslog_tag.clone(),
            anchor_regex: config.anchor_regex.clone(),
        }
    }
}

/// A handle to a running Source Worker. Dropping the handle does not stop
/// the worker - call `terminate()` then `join()` explicitly (§4.4).
pub struct Worker {
    file_path: PathBuf,
    settings: Arc<Mutex<Arc<SourceSettings>>>,
    terminate: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn file_path(&self) -> &std::path::Path {
        &self.file_path
    }

    /// Validate `config` (template loads, encoding resolves), then spawn the
    /// worker thread. Returns `Err` without spawning anything if either
    /// validation fails (§4.4, §7 `TemplateUnreadable`/`TemplateMalformed`/`EncodingUnknown`).
    pub fn start(config: SourceConfig, sender: Sender<QueueMessage>) -> Result<Self, PyLogChopError> {
        let template_text = std::fs::read_to_string(&config.template_path).map_err(|err| {
            PyLogChopError::TemplateUnreadable(format!("{}: {err}", config.template_path.display()))
        })?;
        let template: Value = serde_json::from_str(&template_text)
            .map_err(|err| PyLogChopError::TemplateMalformed(format!("{}: {err}", config.template_path.display())))?;

        let encoding = crate::follower::resolve_encoding(&config.encoding)
            .ok_or_else(|| PyLogChopError::EncodingUnknown(config.encoding.clone()))?;

        let file_path = config.file_path.clone();
        let settings = Arc::new(Mutex::new(Arc::new(SourceSettings::from_config(&config, template))));
        let terminate = Arc::new(AtomicBool::new(false));

        let thread_settings = Arc::clone(&settings);
        let thread_terminate = Arc::clone(&terminate);
        let thread_path = file_path.clone();

        let handle = thread::Builder::new()
            .name(format!("worker:{}", file_path.display()))
            .spawn(move || run(thread_path, encoding, thread_settings, thread_terminate, sender))
            .expect("spawning a worker thread should not fail under normal resource limits");

        Ok(Self {
            file_path,
            settings,
            terminate,
            handle: Some(handle),
        })
    }

    /// Swap in a new live-mutable settings snapshot (§4.4). Called by the
    /// Supervisor on reload for a source that's already running.
    pub fn reconfigure(&self, config: &SourceConfig, template: Value) {
        let next = Arc::new(SourceSettings::from_config(config, template));
        *self.settings.lock().expect("settings mutex poisoned") = next;
    }

    /// Set the terminate flag. Idempotent; safe to call more than once.
    pub fn terminate(&self) {
        self.terminate.store(true, Ordering::Relaxed);
    }

    /// Block until the worker thread has exited.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(
    file_path: PathBuf,
    encoding: &'static encoding_rs::Encoding,
    settings: Arc<Mutex<Arc<SourceSettings>>>,
    terminate: Arc<AtomicBool>,
    sender: Sender<QueueMessage>,
) {
    let mut follower = Follower::new(file_path.clone(), encoding, Arc::clone(&terminate));
    let initial = current_settings(&settings);
    let mut current_anchor_source = initial.anchor_regex.clone();
    let mut assembler = Assembler::new(compile_anchor(&initial.anchor_regex, &file_path));
    drop(initial);

    loop {
        let snapshot = current_settings(&settings);
        if snapshot.anchor_regex != current_anchor_source {
            assembler = Assembler::new(compile_anchor(&snapshot.anchor_regex, &file_path));
            current_anchor_source = snapshot.anchor_regex.clone();
        }

        let event = match follower.next_event() {
            Some(event) => event,
            None => break,
        };

        let record = match event {
            FollowerEvent::Line(line) => assembler.process_line(line),
            FollowerEvent::Eof => assembler.process_eof(),
        };

        if let Some(record) = record {
            emit(&record, &snapshot, &sender, &file_path);
        }
    }

    if let Some(record) = assembler.flush_on_shutdown() {
        let snapshot = current_settings(&settings);
        emit(&record, &snapshot, &sender, &file_path);
    }
}

fn current_settings(settings: &Mutex<Arc<SourceSettings>>) -> Arc<SourceSettings> {
    Arc::clone(&settings.lock().expect("settings mutex poisoned"))
}

fn compile_anchor(anchor_regex: &str, file_path: &std::path::Path) -> Option<Regex> {
    if anchor_regex.is_empty() {
        return None;
    }
    match Regex::new(anchor_regex) {
        Ok(regex) => Some(regex),
        Err(err) => {
            tracing::error!(path = %file_path.display(), %err, "anchor regex does not compile, running in single-line mode");
            None
        }
    }
}

fn emit(
    record: &crate::assembler::Record,
    settings: &SourceSettings,
    sender: &Sender<QueueMessage>,
    file_path: &std::path::Path,
) {
    let tags_list = config::tags_list(&settings.tags);
    let tags_dict = config::tags_dict(&settings.tags);
    let ctx = RecordContext::new(record, &tags_list, &tags_dict);
    let payload = renderer::render(&settings.template, &ctx);

    let message = QueueMessage {
        facility: settings.syslog_facility,
        severity: settings.syslog_severity,
        tag: settings.syslog_tag.clone(),
        payload,
    };

    if sender.send(message).is_err() {
        tracing::error!(path = %file_path.display(), "shared queue receiver has gone away, dropping record");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_template(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn make_config(dir: &tempfile::TempDir, template: &str) -> SourceConfig {
        let log_path = dir.path().join("app.log");
        std::fs::write(&log_path, "").unwrap();
        let template_path = write_template(dir, "template.json", template);

        SourceConfig {
            file_path: log_path,
            anchor_regex: String::new(),
            template_path,
            tags: "a:1".to_string(),
            syslog_facility: SourceFacility::User,
            syslog_severity: SourceSeverity::Info,
            syslog_tag: "test".to_string(),
            encoding: "utf-8".to_string(),
        }
    }

    #[test]
    fn start_fails_without_spawning_on_unreadable_template() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = make_config(&dir, r#"{"m":"$FIRST_LINE"}"#);
        config.template_path = dir.path().join("missing.json");
        let (tx, _rx) = crossbeam::channel::unbounded();
        assert!(matches!(
            Worker::start(config, tx),
            Err(PyLogChopError::TemplateUnreadable(_))
        ));
    }

    #[test]
    fn start_fails_on_malformed_template_json() {
        let dir = tempfile::tempdir().unwrap();
        let config = make_config(&dir, "{ not json");
        let (tx, _rx) = crossbeam::channel::unbounded();
        assert!(matches!(
            Worker::start(config, tx),
            Err(PyLogChopError::TemplateMalformed(_))
        ));
    }

    #[test]
    fn start_fails_on_unknown_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = make_config(&dir, r#"{"m":"$FIRST_LINE"}"#);
        config.encoding = "not-a-real-encoding".to_string();
        let (tx, _rx) = crossbeam::channel::unbounded();
        assert!(matches!(
            Worker::start(config, tx),
            Err(PyLogChopError::EncodingUnknown(_))
        ));
    }

    #[test]
    fn single_line_record_reaches_the_queue() {
        let dir = tempfile::tempdir().unwrap();
        let config = make_config(&dir, r#"{"m":"$FIRST_LINE"}"#);
        let log_path = config.file_path.clone();
        let (tx, rx) = crossbeam::channel::unbounded();

        let mut worker = Worker::start(config, tx).expect("valid config starts");

        let mut f = std::fs::OpenOptions::new().append(true).open(&log_path).unwrap();
        writeln!(f, "hello").unwrap();

        let message = rx.recv_timeout(std::time::Duration::from_secs(5)).expect("a message arrives");
        assert_eq!(message.payload, serde_json::json!({"m": "hello\n"}));

        worker.terminate();
        worker.join();
    }
}
