//! The Dispatcher (§4.5)
//!
//! Single consumer of the shared queue. Opens a fresh syslog session per
//! message so that tag and facility attribution is always correct, at the
//! cost of reopening the platform session on every send.

use crate::error::PyLogChopError;
use crate::worker::QueueMessage;
use crossbeam::channel::{Receiver, RecvTimeoutError};
use std::time::Duration;

const IDLE_SLEEP: Duration = Duration::from_millis(100);

/// One step's outcome - whether a message was actually emitted.
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    DidWork,
    Idle,
}

pub struct Dispatcher {
    receiver: Receiver<QueueMessage>,
}

impl Dispatcher {
    pub fn new(receiver: Receiver<QueueMessage>) -> Self {
        Self { receiver }
    }

    /// Run one step: pop and emit a message if one is queued, else sleep
    /// 100ms and report idle (§4.5).
    pub fn step(&self) -> Step {
        match self.receiver.try_recv() {
            Ok(message) => {
                emit(message);
                Step::DidWork
            }
            Err(_) => {
                std::thread::sleep(IDLE_SLEEP);
                Step::Idle
            }
        }
    }

    /// Run steps until the queue is empty and the sender side has hung up
    /// (every worker has joined), or until two consecutive idle steps are
    /// observed - whichever comes first (§4.5, §4.6 Draining state).
    pub fn drain(&self) {
        let mut consecutive_idle = 0;
        loop {
            match self.receiver.recv_timeout(IDLE_SLEEP) {
                Ok(message) => {
                    emit(message);
                    consecutive_idle = 0;
                }
                Err(RecvTimeoutError::Timeout) => {
                    consecutive_idle += 1;
                    if consecutive_idle >= 2 {
                        return;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }
}

fn emit(message: QueueMessage) {
    let payload = match serde_json::to_string(&message.payload) {
        Ok(s) => s,
        Err(err) => {
            tracing::error!(%err, "could not serialize payload, dropping message");
            return;
        }
    };

    let formatter = syslog::Formatter3164 {
        facility: message.facility.to_syslog_facility(),
        hostname: None,
        process: message.tag.clone(),
        pid: 0,
    };

    let mut logger = match syslog::unix(formatter) {
        Ok(logger) => logger,
        Err(err) => {
            tracing::error!(%err, tag = %message.tag, "could not open syslog session, dropping message");
            return;
        }
    };

    if let Err(emit_err) = message.severity.emit(&mut logger, &payload) {
        let err = PyLogChopError::SyslogEmit(emit_err.to_string());
        tracing::error!(%err, tag = %message.tag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SourceFacility, SourceSeverity};

    #[test]
    fn step_reports_idle_on_empty_queue() {
        let (_tx, rx) = crossbeam::channel::unbounded::<QueueMessage>();
        let dispatcher = Dispatcher::new(rx);
        assert_eq!(dispatcher.step(), Step::Idle);
    }

    #[test]
    fn drain_returns_once_disconnected_and_empty() {
        let (tx, rx) = crossbeam::channel::unbounded();
        tx.send(QueueMessage {
            facility: SourceFacility::User,
            severity: SourceSeverity::Info,
            tag: "t".to_string(),
            payload: serde_json::json!({"m": "x"}),
        })
        .unwrap();
        drop(tx);
        let dispatcher = Dispatcher::new(rx);
        dispatcher.drain();
    }
}
