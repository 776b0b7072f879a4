//! The per-source Record Assembler (§4.2)
//!
//! Groups a Follower's line stream into records, either one line per record
//! (single-line mode) or an anchor-delimited multi-line group plus a
//! starvation timer (multi-line mode).

use crate::error::PyLogChopError;
use regex::Regex;

/// A fully assembled record, ready for rendering (§3 `PartialRecord`, once flushed).
#[derive(Debug, Clone)]
pub struct Record {
    pub first_line: String,
    pub other_lines: Vec<String>,
    /// `captures[0]` is the whole match, `captures[n]` is capture group `n`.
    /// `None` in single-line mode.
    pub captures: Option<Vec<Option<String>>>,
}

struct PartialRecord {
    first_line: String,
    other_lines: Vec<String>,
    captures: Option<Vec<Option<String>>>,
    starving: bool,
}

impl PartialRecord {
    fn into_record(self) -> Record {
        Record {
            first_line: self.first_line,
            other_lines: self.other_lines,
            captures: self.captures,
        }
    }
}

/// Groups lines into records (§4.2). `None` anchor means single-line mode.
pub struct Assembler {
    anchor: Option<Regex>,
    partial: Option<PartialRecord>,
}

impl Assembler {
    pub fn new(anchor: Option<Regex>) -> Self {
        Self { anchor, partial: None }
    }

    /// Feed one line from the Follower. Returns a flushed record when one
    /// results from this line (always, in single-line mode; only when an
    /// anchor line displaces a prior in-flight record, in multi-line mode).
    pub fn process_line(&mut self, line: String) -> Option<Record> {
        let Some(anchor) = &self.anchor else {
            return Some(Record {
                first_line: line,
                other_lines: Vec::new(),
                captures: None,
            });
        };

        match anchor_match(anchor, &line) {
            Some(captures) if self.partial.is_some() => {
                let flushed = self.take_partial();
                self.start_new(line, captures);
                flushed
            }
            Some(captures) => {
                self.start_new(line, captures);
                None
            }
            None if self.partial.is_some() => {
                let partial = self.partial.as_mut().expect("checked above");
                partial.other_lines.push(line);
                partial.starving = false;
                None
            }
            None => {
                let err = PyLogChopError::RecordOrphan;
                tracing::error!(%err, %line);
                None
            }
        }
    }

    /// Called once per Follower EOF tick (§4.2 starvation flush). Flushes
    /// the in-flight record if it was already starving, otherwise marks it
    /// starving for the next tick.
    pub fn process_eof(&mut self) -> Option<Record> {
        match self.partial.as_mut() {
            Some(partial) if partial.starving => self.take_partial(),
            Some(partial) => {
                partial.starving = true;
                None
            }
            None => None,
        }
    }

    /// Flush whatever is in flight when the worker is shutting down. A
    /// `PartialRecord` that was ever created (even with zero continuation
    /// lines) counts as non-empty and is flushed; no record is emitted if
    /// none was ever opened (§4.2, §9 open question).
    pub fn flush_on_shutdown(&mut self) -> Option<Record> {
        self.take_partial()
    }

    fn take_partial(&mut self) -> Option<Record> {
        self.partial.take().map(PartialRecord::into_record)
    }

    fn start_new(&mut self, line: String, captures: Vec<Option<String>>) {
        self.partial = Some(PartialRecord {
            first_line: line,
            other_lines: Vec::new(),
            captures: Some(captures),
            starving: false,
        });
    }
}

/// Apply `anchor` at start-of-string, the way `re.match` does in the
/// original (not "find anywhere in the line").
fn anchor_match(anchor: &Regex, line: &str) -> Option<Vec<Option<String>>> {
    let captures = anchor.captures(line)?;
    if captures.get(0)?.start() != 0 {
        return None;
    }
    Some(
        (0..captures.len())
            .map(|i| captures.get(i).map(|m| m.as_str().to_string()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_mode_yields_one_record_per_line() {
        let mut assembler = Assembler::new(None);
        let record = assembler.process_line("hello\n".to_string()).unwrap();
        assert_eq!(record.first_line, "hello\n");
        assert!(record.other_lines.is_empty());
        assert!(record.captures.is_none());
    }

    #[test]
    fn multiline_groups_continuations_and_flushes_on_new_anchor() {
        let anchor = Regex::new(r"^\d{4}-\d{2}-\d{2}").unwrap();
        let mut assembler = Assembler::new(Some(anchor));

        assert!(assembler
            .process_line("2024-01-01 ERROR boom\n".to_string())
            .is_none());
        assert!(assembler.process_line("  at X\n".to_string()).is_none());
        assert!(assembler.process_line("  at Y\n".to_string()).is_none());

        let first = assembler
            .process_line("2024-01-02 INFO ok\n".to_string())
            .expect("new anchor flushes the prior record");
        assert_eq!(first.first_line, "2024-01-01 ERROR boom\n");
        assert_eq!(first.other_lines, vec!["  at X\n", "  at Y\n"]);

        let second = assembler.flush_on_shutdown().unwrap();
        assert_eq!(second.first_line, "2024-01-02 INFO ok\n");
        assert!(second.other_lines.is_empty());
    }

    #[test]
    fn orphan_line_without_anchor_is_dropped() {
        let anchor = Regex::new(r"^\d+").unwrap();
        let mut assembler = Assembler::new(Some(anchor));
        assert!(assembler.process_line("no digits here\n".to_string()).is_none());
        assert!(assembler.flush_on_shutdown().is_none());
    }

    #[test]
    fn starvation_flushes_after_two_eof_ticks() {
        let anchor = Regex::new(r"^\d+").unwrap();
        let mut assembler = Assembler::new(Some(anchor));
        assembler.process_line("1 start\n".to_string());

        assert!(assembler.process_eof().is_none(), "first EOF only marks starving");
        let flushed = assembler.process_eof().expect("second EOF flushes");
        assert_eq!(flushed.first_line, "1 start\n");
    }

    #[test]
    fn continuation_line_clears_starving() {
        let anchor = Regex::new(r"^\d+").unwrap();
        let mut assembler = Assembler::new(Some(anchor));
        assembler.process_line("1 start\n".to_string());
        assert!(assembler.process_eof().is_none());
        assembler.process_line("  continued\n".to_string());
        // starving was cleared by the continuation line, so this EOF only re-arms it.
        assert!(assembler.process_eof().is_none());
        let flushed = assembler.process_eof().unwrap();
        assert_eq!(flushed.other_lines, vec!["  continued\n"]);
    }

    #[test]
    fn capture_extraction() {
        let anchor = Regex::new(r"^(\d+) (\w+) ([0-9.]+)").unwrap();
        let mut assembler = Assembler::new(Some(anchor));
        assembler.process_line("42 hello 3.14\n".to_string());
        let record = assembler.flush_on_shutdown().unwrap();
        let captures = record.captures.unwrap();
        assert_eq!(captures[1].as_deref(), Some("42"));
        assert_eq!(captures[2].as_deref(), Some("hello"));
        assert_eq!(captures[3].as_deref(), Some("3.14"));
    }
}
