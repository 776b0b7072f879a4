//! Error kinds shared across the core (§7 of the design)
//!
//! Every module still propagates `anyhow::Result` up to its own boundary;
//! this enum exists so the Supervisor (and tests) can match on *kind*
//! without parsing message strings.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PyLogChopError {
    #[error("invalid configuration in section {section}: {reason}")]
    ConfigInvalid { section: String, reason: String },

    #[error("template unreadable: {0}")]
    TemplateUnreadable(String),

    #[error("template malformed: {0}")]
    TemplateMalformed(String),

    #[error("unknown encoding: {0}")]
    EncodingUnknown(String),

    #[error("follower error for {path}: {reason}")]
    FollowerTransient { path: String, reason: String },

    #[error("placeholder substitution failed: {0}")]
    PlaceholderSubstitution(String),

    #[error("line is not an anchor match and no record is open")]
    RecordOrphan,

    #[error("syslog emit failed: {0}")]
    SyslogEmit(String),
}
