//! Configuration types and loading
//!
//! Handles CLI argument parsing, INI configuration file loading (with
//! `include`-glob merging), and validation of the loaded sections against
//! the schema described in the design document §6.

pub mod cli;
pub mod ini;
pub mod validator;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A raw, unvalidated configuration: section name -> (key -> value), exactly
/// as produced by the INI loader before `validator` projects it into typed
/// sections. Mirrors the "section -> dict of strings" shape the original
/// loader produced before schema validation.
pub type RawConfig = BTreeMap<String, BTreeMap<String, String>>;

/// The validated `[main]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainConfig {
    /// Path the daemon's stdout/stderr are redirected to once daemonized.
    pub dlog_file: PathBuf,
    /// Optional glob of additional INI files merged into the main one.
    pub include: Option<String>,
    /// Accepted by the schema, not consumed anywhere in the core (§9).
    pub max_length: Option<i64>,
}

/// The validated `*:logging` section. At most one of `File`/`Syslog` may be
/// present in a given configuration (§6, §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingConfig {
    File {
        file: PathBuf,
        retention_days: u32,
        level: LogLevel,
    },
    Syslog {
        address: String,
        facility: SyslogFacilityName,
        level: LogLevel,
    },
}

/// `level` values accepted by both `*:logging` sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "CRITICAL" => Some(Self::Critical),
            "ERROR" => Some(Self::Error),
            "WARNING" => Some(Self::Warning),
            "INFO" => Some(Self::Info),
            "DEBUG" => Some(Self::Debug),
            _ => None,
        }
    }

    pub fn to_tracing_filter(self) -> &'static str {
        match self {
            Self::Critical | Self::Error => "error",
            Self::Warning => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

/// Lowercase facility names accepted by `[syslog:logging].syslog_facility`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyslogFacilityName {
    Auth,
    AuthPriv,
    Cron,
    Daemon,
    Ftp,
    Kern,
    Lpr,
    Mail,
    News,
    Syslog,
    User,
    Uucp,
    Local0,
    Local1,
    Local2,
    Local3,
    Local4,
    Local5,
    Local6,
    Local7,
}

impl SyslogFacilityName {
    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "auth" => Self::Auth,
            "authpriv" => Self::AuthPriv,
            "cron" => Self::Cron,
            "daemon" => Self::Daemon,
            "ftp" => Self::Ftp,
            "kern" => Self::Kern,
            "lpr" => Self::Lpr,
            "mail" => Self::Mail,
            "news" => Self::News,
            "syslog" => Self::Syslog,
            "user" => Self::User,
            "uucp" => Self::Uucp,
            "local0" => Self::Local0,
            "local1" => Self::Local1,
            "local2" => Self::Local2,
            "local3" => Self::Local3,
            "local4" => Self::Local4,
            "local5" => Self::Local5,
            "local6" => Self::Local6,
            "local7" => Self::Local7,
            _ => return None,
        })
    }

    pub fn to_syslog_facility(self) -> syslog::Facility {
        use syslog::Facility::*;
        match self {
            Self::Auth => LOG_AUTH,
            Self::AuthPriv => LOG_AUTHPRIV,
            Self::Cron => LOG_CRON,
            Self::Daemon => LOG_DAEMON,
            Self::Ftp => LOG_FTP,
            Self::Kern => LOG_KERN,
            Self::Lpr => LOG_LPR,
            Self::Mail => LOG_MAIL,
            Self::News => LOG_NEWS,
            Self::Syslog => LOG_SYSLOG,
            Self::User => LOG_USER,
            Self::Uucp => LOG_UUCP,
            Self::Local0 => LOG_LOCAL0,
            Self::Local1 => LOG_LOCAL1,
            Self::Local2 => LOG_LOCAL2,
            Self::Local3 => LOG_LOCAL3,
            Self::Local4 => LOG_LOCAL4,
            Self::Local5 => LOG_LOCAL5,
            Self::Local6 => LOG_LOCAL6,
            Self::Local7 => LOG_LOCAL7,
        }
    }
}

/// `LOG_*` facility constants accepted by `[<path>:source].syslog_facility`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFacility {
    Kern,
    User,
    Mail,
    Daemon,
    Auth,
    Lpr,
    News,
    Uucp,
    Cron,
    Syslog,
    Local0,
    Local1,
    Local2,
    Local3,
    Local4,
    Local5,
    Local6,
    Local7,
}

impl SourceFacility {
    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "LOG_KERN" => Self::Kern,
            "LOG_USER" => Self::User,
            "LOG_MAIL" => Self::Mail,
            "LOG_DAEMON" => Self::Daemon,
            "LOG_AUTH" => Self::Auth,
            "LOG_LPR" => Self::Lpr,
            "LOG_NEWS" => Self::News,
            "LOG_UUCP" => Self::Uucp,
            "LOG_CRON" => Self::Cron,
            "LOG_SYSLOG" => Self::Syslog,
            "LOG_LOCAL0" => Self::Local0,
            "LOG_LOCAL1" => Self::Local1,
            "LOG_LOCAL2" => Self::Local2,
            "LOG_LOCAL3" => Self::Local3,
            "LOG_LOCAL4" => Self::Local4,
            "LOG_LOCAL5" => Self::Local5,
            "LOG_LOCAL6" => Self::Local6,
            "LOG_LOCAL7" => Self::Local7,
            _ => return None,
        })
    }

    pub fn to_syslog_facility(self) -> syslog::Facility {
        use syslog::Facility::*;
        match self {
            Self::Kern => LOG_KERN,
            Self::User => LOG_USER,
            Self::Mail => LOG_MAIL,
            Self::Daemon => LOG_DAEMON,
            Self::Auth => LOG_AUTH,
            Self::Lpr => LOG_LPR,
            Self::News => LOG_NEWS,
            Self::Uucp => LOG_UUCP,
            Self::Cron => LOG_CRON,
            Self::Syslog => LOG_SYSLOG,
            Self::Local0 => LOG_LOCAL0,
            Self::Local1 => LOG_LOCAL1,
            Self::Local2 => LOG_LOCAL2,
            Self::Local3 => LOG_LOCAL3,
            Self::Local4 => LOG_LOCAL4,
            Self::Local5 => LOG_LOCAL5,
            Self::Local6 => LOG_LOCAL6,
            Self::Local7 => LOG_LOCAL7,
        }
    }
}

/// `LOG_*` severity constants accepted by `[<path>:source].syslog_severity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSeverity {
    Emerg,
    Alert,
    Crit,
    Err,
    Warning,
    Notice,
    Info,
    Debug,
}

impl SourceSeverity {
    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "LOG_EMERG" => Self::Emerg,
            "LOG_ALERT" => Self::Alert,
            "LOG_CRIT" => Self::Crit,
            "LOG_ERR" => Self::Err,
            "LOG_WARNING" => Self::Warning,
            "LOG_NOTICE" => Self::Notice,
            "LOG_INFO" => Self::Info,
            "LOG_DEBUG" => Self::Debug,
            _ => return None,
        })
    }

    /// Emit `message` through `logger` at this severity.
    pub fn emit(
        self,
        logger: &mut syslog::Logger<syslog::LoggerBackend, syslog::Formatter3164>,
        message: &str,
    ) -> Result<(), syslog::Error> {
        match self {
            Self::Emerg => logger.emerg(message),
            Self::Alert => logger.alert(message),
            Self::Crit => logger.crit(message),
            Self::Err => logger.err(message),
            Self::Warning => logger.warning(message),
            Self::Notice => logger.notice(message),
            Self::Info => logger.info(message),
            Self::Debug => logger.debug(message),
        }
    }
}

/// The validated `[<path>:source]` section — an immutable snapshot of one
/// source's settings (§3 `SourceConfig`).
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub file_path: PathBuf,
    pub anchor_regex: String,
    pub template_path: PathBuf,
    pub tags: String,
    pub syslog_facility: SourceFacility,
    pub syslog_severity: SourceSeverity,
    pub syslog_tag: String,
    pub encoding: String,
}

/// Split a comma-separated tag string into its ordered-sequence view (§3).
/// Used against the live `SourceSettings.tags` snapshot a running worker
/// reads from on every emitted record.
pub fn tags_list(tags: &str) -> Vec<String> {
    tags.split(',').map(|s| s.to_string()).collect()
}

/// Split a comma-separated tag string into its mapping view, dropping and
/// logging malformed entries that don't split into exactly `key:value` (§3).
pub fn tags_dict(tags: &str) -> serde_json::Map<String, serde_json::Value> {
    let mut dict = serde_json::Map::new();
    for tag in tags.split(',') {
        match tag.split_once(':') {
            Some((key, value)) => {
                dict.insert(key.to_string(), serde_json::Value::String(value.to_string()));
            }
            None => {
                tracing::warn!(tag, "cannot create key,value from tag");
            }
        }
    }
    dict
}

/// Source path derived from a `<path>:source` section name.
pub fn source_path_from_section(section: &str) -> Option<&str> {
    section.strip_suffix(":source")
}
