//! Schema-shaped validation of the raw INI sections (§6, §7)
//!
//! Each `validate_*` function rejects unknown keys, missing required keys,
//! and out-of-enum values, the same checks the original's `jsonschema`
//! schemas performed - but expressed as plain Rust match arms rather than a
//! schema document, since the document is fixed at compile time here.

use crate::config::{
    LogLevel, LoggingConfig, MainConfig, RawConfig, SourceConfig, SourceFacility, SourceSeverity,
    SyslogFacilityName,
};
use crate::error::PyLogChopError;
use std::collections::BTreeMap;
use std::path::PathBuf;

type Section<'a> = &'a BTreeMap<String, String>;

fn invalid(section: &str, reason: impl Into<String>) -> PyLogChopError {
    PyLogChopError::ConfigInvalid {
        section: section.to_string(),
        reason: reason.into(),
    }
}

fn reject_unknown_keys(section_name: &str, section: Section, allowed: &[&str]) -> Result<(), PyLogChopError> {
    for key in section.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(invalid(section_name, format!("unknown key '{key}'")));
        }
    }
    Ok(())
}

fn required<'a>(section_name: &str, section: Section<'a>, key: &str) -> Result<&'a str, PyLogChopError> {
    section
        .get(key)
        .map(|s| s.as_str())
        .ok_or_else(|| invalid(section_name, format!("missing required key '{key}'")))
}

/// Validate `[main]` (§6). Fatal on failure - the process does not start.
pub fn validate_main(raw: &RawConfig) -> Result<MainConfig, PyLogChopError> {
    let section = raw
        .get("main")
        .ok_or_else(|| invalid("main", "section is required"))?;
    reject_unknown_keys("main", section, &["dlog_file", "include", "max_length"])?;

    let dlog_file = required("main", section, "dlog_file")?;
    let max_length = section
        .get("max_length")
        .map(|v| {
            v.parse::<i64>()
                .map_err(|_| invalid("main", format!("max_length must be an integer, got '{v}'")))
        })
        .transpose()?;

    Ok(MainConfig {
        dlog_file: PathBuf::from(dlog_file),
        include: section.get("include").cloned(),
        max_length,
    })
}

/// Validate whichever of `[file:logging]` / `[syslog:logging]` is present.
/// Rejects configurations carrying both (§6, §7).
pub fn validate_logging(raw: &RawConfig) -> Result<Option<LoggingConfig>, PyLogChopError> {
    let file_section = raw.get("file:logging");
    let syslog_section = raw.get("syslog:logging");

    match (file_section, syslog_section) {
        (Some(_), Some(_)) => Err(invalid(
            "file:logging / syslog:logging",
            "only one of [file:logging] and [syslog:logging] may be configured",
        )),
        (Some(section), None) => Ok(Some(validate_file_logging(section)?)),
        (None, Some(section)) => Ok(Some(validate_syslog_logging(section)?)),
        (None, None) => Ok(None),
    }
}

fn validate_file_logging(section: Section) -> Result<LoggingConfig, PyLogChopError> {
    reject_unknown_keys("file:logging", section, &["file", "retention", "level"])?;
    let file = required("file:logging", section, "file")?;
    let retention = required("file:logging", section, "retention")?;
    let retention_days = retention
        .parse::<u32>()
        .map_err(|_| invalid("file:logging", format!("retention must be an integer, got '{retention}'")))?;
    let level = required("file:logging", section, "level")?;
    let level = LogLevel::from_str(level)
        .ok_or_else(|| invalid("file:logging", format!("unknown level '{level}'")))?;

    Ok(LoggingConfig::File {
        file: PathBuf::from(file),
        retention_days,
        level,
    })
}

fn validate_syslog_logging(section: Section) -> Result<LoggingConfig, PyLogChopError> {
    reject_unknown_keys("syslog:logging", section, &["address", "syslog_facility", "level"])?;
    let address = required("syslog:logging", section, "address")?;
    let level = required("syslog:logging", section, "level")?;
    let level = LogLevel::from_str(level)
        .ok_or_else(|| invalid("syslog:logging", format!("unknown level '{level}'")))?;
    let facility = match section.get("syslog_facility") {
        Some(f) => SyslogFacilityName::from_str(f)
            .ok_or_else(|| invalid("syslog:logging", format!("unknown syslog_facility '{f}'")))?,
        None => SyslogFacilityName::User,
    };

    Ok(LoggingConfig::Syslog {
        address: address.to_string(),
        facility,
        level,
    })
}

/// Validate a `[<path>:source]` section. Failure here is never fatal to the
/// process - the Supervisor skips just this section (§7).
pub fn validate_source(section_name: &str, section: Section) -> Result<SourceConfig, PyLogChopError> {
    let file_path = crate::config::source_path_from_section(section_name)
        .ok_or_else(|| invalid(section_name, "section name must end in ':source'"))?;

    reject_unknown_keys(
        section_name,
        section,
        &[
            "syslog_facility",
            "syslog_severity",
            "syslog_tag",
            "tags",
            "template",
            "regex",
            "encoding",
        ],
    )?;

    let syslog_facility = required(section_name, section, "syslog_facility")?;
    let syslog_facility = SourceFacility::from_str(syslog_facility)
        .ok_or_else(|| invalid(section_name, format!("unknown syslog_facility '{syslog_facility}'")))?;

    let syslog_severity = required(section_name, section, "syslog_severity")?;
    let syslog_severity = SourceSeverity::from_str(syslog_severity)
        .ok_or_else(|| invalid(section_name, format!("unknown syslog_severity '{syslog_severity}'")))?;

    let syslog_tag = required(section_name, section, "syslog_tag")?.to_string();
    let tags = required(section_name, section, "tags")?.to_string();
    let template = required(section_name, section, "template")?;
    let regex = required(section_name, section, "regex")?.to_string();
    let encoding = section.get("encoding").cloned().unwrap_or_else(|| "utf-8".to_string());

    Ok(SourceConfig {
        file_path: PathBuf::from(file_path),
        anchor_regex: regex,
        template_path: PathBuf::from(template),
        tags,
        syslog_facility,
        syslog_severity,
        syslog_tag,
        encoding,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn rejects_unknown_key_in_source() {
        let sec = section(&[
            ("syslog_facility", "LOG_USER"),
            ("syslog_severity", "LOG_INFO"),
            ("syslog_tag", "t"),
            ("tags", "a"),
            ("template", "/tmp/t.json"),
            ("regex", ""),
            ("bogus", "1"),
        ]);
        let err = validate_source("/var/log/app.log:source", &sec).unwrap_err();
        assert!(matches!(err, PyLogChopError::ConfigInvalid { .. }));
    }

    #[test]
    fn rejects_malformed_facility() {
        let sec = section(&[
            ("syslog_facility", "NOT_A_FACILITY"),
            ("syslog_severity", "LOG_INFO"),
            ("syslog_tag", "t"),
            ("tags", "a"),
            ("template", "/tmp/t.json"),
            ("regex", ""),
        ]);
        assert!(validate_source("/var/log/app.log:source", &sec).is_err());
    }

    #[test]
    fn rejects_missing_required_key() {
        let sec = section(&[("syslog_severity", "LOG_INFO")]);
        assert!(validate_source("/var/log/app.log:source", &sec).is_err());
    }

    #[test]
    fn accepts_well_formed_source() {
        let sec = section(&[
            ("syslog_facility", "LOG_USER"),
            ("syslog_severity", "LOG_INFO"),
            ("syslog_tag", "t"),
            ("tags", "a:1,b:2"),
            ("template", "/tmp/t.json"),
            ("regex", "^foo"),
        ]);
        let cfg = validate_source("/var/log/app.log:source", &sec).unwrap();
        assert_eq!(cfg.file_path, PathBuf::from("/var/log/app.log"));
        assert_eq!(cfg.anchor_regex, "^foo");
    }

    #[test]
    fn rejects_both_logging_sections_present() {
        let mut raw: RawConfig = RawConfig::new();
        raw.insert(
            "file:logging".to_string(),
            section(&[("file", "/tmp/a.log"), ("retention", "7"), ("level", "INFO")]),
        );
        raw.insert(
            "syslog:logging".to_string(),
            section(&[("address", "localhost"), ("level", "INFO")]),
        );
        assert!(validate_logging(&raw).is_err());
    }
}
