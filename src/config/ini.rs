//! INI configuration loading, with `include`-glob merging (§4.7, §6)
//!
//! This module is the one genuinely external-collaborator piece the design
//! calls out in §1: the core only ever sees a `RawConfig` (section -> key ->
//! value). How that map is produced — one file, or several merged by a glob
//! — is this module's business alone.

use crate::config::RawConfig;
use anyhow::{Context, Result};
use ini::Ini;
use std::path::Path;

/// Load `path`, then merge in every file matched by `[main].include` (if
/// present), in sorted-path order. A later file's section/key overrides an
/// earlier one's.
pub fn load(path: &Path) -> Result<RawConfig> {
    let mut merged = load_single(path)
        .with_context(|| format!("failed to read configuration: {}", path.display()))?;

    if let Some(pattern) = merged.get("main").and_then(|m| m.get("include")).cloned() {
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let pattern = if Path::new(&pattern).is_absolute() {
            pattern
        } else {
            base.join(&pattern).to_string_lossy().into_owned()
        };

        let mut matches: Vec<_> = glob::glob(&pattern)
            .with_context(|| format!("invalid include glob: {pattern}"))?
            .filter_map(|entry| entry.ok())
            .collect();
        matches.sort();

        for included in matches {
            let extra = load_single(&included)
                .with_context(|| format!("failed to read included config: {}", included.display()))?;
            merge_into(&mut merged, extra);
        }
    }

    Ok(merged)
}

fn load_single(path: &Path) -> Result<RawConfig> {
    let ini = Ini::load_from_file(path).with_context(|| format!("failed to parse {}", path.display()))?;
    let mut raw: RawConfig = RawConfig::new();

    for (section, props) in ini.iter() {
        let Some(section) = section else { continue };
        let entry = raw.entry(section.to_string()).or_default();
        for (key, value) in props.iter() {
            entry.insert(key.to_string(), value.to_string());
        }
    }

    Ok(raw)
}

fn merge_into(base: &mut RawConfig, extra: RawConfig) {
    for (section, props) in extra {
        let entry = base.entry(section).or_default();
        for (key, value) in props {
            entry.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn merges_included_files_with_override() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("main.ini");
        let extra = dir.path().join("extra.ini");

        std::fs::write(
            &base,
            "[main]\ndlog_file = /tmp/a.log\ninclude = extra.ini\n\n[one:source]\ntags = a\n",
        )
        .unwrap();
        let mut f = std::fs::File::create(&extra).unwrap();
        writeln!(f, "[one:source]\ntags = b").unwrap();

        let raw = load(&base).unwrap();
        assert_eq!(raw["one:source"]["tags"], "b");
        assert_eq!(raw["main"]["dlog_file"], "/tmp/a.log");
    }

    #[test]
    fn single_file_without_include() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("main.ini");
        std::fs::write(&base, "[main]\ndlog_file = /tmp/a.log\n").unwrap();

        let raw = load(&base).unwrap();
        assert_eq!(raw.len(), 1);
        assert_eq!(raw["main"]["dlog_file"], "/tmp/a.log");
    }
}
