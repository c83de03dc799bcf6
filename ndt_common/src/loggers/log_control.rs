//! # Log Control
//!
//! The platform mounts a JSON file listing the wanted severity per
//! container:
//!
//! ```json
//! [{"container": "network-data-template-app", "severity": "debug"}]
//! ```
//!
//! `RUST_LOG` wins over the file; with neither, the level is `info`.

use std::path::Path;

use serde::Deserialize;

/// Level used when nothing else applies.
pub const DEFAULT_LEVEL: &str = "info";

#[derive(Debug, Deserialize)]
struct LogControlEntry {
    container: String,
    severity: String,
}

/// The filter directive to install, plus anything worth logging about how
/// it was chosen once logging is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelResolution {
    /// `EnvFilter` directive, e.g. `info` or `debug,hyper=info`.
    pub directive: String,
    /// Warnings to log once the subscriber is installed.
    pub notes: Vec<String>,
}

/// Maps a log-control severity onto a `tracing` level.
pub fn severity_to_level(severity: &str) -> Option<&'static str> {
    match severity.to_ascii_lowercase().as_str() {
        "critical" | "error" => Some("error"),
        "warning" => Some("warn"),
        "info" => Some("info"),
        "debug" => Some("debug"),
        _ => None,
    }
}

/// Picks the filter directive from `RUST_LOG`, the log-control file or the
/// default, in that order.
pub fn resolve_level(
    rust_log: Option<&str>,
    ctrl_file: Option<&Path>,
    container: Option<&str>,
) -> LevelResolution {
    if let Some(directive) = rust_log.map(str::trim).filter(|d| !d.is_empty()) {
        return LevelResolution {
            directive: directive.to_string(),
            notes: Vec::new(),
        };
    }

    let fallback = |note: String| LevelResolution {
        directive: DEFAULT_LEVEL.to_string(),
        notes: vec![note],
    };

    let Some(path) = ctrl_file else {
        return LevelResolution {
            directive: DEFAULT_LEVEL.to_string(),
            notes: Vec::new(),
        };
    };
    let entries: Vec<LogControlEntry> = match std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str(&text).map_err(|e| e.to_string()))
    {
        Ok(entries) => entries,
        Err(e) => {
            return fallback(format!(
                "Could not read log control file {}: {e}",
                path.display()
            ))
        }
    };

    let container = container.unwrap_or_default();
    match entries.iter().find(|entry| entry.container == container) {
        None => fallback(format!(
            "No log control entry for container '{container}', using level {DEFAULT_LEVEL}"
        )),
        Some(entry) => match severity_to_level(&entry.severity) {
            Some(level) => LevelResolution {
                directive: level.to_string(),
                notes: Vec::new(),
            },
            None => fallback(format!(
                "Unknown severity '{}' for container '{container}', using level {DEFAULT_LEVEL}",
                entry.severity
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ctrl_file(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    const CTRL: &str = r#"[
        {"container": "sidecar", "severity": "error"},
        {"container": "network-data-template-app", "severity": "WARNING"}
    ]"#;

    #[test]
    fn rust_log_wins() {
        let file = ctrl_file(CTRL);
        let r = resolve_level(
            Some("debug,hyper=info"),
            Some(file.path()),
            Some("network-data-template-app"),
        );
        assert_eq!(r.directive, "debug,hyper=info");
        assert!(r.notes.is_empty());
    }

    #[test]
    fn container_entry_sets_the_level() {
        let file = ctrl_file(CTRL);
        let r = resolve_level(None, Some(file.path()), Some("network-data-template-app"));
        assert_eq!(r.directive, "warn");
    }

    #[test]
    fn missing_entry_keeps_default_with_a_note() {
        let file = ctrl_file(CTRL);
        let r = resolve_level(None, Some(file.path()), Some("someone-else"));
        assert_eq!(r.directive, DEFAULT_LEVEL);
        assert_eq!(r.notes.len(), 1);
        assert!(r.notes[0].contains("someone-else"));
    }

    #[test]
    fn unreadable_file_keeps_default() {
        let file = ctrl_file("not json");
        let r = resolve_level(None, Some(file.path()), Some("network-data-template-app"));
        assert_eq!(r.directive, DEFAULT_LEVEL);
        assert_eq!(r.notes.len(), 1);

        assert_eq!(resolve_level(None, None, None).directive, DEFAULT_LEVEL);
    }

    #[test]
    fn critical_maps_to_error() {
        assert_eq!(severity_to_level("critical"), Some("error"));
        assert_eq!(severity_to_level("verbose"), None);
    }
}
