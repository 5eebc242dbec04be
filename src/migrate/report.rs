//! Structured migration failures and the batch report file.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use thiserror::Error;

/// One node that could not be brought up to date. Migration of the other
/// nodes carries on regardless.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplacementError {
    #[error("A node whose class doesn't exist was found in node tree \"{tree}\"")]
    Unregistered { node_id: String, node_type: String, tree: String },
    #[error(
        "A node of type {node_type} in tree \"{tree}\" doesn't have version information attached to it. \
         If so, please check that the nodes in the file are compatible with the in-code node classes."
    )]
    BadVersion { node_id: String, node_type: String, tree: String },
    #[error(
        "A node of type {node_type} in tree \"{tree}\" failed to be updated, \
         because there is no (longer?) an update routine for this version of the node."
    )]
    UpdateFailed {
        node_id: String,
        node_type: String,
        tree: String,
        detail: String,
    },
    #[error(
        "A node of type {node_type} in tree \"{tree}\" failed to be updated, \
         because the node's update procedure itself failed. Original error:\n{detail}\n"
    )]
    Misc {
        node_id: String,
        node_type: String,
        tree: String,
        detail: String,
    },
    #[error(
        "A node of type {node_type} in tree \"{tree}\" seemingly comes from a future version of the add-on. \
         Please check whether your version is up to date"
    )]
    FutureVersion { node_id: String, node_type: String, tree: String },
}

impl ReplacementError {
    /// Short identifier of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unregistered { .. } => "unregistered",
            Self::BadVersion { .. } => "bad version",
            Self::UpdateFailed { .. } => "update failed",
            Self::Misc { .. } => "misc.",
            Self::FutureVersion { .. } => "future version",
        }
    }

    pub fn node_id(&self) -> &str {
        match self {
            Self::Unregistered { node_id, .. }
            | Self::BadVersion { node_id, .. }
            | Self::UpdateFailed { node_id, .. }
            | Self::Misc { node_id, .. }
            | Self::FutureVersion { node_id, .. } => node_id,
        }
    }

    pub fn tree(&self) -> &str {
        match self {
            Self::Unregistered { tree, .. }
            | Self::BadVersion { tree, .. }
            | Self::UpdateFailed { tree, .. }
            | Self::Misc { tree, .. }
            | Self::FutureVersion { tree, .. } => tree,
        }
    }
}

pub fn report_file_name(at: &DateTime<Local>) -> String {
    format!("node_update_failure.{}.txt", at.format("%Y-%m-%dT%H-%M-%S%z"))
}

/// Report body: one paragraph per error, in the order they were recorded.
pub fn render_report(errors: &[ReplacementError]) -> String {
    let mut out = String::new();
    for e in errors {
        let _ = writeln!(out, "{e}");
        let _ = writeln!(out, "  (node \"{}\", kind: {})", e.node_id(), e.kind());
    }
    out
}

/// Writes the report into `dir`; nothing is written for an empty batch.
pub fn write_report(dir: &Path, errors: &[ReplacementError], at: DateTime<Local>) -> Result<Option<PathBuf>> {
    if errors.is_empty() {
        return Ok(None);
    }
    let path = dir.join(report_file_name(&at));
    std::fs::write(&path, render_report(errors))
        .with_context(|| format!("failed to write node update report {}", path.display()))?;
    log::error!(
        "[migrate] there were errors in the node update procedure, a detailed report has been written to {}",
        path.display()
    );
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Vec<ReplacementError> {
        vec![
            ReplacementError::Unregistered {
                node_id: "n1".into(),
                node_type: "LNGoneNode".into(),
                tree: "Main".into(),
            },
            ReplacementError::Misc {
                node_id: "n2".into(),
                node_type: "LNKeyboardNode".into(),
                tree: "Main".into(),
                detail: "input socket 7 out of range".into(),
            },
        ]
    }

    #[test]
    fn kinds_keep_their_identifiers() {
        let kinds: Vec<_> = sample().iter().map(ReplacementError::kind).collect();
        assert_eq!(kinds, ["unregistered", "misc."]);
    }

    #[test]
    fn report_has_a_paragraph_per_error() {
        let text = render_report(&sample());
        assert!(text.contains("A node whose class doesn't exist was found in node tree \"Main\""));
        assert!(text.contains("Original error:\ninput socket 7 out of range\n"));
        assert!(text.contains("(node \"n2\", kind: misc.)"));
    }

    #[test]
    fn file_name_is_timestamped() {
        let at = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).single().unwrap();
        let name = report_file_name(&at);
        assert!(name.starts_with("node_update_failure.2024-03-05T14-07-09"));
        assert!(name.ends_with(".txt"));
    }

    #[test]
    fn empty_batch_writes_nothing() {
        let dir = std::env::temp_dir();
        assert_eq!(write_report(&dir, &[], Local::now()).unwrap(), None);
    }
}
